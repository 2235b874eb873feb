//! Task dependency graph.
//!
//! Tasks live in an arena and are addressed by `u32` index; edges are plain
//! tuples kept in forward and reverse adjacency lists. Every insertion runs a
//! reachability check first, so the graph is acyclic by construction.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::error::{ScheduleError, ValidationError};
use crate::models::DependencyType;

/// Arena index of a task.
pub type TaskIdx = u32;

/// One side of an edge as seen from a task's adjacency list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    /// The task on the other end of the edge.
    pub task: TaskIdx,
    pub kind: DependencyType,
    pub lag: f64,
}

/// A full edge `(pred, succ, kind, lag)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub pred: TaskIdx,
    pub succ: TaskIdx,
    pub kind: DependencyType,
    pub lag: f64,
}

#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: FxHashMap<String, TaskIdx>,
    preds: Vec<Vec<Link>>,
    succs: Vec<Vec<Link>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, returning its index. Re-adding an id is a no-op.
    pub fn add_task(&mut self, id: &str) -> TaskIdx {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.ids.len() as TaskIdx;
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        self.preds.push(Vec::new());
        self.succs.push(Vec::new());
        idx
    }

    #[inline]
    pub fn index_of(&self, id: &str) -> Option<TaskIdx> {
        self.index.get(id).copied()
    }

    #[inline]
    pub fn id(&self, idx: TaskIdx) -> &str {
        &self.ids[idx as usize]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn predecessors(&self, idx: TaskIdx) -> &[Link] {
        &self.preds[idx as usize]
    }

    #[inline]
    pub fn successors(&self, idx: TaskIdx) -> &[Link] {
        &self.succs[idx as usize]
    }

    pub fn edge_count(&self) -> usize {
        self.succs.iter().map(Vec::len).sum()
    }

    /// All edges, grouped by predecessor in arena order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.succs.iter().enumerate().flat_map(|(pred, links)| {
            links.iter().map(move |link| Edge {
                pred: pred as TaskIdx,
                succ: link.task,
                kind: link.kind,
                lag: link.lag,
            })
        })
    }

    pub fn edge(&self, pred: TaskIdx, succ: TaskIdx) -> Option<Edge> {
        self.succs[pred as usize]
            .iter()
            .find(|l| l.task == succ)
            .map(|l| Edge {
                pred,
                succ,
                kind: l.kind,
                lag: l.lag,
            })
    }

    fn require(&self, id: &str) -> Result<TaskIdx, ValidationError> {
        self.index_of(id)
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))
    }

    /// Insert `pred -> succ`, rejecting it before mutation if it would close a cycle.
    pub fn add_edge(
        &mut self,
        pred: &str,
        succ: &str,
        kind: DependencyType,
        lag: f64,
    ) -> Result<(), ScheduleError> {
        let p = self.require(pred)?;
        let s = self.require(succ)?;
        if !lag.is_finite() {
            return Err(ValidationError::InvalidLag {
                pred: pred.to_string(),
                succ: succ.to_string(),
                lag,
            }
            .into());
        }
        if p == s {
            return Err(ScheduleError::CycleDetected {
                path: vec![pred.to_string(), succ.to_string()],
            });
        }
        if self.edge(p, s).is_some() {
            return Err(ValidationError::DuplicateDependency {
                pred: pred.to_string(),
                succ: succ.to_string(),
            }
            .into());
        }
        if let Some(back) = self.find_path(s, p) {
            // pred -> succ -> ... -> pred
            let mut path = Vec::with_capacity(back.len() + 1);
            path.push(pred.to_string());
            path.extend(back.into_iter().map(|i| self.id(i).to_string()));
            return Err(ScheduleError::CycleDetected { path });
        }

        self.succs[p as usize].push(Link { task: s, kind, lag });
        self.preds[s as usize].push(Link { task: p, kind, lag });
        Ok(())
    }

    pub fn remove_edge(&mut self, pred: &str, succ: &str) -> Result<Edge, ScheduleError> {
        let p = self.require(pred)?;
        let s = self.require(succ)?;
        let edge = self.edge(p, s).ok_or_else(|| ValidationError::UnknownDependency {
            pred: pred.to_string(),
            succ: succ.to_string(),
        })?;
        self.succs[p as usize].retain(|l| l.task != s);
        self.preds[s as usize].retain(|l| l.task != p);
        Ok(edge)
    }

    /// Change the lag of an existing edge. Lags never affect acyclicity.
    pub fn set_lag(&mut self, pred: TaskIdx, succ: TaskIdx, lag: f64) -> Result<(), ScheduleError> {
        if !lag.is_finite() {
            return Err(ValidationError::InvalidLag {
                pred: self.id(pred).to_string(),
                succ: self.id(succ).to_string(),
                lag,
            }
            .into());
        }
        let mut found = false;
        for link in self.succs[pred as usize].iter_mut().filter(|l| l.task == succ) {
            link.lag = lag;
            found = true;
        }
        for link in self.preds[succ as usize].iter_mut().filter(|l| l.task == pred) {
            link.lag = lag;
        }
        if !found {
            return Err(ValidationError::UnknownDependency {
                pred: self.id(pred).to_string(),
                succ: self.id(succ).to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn path_exists(&self, from: TaskIdx, to: TaskIdx) -> bool {
        self.find_path(from, to).is_some()
    }

    /// Breadth-first search along successor edges; returns `from ..= to`.
    pub fn find_path(&self, from: TaskIdx, to: TaskIdx) -> Option<Vec<TaskIdx>> {
        let n = self.ids.len();
        let mut parent: Vec<Option<TaskIdx>> = vec![None; n];
        let mut seen = vec![false; n];
        let mut queue: VecDeque<TaskIdx> = VecDeque::new();
        seen[from as usize] = true;
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(prev) = parent[cursor as usize] {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for link in &self.succs[current as usize] {
                let next = link.task as usize;
                if !seen[next] {
                    seen[next] = true;
                    parent[next] = Some(current);
                    queue.push_back(link.task);
                }
            }
        }
        None
    }

    /// Kahn's algorithm, seeded in arena order so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<TaskIdx>, ScheduleError> {
        let n = self.ids.len();
        let mut in_degree: Vec<usize> = self.preds.iter().map(Vec::len).collect();
        let mut queue: VecDeque<TaskIdx> = (0..n as TaskIdx)
            .filter(|&i| in_degree[i as usize] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for link in &self.succs[idx as usize] {
                let degree = &mut in_degree[link.task as usize];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(link.task);
                }
            }
        }

        if order.len() != n {
            let path = self.cycle_among(&in_degree);
            return Err(ScheduleError::CycleDetected { path });
        }
        Ok(order)
    }

    /// Walk predecessor links among nodes Kahn could not release until one repeats.
    fn cycle_among(&self, in_degree: &[usize]) -> Vec<String> {
        let Some(start) = (0..self.ids.len()).find(|&i| in_degree[i] > 0) else {
            return Vec::new();
        };
        let mut visited_at: FxHashMap<usize, usize> = FxHashMap::default();
        let mut walk: Vec<usize> = Vec::new();
        let mut current = start;
        loop {
            if let Some(&pos) = visited_at.get(&current) {
                let mut cycle: Vec<String> = walk[pos..]
                    .iter()
                    .rev()
                    .map(|&i| self.ids[i].clone())
                    .collect();
                if let Some(first) = cycle.first().cloned() {
                    cycle.push(first);
                }
                return cycle;
            }
            visited_at.insert(current, walk.len());
            walk.push(current);
            match self.preds[current]
                .iter()
                .find(|l| in_degree[l.task as usize] > 0)
            {
                Some(link) => current = link.task as usize,
                None => return walk.iter().map(|&i| self.ids[i].clone()).collect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chain(ids: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for id in ids {
            graph.add_task(id);
        }
        for pair in ids.windows(2) {
            graph
                .add_edge(pair[0], pair[1], DependencyType::FinishToStart, 0.0)
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_topological_order_chain() {
        let graph = chain(&["a", "b", "c"]);
        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|i| graph.id(i))
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let mut graph = chain(&["a", "b", "c"]);
        let err = graph
            .add_edge("c", "a", DependencyType::FinishToStart, 0.0)
            .unwrap_err();
        assert_eq!(
            err,
            ScheduleError::CycleDetected {
                path: vec!["c".into(), "a".into(), "b".into(), "c".into()]
            }
        );
        // Nothing was inserted
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.successors(graph.index_of("c").unwrap()).is_empty());
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = chain(&["a"]);
        let err = graph
            .add_edge("a", "a", DependencyType::StartToStart, 1.0)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::CycleDetected { ref path } if path.len() == 2));
    }

    #[test]
    fn test_duplicate_and_unknown_rejected() {
        let mut graph = chain(&["a", "b"]);
        assert!(matches!(
            graph.add_edge("a", "b", DependencyType::FinishToFinish, 0.0),
            Err(ScheduleError::Validation(ValidationError::DuplicateDependency { .. }))
        ));
        assert!(matches!(
            graph.add_edge("a", "zz", DependencyType::FinishToStart, 0.0),
            Err(ScheduleError::Validation(ValidationError::UnknownTask(_)))
        ));
        assert!(matches!(
            graph.add_edge("b", "a", DependencyType::FinishToStart, f64::INFINITY),
            Err(ScheduleError::Validation(ValidationError::InvalidLag { .. }))
        ));
    }

    #[test]
    fn test_remove_edge_and_set_lag() {
        let mut graph = chain(&["a", "b", "c"]);
        let (a, b) = (graph.index_of("a").unwrap(), graph.index_of("b").unwrap());
        graph.set_lag(a, b, -2.0).unwrap();
        assert_eq!(graph.edge(a, b).unwrap().lag, -2.0);
        assert_eq!(graph.predecessors(b)[0].lag, -2.0);

        let removed = graph.remove_edge("a", "b").unwrap();
        assert_eq!(removed.lag, -2.0);
        assert!(graph.edge(a, b).is_none());
        assert!(graph.remove_edge("a", "b").is_err());
        // With a -> b gone, c -> a is legal
        graph
            .add_edge("c", "a", DependencyType::FinishToStart, 0.0)
            .unwrap();
    }

    #[test]
    fn test_disconnected_components_all_ordered() {
        let mut graph = chain(&["a", "b"]);
        graph.add_task("d");
        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_random_insertions_stay_acyclic(
            edges in prop::collection::vec((0u32..12, 0u32..12), 0..60)
        ) {
            let mut graph = DependencyGraph::new();
            for i in 0..12 {
                graph.add_task(&format!("t{i}"));
            }
            for (p, s) in edges {
                let (pred, succ) = (format!("t{p}"), format!("t{s}"));
                let would_cycle = p == s
                    || graph.path_exists(s, p);
                let result = graph.add_edge(&pred, &succ, DependencyType::FinishToStart, 0.0);
                if would_cycle {
                    let is_cycle = matches!(result, Err(ScheduleError::CycleDetected { .. }));
                    prop_assert!(is_cycle);
                }
            }
            let order = graph.topological_order();
            prop_assert!(order.is_ok());
            let order = order.unwrap();
            prop_assert_eq!(order.len(), 12);
            let mut position = vec![0usize; 12];
            for (pos, idx) in order.iter().enumerate() {
                position[*idx as usize] = pos;
            }
            for edge in graph.edges() {
                prop_assert!(position[edge.pred as usize] < position[edge.succ as usize]);
            }
        }
    }
}
