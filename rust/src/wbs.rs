//! Work breakdown structure codes.
//!
//! Codes are dotted segment lists (`1.2.3`). A child gets its parent's code
//! plus one segment, one greater than the largest live sibling. Existing codes
//! never change when unrelated nodes are inserted or removed.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::str::FromStr;

use crate::config::MAX_WBS_DEPTH;
use crate::error::{ScheduleError, ValidationError};
use crate::models::WbsNode;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WbsCode(Vec<u32>);

impl WbsCode {
    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn last_segment(&self) -> u32 {
        self.0.last().copied().unwrap_or(0)
    }

    /// Code of the parent node, `None` for top-level codes.
    pub fn parent(&self) -> Option<WbsCode> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(WbsCode(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn child(&self, segment: u32) -> WbsCode {
        let mut segments = self.0.clone();
        segments.push(segment);
        WbsCode(segments)
    }

    fn top_level(segment: u32) -> WbsCode {
        WbsCode(vec![segment])
    }
}

impl fmt::Display for WbsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for WbsCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidWbsCode(s.to_string());
        if s.is_empty() {
            return Err(invalid());
        }
        let segments = s
            .split('.')
            .map(|part| match part.parse::<u32>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<u32>, _>>()?;
        Ok(WbsCode(segments))
    }
}

/// Next code under `parent` given the codes its children already hold.
pub fn assign_code(
    parent: Option<&WbsCode>,
    existing_siblings: &[WbsCode],
) -> Result<WbsCode, ValidationError> {
    assign_code_with_depth(parent, existing_siblings, MAX_WBS_DEPTH)
}

pub fn assign_code_with_depth(
    parent: Option<&WbsCode>,
    existing_siblings: &[WbsCode],
    max_depth: usize,
) -> Result<WbsCode, ValidationError> {
    let last = existing_siblings.iter().max_by_key(|c| c.last_segment());
    let next = match last {
        Some(code) => code
            .last_segment()
            .checked_add(1)
            .ok_or_else(|| ValidationError::InvalidWbsCode(code.to_string()))?,
        None => 1,
    };
    let code = match parent {
        Some(p) => p.child(next),
        None => WbsCode::top_level(next),
    };
    if code.depth() > max_depth {
        return Err(ValidationError::DepthExceeded {
            code: code.to_string(),
            depth: code.depth(),
            max: max_depth,
        });
    }
    Ok(code)
}

#[derive(Clone, Debug)]
struct WbsEntry {
    id: String,
    parent: Option<usize>,
    children: Vec<usize>,
    code: WbsCode,
}

/// Ordered tree of coded nodes supporting insertion, removal and re-parenting.
#[derive(Clone, Debug)]
pub struct WbsTree {
    entries: Vec<Option<WbsEntry>>,
    index: FxHashMap<String, usize>,
    roots: Vec<usize>,
    max_depth: usize,
}

impl Default for WbsTree {
    fn default() -> Self {
        Self::with_max_depth(MAX_WBS_DEPTH)
    }
}

impl WbsTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
            roots: Vec::new(),
            max_depth: max_depth.clamp(1, MAX_WBS_DEPTH),
        }
    }

    fn entry(&self, slot: usize) -> &WbsEntry {
        self.entries[slot]
            .as_ref()
            .unwrap_or_else(|| unreachable!("live slot {slot} was removed"))
    }

    fn entry_mut(&mut self, slot: usize) -> &mut WbsEntry {
        self.entries[slot]
            .as_mut()
            .unwrap_or_else(|| unreachable!("live slot {slot} was removed"))
    }

    fn slot_of_parent(&self, node: &str, parent: Option<&str>) -> Result<Option<usize>, ValidationError> {
        match parent {
            None => Ok(None),
            Some(p) => self
                .index
                .get(p)
                .copied()
                .map(Some)
                .ok_or_else(|| ValidationError::UnknownParent {
                    node: node.to_string(),
                    parent: p.to_string(),
                }),
        }
    }

    fn sibling_codes(&self, parent: Option<usize>) -> Vec<WbsCode> {
        let siblings = match parent {
            Some(p) => &self.entry(p).children,
            None => &self.roots,
        };
        siblings.iter().map(|&s| self.entry(s).code.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn code_of(&self, id: &str) -> Option<&WbsCode> {
        self.index.get(id).map(|&slot| &self.entry(slot).code)
    }

    /// Append `id` as the last child of `parent`.
    pub fn insert(&mut self, id: &str, parent: Option<&str>) -> Result<WbsCode, ScheduleError> {
        if self.index.contains_key(id) {
            return Err(ValidationError::DuplicateTask(id.to_string()).into());
        }
        let parent_slot = self.slot_of_parent(id, parent)?;
        let parent_code = parent_slot.map(|p| self.entry(p).code.clone());
        let code = assign_code_with_depth(
            parent_code.as_ref(),
            &self.sibling_codes(parent_slot),
            self.max_depth,
        )?;

        let slot = self.entries.len();
        self.entries.push(Some(WbsEntry {
            id: id.to_string(),
            parent: parent_slot,
            children: Vec::new(),
            code: code.clone(),
        }));
        self.index.insert(id.to_string(), slot);
        match parent_slot {
            Some(p) => self.entry_mut(p).children.push(slot),
            None => self.roots.push(slot),
        }
        Ok(code)
    }

    /// Remove `id` and its subtree. Surviving codes are left untouched.
    pub fn remove(&mut self, id: &str) -> Result<Vec<String>, ScheduleError> {
        let slot = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))?;
        self.detach(slot);

        let subtree = self.subtree(slot);
        let mut removed = Vec::with_capacity(subtree.len());
        for s in subtree {
            if let Some(entry) = self.entries[s].take() {
                self.index.remove(&entry.id);
                removed.push(entry.id);
            }
        }
        Ok(removed)
    }

    /// Move `id` (with its subtree) under `new_parent`.
    ///
    /// The moved node becomes the last child of its new parent; descendants
    /// keep their own last segments so their relative order is unchanged.
    /// Returns every `(id, new_code)` that changed. On error nothing moves.
    pub fn reparent(
        &mut self,
        id: &str,
        new_parent: Option<&str>,
    ) -> Result<Vec<(String, WbsCode)>, ScheduleError> {
        let slot = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))?;
        let parent_slot = self.slot_of_parent(id, new_parent)?;
        if parent_slot == self.entry(slot).parent {
            return Ok(Vec::new());
        }

        if let Some(target) = parent_slot {
            // new parent inside the moved subtree
            let mut chain = vec![target];
            let mut cursor = self.entry(target).parent;
            let mut inside = target == slot;
            while !inside {
                match cursor {
                    Some(c) => {
                        chain.push(c);
                        inside = c == slot;
                        cursor = self.entry(c).parent;
                    }
                    None => break,
                }
            }
            if inside {
                let mut path: Vec<String> = chain
                    .iter()
                    .rev()
                    .map(|&s| self.entry(s).id.clone())
                    .collect();
                path.push(id.to_string());
                return Err(ScheduleError::CycleDetected { path });
            }
        }

        let parent_code = parent_slot.map(|p| self.entry(p).code.clone());
        let code = assign_code_with_depth(
            parent_code.as_ref(),
            &self.sibling_codes(parent_slot),
            self.max_depth,
        )?;
        let height = self.height(slot);
        if code.depth() + height > self.max_depth {
            return Err(ValidationError::DepthExceeded {
                code: code.to_string(),
                depth: code.depth() + height,
                max: self.max_depth,
            }
            .into());
        }

        self.detach(slot);
        self.entry_mut(slot).parent = parent_slot;
        match parent_slot {
            Some(p) => self.entry_mut(p).children.push(slot),
            None => self.roots.push(slot),
        }

        let mut changed = Vec::new();
        self.recode(slot, code, &mut changed);
        Ok(changed)
    }

    fn recode(&mut self, slot: usize, code: WbsCode, changed: &mut Vec<(String, WbsCode)>) {
        let children = {
            let entry = self.entry_mut(slot);
            entry.code = code.clone();
            changed.push((entry.id.clone(), code.clone()));
            entry.children.clone()
        };
        for child in children {
            let segment = self.entry(child).code.last_segment();
            self.recode(child, code.child(segment), changed);
        }
    }

    fn detach(&mut self, slot: usize) {
        match self.entry(slot).parent {
            Some(p) => self.entry_mut(p).children.retain(|&c| c != slot),
            None => self.roots.retain(|&c| c != slot),
        }
    }

    fn subtree(&self, slot: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![slot];
        while let Some(s) = stack.pop() {
            out.push(s);
            stack.extend(self.entry(s).children.iter().rev());
        }
        out
    }

    /// Levels below `slot` (0 for a leaf).
    fn height(&self, slot: usize) -> usize {
        self.entry(slot)
            .children
            .iter()
            .map(|&c| 1 + self.height(c))
            .max()
            .unwrap_or(0)
    }

    /// All `(id, code)` pairs in depth-first order.
    pub fn codes(&self) -> Vec<(String, WbsCode)> {
        let mut out = Vec::with_capacity(self.len());
        for &root in &self.roots {
            for slot in self.subtree(root) {
                let entry = self.entry(slot);
                out.push((entry.id.clone(), entry.code.clone()));
            }
        }
        out
    }
}

/// Code every node of a tree given in creation order.
///
/// Siblings are numbered in the order they appear in `nodes`, so running this
/// twice on the same input yields the same codes.
pub fn generate_wbs(
    nodes: &[WbsNode],
    max_depth: usize,
) -> Result<FxHashMap<String, WbsCode>, ScheduleError> {
    let mut position: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, node) in nodes.iter().enumerate() {
        if position.insert(node.id.as_str(), i).is_some() {
            return Err(ValidationError::DuplicateTask(node.id.clone()).into());
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        match &node.parent {
            None => roots.push(i),
            Some(parent) => {
                let p = position.get(parent.as_str()).copied().ok_or_else(|| {
                    ValidationError::UnknownParent {
                        node: node.id.clone(),
                        parent: parent.clone(),
                    }
                })?;
                children[p].push(i);
            }
        }
    }

    let mut tree = WbsTree::with_max_depth(max_depth);
    let mut placed: FxHashSet<usize> = FxHashSet::default();
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        placed.insert(i);
        tree.insert(&nodes[i].id, nodes[i].parent.as_deref())?;
        stack.extend(children[i].iter().rev());
    }

    // Anything unreachable from a root sits on a parent cycle.
    if let Some(stuck) = (0..nodes.len()).find(|i| !placed.contains(i)) {
        let mut path = vec![nodes[stuck].id.clone()];
        let mut cursor = stuck;
        let mut seen: FxHashSet<usize> = FxHashSet::from_iter([stuck]);
        while let Some(parent) = nodes[cursor].parent.as_deref() {
            let Some(&p) = position.get(parent) else { break };
            path.push(nodes[p].id.clone());
            if !seen.insert(p) {
                break;
            }
            cursor = p;
        }
        path.reverse();
        return Err(ScheduleError::CycleDetected { path });
    }

    Ok(tree.codes().into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn code(s: &str) -> WbsCode {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(code("1.2.3").segments(), &[1, 2, 3]);
        assert_eq!(code("1.2.3").to_string(), "1.2.3");
        assert_eq!(code("1.2.3").parent(), Some(code("1.2")));
        assert_eq!(code("4").parent(), None);
        assert!("1..2".parse::<WbsCode>().is_err());
        assert!("0.1".parse::<WbsCode>().is_err());
        assert!("".parse::<WbsCode>().is_err());
    }

    #[test]
    fn test_assign_code_first_and_next() {
        assert_eq!(assign_code(None, &[]).unwrap(), code("1"));
        assert_eq!(assign_code(Some(&code("2")), &[]).unwrap(), code("2.1"));
        let siblings = vec![code("2.1"), code("2.4"), code("2.2")];
        assert_eq!(assign_code(Some(&code("2")), &siblings).unwrap(), code("2.5"));
    }

    #[test]
    fn test_assign_code_segment_overflow() {
        let siblings = vec![code("3.1"), code("3.4294967295")];
        let err = assign_code(Some(&code("3")), &siblings).unwrap_err();
        assert_eq!(err, ValidationError::InvalidWbsCode("3.4294967295".to_string()));
        assert!(assign_code(Some(&code("3")), &[code("3.4294967294")]).is_ok());
    }

    #[test]
    fn test_assign_code_depth_exceeded() {
        let parent = code("1.1.1.1.1.1");
        let err = assign_code(Some(&parent), &[]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DepthExceeded {
                code: "1.1.1.1.1.1.1".to_string(),
                depth: 7,
                max: 6
            }
        );
        assert!(assign_code(Some(&code("1.1.1.1.1")), &[]).is_ok());
    }

    #[test]
    fn test_insert_is_stable_under_removal() {
        let mut tree = WbsTree::new();
        tree.insert("site", None).unwrap();
        tree.insert("earthworks", Some("site")).unwrap();
        tree.insert("foundations", Some("site")).unwrap();
        tree.insert("frame", Some("site")).unwrap();

        tree.remove("foundations").unwrap();
        assert_eq!(tree.code_of("earthworks"), Some(&code("1.1")));
        assert_eq!(tree.code_of("frame"), Some(&code("1.3")));
        assert_eq!(tree.code_of("foundations"), None);

        assert_eq!(tree.insert("roof", Some("site")).unwrap(), code("1.4"));
    }

    #[test]
    fn test_reparent_moves_subtree() {
        let mut tree = WbsTree::new();
        tree.insert("a", None).unwrap(); // 1
        tree.insert("b", None).unwrap(); // 2
        tree.insert("b1", Some("b")).unwrap(); // 2.1
        tree.insert("b2", Some("b")).unwrap(); // 2.2
        tree.insert("b2x", Some("b2")).unwrap(); // 2.2.1
        tree.insert("a1", Some("a")).unwrap(); // 1.1

        let changed = tree.reparent("b", Some("a")).unwrap();
        assert_eq!(changed.len(), 4);
        assert_eq!(tree.code_of("b"), Some(&code("1.2")));
        assert_eq!(tree.code_of("b1"), Some(&code("1.2.1")));
        assert_eq!(tree.code_of("b2"), Some(&code("1.2.2")));
        assert_eq!(tree.code_of("b2x"), Some(&code("1.2.2.1")));
        // untouched sibling keeps its code
        assert_eq!(tree.code_of("a1"), Some(&code("1.1")));
    }

    #[test]
    fn test_reparent_into_own_subtree_rejected() {
        let mut tree = WbsTree::new();
        tree.insert("a", None).unwrap();
        tree.insert("a1", Some("a")).unwrap();
        let err = tree.reparent("a", Some("a1")).unwrap_err();
        assert!(matches!(err, ScheduleError::CycleDetected { .. }));
        assert_eq!(tree.code_of("a1"), Some(&code("1.1")));
    }

    #[test]
    fn test_reparent_depth_checked_before_moving() {
        let mut tree = WbsTree::new();
        let mut parent: Option<String> = None;
        for i in 0..6 {
            let id = format!("deep{i}");
            tree.insert(&id, parent.as_deref()).unwrap();
            parent = Some(id);
        }
        tree.insert("other", None).unwrap();
        tree.insert("other1", Some("other")).unwrap();
        let err = tree.reparent("other", Some("deep4")).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::Validation(ValidationError::DepthExceeded { .. })
        ));
        assert_eq!(tree.code_of("other"), Some(&code("2")));
    }

    #[test]
    fn test_generate_wbs_matches_tree() {
        let nodes = vec![
            WbsNode::root("site"),
            WbsNode::child("earthworks", "site"),
            WbsNode::child("excavate", "earthworks"),
            WbsNode::child("frame", "site"),
            WbsNode::root("handover"),
            WbsNode::child("backfill", "earthworks"),
        ];
        let codes = generate_wbs(&nodes, MAX_WBS_DEPTH).unwrap();
        assert_eq!(codes["site"], code("1"));
        assert_eq!(codes["earthworks"], code("1.1"));
        assert_eq!(codes["excavate"], code("1.1.1"));
        assert_eq!(codes["backfill"], code("1.1.2"));
        assert_eq!(codes["frame"], code("1.2"));
        assert_eq!(codes["handover"], code("2"));
    }

    #[test]
    fn test_generate_wbs_rejects_bad_trees() {
        let unknown = vec![WbsNode::child("a", "ghost")];
        assert!(matches!(
            generate_wbs(&unknown, MAX_WBS_DEPTH),
            Err(ScheduleError::Validation(ValidationError::UnknownParent { .. }))
        ));

        let cyclic = vec![
            WbsNode::root("r"),
            WbsNode::child("a", "b"),
            WbsNode::child("b", "a"),
        ];
        assert!(matches!(
            generate_wbs(&cyclic, MAX_WBS_DEPTH),
            Err(ScheduleError::CycleDetected { .. })
        ));

        let dup = vec![WbsNode::root("a"), WbsNode::root("a")];
        assert!(generate_wbs(&dup, MAX_WBS_DEPTH).is_err());
    }

    fn random_tree() -> impl Strategy<Value = Vec<WbsNode>> {
        prop::collection::vec(any::<prop::sample::Index>(), 1..40).prop_map(|picks| {
            let mut nodes: Vec<WbsNode> = Vec::new();
            let mut depth: Vec<usize> = Vec::new();
            for (i, pick) in picks.into_iter().enumerate() {
                let id = format!("n{i}");
                // every fourth node is a root; others attach under an existing shallow node
                if i % 4 == 0 || nodes.is_empty() {
                    nodes.push(WbsNode::root(id));
                    depth.push(1);
                    continue;
                }
                let parent = pick.index(nodes.len());
                if depth[parent] >= MAX_WBS_DEPTH {
                    nodes.push(WbsNode::root(id));
                    depth.push(1);
                } else {
                    let parent_id = nodes[parent].id.clone();
                    depth.push(depth[parent] + 1);
                    nodes.push(WbsNode::child(id, parent_id));
                }
            }
            nodes
        })
    }

    proptest! {
        #[test]
        fn prop_codes_unique_prefix_matches_and_idempotent(nodes in random_tree()) {
            let codes = generate_wbs(&nodes, MAX_WBS_DEPTH).unwrap();
            prop_assert_eq!(codes.len(), nodes.len());

            let unique: FxHashSet<&WbsCode> = codes.values().collect();
            prop_assert_eq!(unique.len(), codes.len());

            for node in &nodes {
                let own = &codes[&node.id];
                let prefix = own.parent();
                match &node.parent {
                    Some(parent) => prop_assert_eq!(prefix.as_ref(), Some(&codes[parent])),
                    None => prop_assert_eq!(own.depth(), 1),
                }
            }

            let again = generate_wbs(&nodes, MAX_WBS_DEPTH).unwrap();
            prop_assert_eq!(again, codes);
        }
    }
}
