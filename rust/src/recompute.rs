//! Single-flight recomputation per project.
//!
//! A [`RecomputeSlot`] owns the latest project snapshot. Mutations are
//! committed against a copy and bump a generation counter; at most one
//! recompute or exclusive pass runs at a time. A result computed from a
//! generation that has since moved on is thrown away and the computation
//! restarts from the newest snapshot.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::critical_path::{compute_critical_path, CpmResult};
use crate::error::ScheduleError;
use crate::log_changes;
use crate::project::ProjectSnapshot;

#[derive(Clone, Debug)]
pub enum RecomputeOutcome {
    /// Fresh result for the current generation.
    Published(Arc<CpmResult>),
    /// Another recompute or pass holds the slot; the caller's mutation will
    /// be picked up when it finishes.
    InFlight,
}

#[derive(Debug)]
struct SlotState {
    snapshot: Arc<ProjectSnapshot>,
    generation: u64,
    running: bool,
    latest: Option<(u64, Arc<CpmResult>)>,
}

#[derive(Debug)]
pub struct RecomputeSlot {
    config: EngineConfig,
    state: Mutex<SlotState>,
}

/// Exclusive hold on the slot. Released together with the publish of a
/// current result, or on drop if the computation failed or panicked.
struct SlotClaim<'s> {
    slot: &'s RecomputeSlot,
    released: bool,
}

impl SlotClaim<'_> {
    fn release(&mut self, state: &mut SlotState) {
        state.running = false;
        self.released = true;
    }
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.slot.state.lock().running = false;
        }
    }
}

impl RecomputeSlot {
    pub fn new(snapshot: ProjectSnapshot, config: EngineConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SlotState {
                snapshot: Arc::new(snapshot),
                generation: 0,
                running: false,
                latest: None,
            }),
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn snapshot(&self) -> Arc<ProjectSnapshot> {
        self.state.lock().snapshot.clone()
    }

    /// Last published result, whether or not it is still current.
    pub fn latest(&self) -> Option<Arc<CpmResult>> {
        self.state.lock().latest.as_ref().map(|(_, r)| r.clone())
    }

    /// True when a mutation landed after the last published result.
    pub fn is_stale(&self) -> bool {
        let state = self.state.lock();
        state
            .latest
            .as_ref()
            .map_or(true, |(generation, _)| *generation != state.generation)
    }

    /// Apply a mutation to a copy of the latest snapshot and commit it only
    /// if it succeeds. Returns the new generation.
    ///
    /// `mutate` runs under the slot lock and must not call back into the slot.
    pub fn apply<F>(&self, mutate: F) -> Result<u64, ScheduleError>
    where
        F: FnOnce(&mut ProjectSnapshot) -> Result<(), ScheduleError>,
    {
        let mut state = self.state.lock();
        let mut next = (*state.snapshot).clone();
        mutate(&mut next)?;
        state.snapshot = Arc::new(next);
        state.generation += 1;
        Ok(state.generation)
    }

    fn claim(&self) -> Option<SlotClaim<'_>> {
        let mut state = self.state.lock();
        if state.running {
            return None;
        }
        state.running = true;
        Some(SlotClaim {
            slot: self,
            released: false,
        })
    }

    /// Compute while holding the claim, restarting if the snapshot moved.
    ///
    /// With `release`, the claim is released under the same lock that confirms
    /// the result is current.
    fn compute_current(
        &self,
        claim: &mut SlotClaim<'_>,
        release: bool,
    ) -> Result<Arc<CpmResult>, ScheduleError> {
        self.compute_current_with(claim, release, compute_critical_path)
    }

    fn compute_current_with<C>(
        &self,
        claim: &mut SlotClaim<'_>,
        release: bool,
        mut compute: C,
    ) -> Result<Arc<CpmResult>, ScheduleError>
    where
        C: FnMut(&ProjectSnapshot, &EngineConfig) -> Result<CpmResult, ScheduleError>,
    {
        loop {
            let (snapshot, generation) = {
                let mut state = self.state.lock();
                let current = state
                    .latest
                    .as_ref()
                    .filter(|(g, _)| *g == state.generation)
                    .map(|(_, result)| result.clone());
                if let Some(result) = current {
                    if release {
                        claim.release(&mut state);
                    }
                    return Ok(result);
                }
                (state.snapshot.clone(), state.generation)
            };

            let result = compute(&snapshot, &self.config)?;

            let mut state = self.state.lock();
            if state.generation != generation {
                log_changes!(
                    self.config.verbosity,
                    "Recompute of generation {} superseded by {}; restarting",
                    generation,
                    state.generation
                );
                continue;
            }
            let result = Arc::new(result);
            state.latest = Some((generation, result.clone()));
            if release {
                claim.release(&mut state);
            }
            return Ok(result);
        }
    }

    /// Recompute the critical path unless another computation is running.
    /// The slot is only released once the published result is current.
    pub fn recompute(&self) -> Result<RecomputeOutcome, ScheduleError> {
        let Some(mut claim) = self.claim() else {
            return Ok(RecomputeOutcome::InFlight);
        };
        let result = self.compute_current(&mut claim, true)?;
        Ok(RecomputeOutcome::Published(result))
    }

    /// Run a leveling or optimizing pass against a current CPM result while
    /// holding the slot. Returns `None` if the slot is busy.
    ///
    /// Mutations committed while the pass runs are recomputed before the slot
    /// is released.
    pub fn run_exclusive<T, F>(&self, pass: F) -> Result<Option<T>, ScheduleError>
    where
        F: FnOnce(&CpmResult) -> T,
    {
        let Some(mut claim) = self.claim() else {
            return Ok(None);
        };
        let result = self.compute_current(&mut claim, false)?;
        let output = pass(&result);
        self.compute_current(&mut claim, true)?;
        Ok(Some(output))
    }
}
