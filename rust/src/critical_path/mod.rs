//! Critical path method.
//!
//! A forward pass computes early dates in topological order, a backward pass
//! anchored at the project end computes late dates, and total float picks out
//! the critical chain. All four dependency types and signed lags are honoured;
//! lags are counted in the successor's calendar.

mod calculation;
mod types;

pub use calculation::compute_critical_path;
pub(crate) use calculation::{Network, Window};
pub use types::{CpmResult, TaskTiming};
