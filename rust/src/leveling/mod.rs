//! Resource leveling within total float.

mod leveler;
mod resource_load;
mod types;

pub use leveler::level_resources;
pub use resource_load::{DayLoad, ResourceLoad};
pub use types::{LeveledTask, LevelingConflict, LevelingResult};
