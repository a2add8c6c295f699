pub mod branch;
pub mod cache_file;
pub mod error;
pub mod exclusion;
pub mod map;
pub mod options;
pub mod sandbox;
pub mod travel;
pub mod types;

pub use branch::{Branch, BranchTable};
pub use cache_file::{CacheLoadError, load_cache_from_file, save_cache_to_file};
pub use error::TravelError;
pub use exclusion::{Exclusion, ExclusionKind, ExclusionSet};
pub use map::{KnownLevel, LevelView};
pub use options::TravelOptions;
pub use sandbox::{DriveOutcome, DriveReport, DungeonLayout, Sandbox};
pub use travel::{
    LevelTransition, StopReason, TravelAction, TravelCache, TravelContext, TravelGoal, TravelWorld,
};
pub use types::*;
