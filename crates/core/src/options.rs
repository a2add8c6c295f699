use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::Feature;

/// Tunables for travel and explore. Missing fields fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelOptions {
    /// Flat penalty, in walking rounds, for crossing any connector.
    pub stair_cost: u32,
    /// Positive values finish exploring before detouring for items, negative values the reverse.
    pub explore_item_greed: i32,
    pub autopickup: bool,
    /// Radius used for exclusions placed through the travel context.
    pub exclude_radius: u8,
    /// Ask before a route detours through a level off the direct branch path.
    pub confirm_detours: bool,
    /// Terrain travel must never route through.
    pub forbidden_features: BTreeSet<Feature>,
}

impl Default for TravelOptions {
    fn default() -> Self {
        Self {
            stair_cost: 500,
            explore_item_greed: 10,
            autopickup: true,
            exclude_radius: 8,
            confirm_detours: true,
            forbidden_features: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let options: TravelOptions =
            serde_json::from_str(r#"{"stair_cost": 40}"#).expect("partial options should parse");
        assert_eq!(options.stair_cost, 40);
        assert_eq!(options.explore_item_greed, 10);
        assert!(options.confirm_detours);
    }
}
