//! Per-cell traversal verdicts and costs.
//! This module exists so every flood in the crate agrees on which cells may be crossed.
//! It does not search; it only answers questions about one cell at a time.

use std::collections::BTreeSet;

use super::*;

/// Relaxations applied on top of the strict safety rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalPolicy {
    /// Allow deep water, lava, harmful traps and forbidden terrain.
    pub ignore_hostile: bool,
    /// Allow exclusions, blockers and hazard-wall adjacency.
    pub ignore_danger: bool,
    /// Allow damaging clouds.
    pub allow_clouds: bool,
}

impl TraversalPolicy {
    pub const STRICT: TraversalPolicy =
        TraversalPolicy { ignore_hostile: false, ignore_danger: false, allow_clouds: false };

    /// Used by the reseed pass that reports reachability-with-risk.
    pub const RISKY: TraversalPolicy =
        TraversalPolicy { ignore_hostile: true, ignore_danger: true, allow_clouds: true };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnsafeReason {
    OutOfBounds,
    Unexplored,
    Forbidden,
    Blocked,
    Excluded,
    HazardAdjacent,
    Cloud,
    Trap,
    Terrain,
}

/// Everything the oracle needs besides the level's exclusions.
#[derive(Clone, Copy)]
pub struct SafetyInputs<'a> {
    pub view: &'a dyn LevelView,
    pub agent: AgentProfile,
    pub forbidden: &'a BTreeSet<Feature>,
}

pub struct SafetyOracle<'a> {
    inputs: SafetyInputs<'a>,
    exclusions: &'a ExclusionSet,
}

impl<'a> SafetyOracle<'a> {
    pub fn new(inputs: SafetyInputs<'a>, exclusions: &'a ExclusionSet) -> Self {
        Self { inputs, exclusions }
    }

    pub fn view(&self) -> &'a dyn LevelView {
        self.inputs.view
    }

    pub fn exclusions(&self) -> &'a ExclusionSet {
        self.exclusions
    }

    pub fn agent(&self) -> AgentProfile {
        self.inputs.agent
    }

    pub fn is_traversable(&self, pos: Pos, policy: TraversalPolicy) -> bool {
        self.classify(pos, policy).is_ok()
    }

    /// Applies the safety rules in priority order and reports the first one that fails.
    pub fn classify(&self, pos: Pos, policy: TraversalPolicy) -> Result<(), UnsafeReason> {
        let view = self.inputs.view;
        let agent = &self.inputs.agent;
        if !view.in_bounds(pos) {
            return Err(UnsafeReason::OutOfBounds);
        }
        let Some(feature) = view.feature_at(pos) else {
            return Err(UnsafeReason::Unexplored);
        };
        if !policy.ignore_hostile && self.inputs.forbidden.contains(&feature) {
            return Err(UnsafeReason::Forbidden);
        }
        if !policy.ignore_danger {
            if view.monster_blocks(pos) {
                return Err(UnsafeReason::Blocked);
            }
            if self.exclusions.is_excluded(pos) {
                return Err(UnsafeReason::Excluded);
            }
            if !agent.hazard_immune && self.touches_hazard_wall(pos) {
                return Err(UnsafeReason::HazardAdjacent);
            }
        }
        if !policy.allow_clouds
            && let Some(cloud) = view.cloud_at(pos)
            && view.is_damaging(cloud, agent)
        {
            return Err(UnsafeReason::Cloud);
        }
        match feature {
            Feature::Trap(kind) if kind.is_harmless_for(agent) || policy.ignore_hostile => Ok(()),
            Feature::Trap(_) => Err(UnsafeReason::Trap),
            Feature::DeepWater if agent.swims || agent.flies || policy.ignore_hostile => Ok(()),
            Feature::Lava if agent.flies || policy.ignore_hostile => Ok(()),
            Feature::DeepWater | Feature::Lava => Err(UnsafeReason::Terrain),
            f if f.is_floor_like() || f.is_door() => Ok(()),
            _ => Err(UnsafeReason::Terrain),
        }
    }

    /// Rounds spent entering the cell.
    pub fn traversal_cost(&self, pos: Pos) -> u32 {
        match self.inputs.view.feature_at(pos) {
            Some(Feature::ShallowWater | Feature::ClosedDoor) => 2,
            Some(Feature::Trap(_)) => 3,
            _ => 1,
        }
    }

    /// Blocked under the strict rules but passable once hostile terrain and danger are ignored.
    pub fn is_hazard_blocked(&self, pos: Pos) -> bool {
        !self.is_traversable(pos, TraversalPolicy::STRICT)
            && self.is_traversable(pos, TraversalPolicy::RISKY)
    }

    fn touches_hazard_wall(&self, pos: Pos) -> bool {
        neighbors(pos)
            .into_iter()
            .any(|n| self.inputs.view.feature_at(n) == Some(Feature::HazardWall))
    }
}
