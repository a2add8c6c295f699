//! In-memory multi-level dungeon that plays the world side of travel.
//! This module exists so tests and tools can run whole travel sessions without a game:
//! ASCII levels, a connector link table and radius-based reveal.
//! It does not simulate monsters, items beyond pickup markers, or turn timing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::branch::BranchTable;
use crate::error::TravelError;
use crate::map::{KnownLevel, LevelView};
use crate::travel::{
    LevelTransition, StopReason, TravelAction, TravelContext, TravelGoal, TravelWorld,
};
use crate::types::*;

pub const DEFAULT_REVEAL_RADIUS: i32 = 64;

#[derive(Clone, Debug)]
pub struct Sandbox {
    branches: BranchTable,
    levels: BTreeMap<LevelId, KnownLevel>,
    links: BTreeMap<LevelPos, LevelPos>,
    current: LevelId,
    agent_pos: Pos,
    profile: AgentProfile,
    state: AgentState,
    reveal_radius: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveOutcome {
    Arrived,
    Stopped(StopReason),
    OutOfTurns,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriveReport {
    pub turns: u32,
    pub moves: u32,
    pub crossings: u32,
    pub pickups: u32,
    pub outcome: DriveOutcome,
}

/// Serialized dungeon description used by the tools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DungeonLayout {
    #[serde(default = "BranchTable::standard")]
    pub branches: BranchTable,
    pub levels: Vec<LevelLayout>,
    #[serde(default)]
    pub links: Vec<LinkLayout>,
    /// Pair the k-th down stairs of each level with the k-th up stairs of the level below.
    #[serde(default = "default_link_stairs")]
    pub link_stairs: bool,
    /// Level holding the `@` start glyph.
    pub start: LevelId,
    #[serde(default)]
    pub agent: AgentProfile,
    #[serde(default)]
    pub reveal_radius: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelLayout {
    pub id: LevelId,
    pub rows: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkLayout {
    pub from: LevelPos,
    pub to: LevelPos,
    #[serde(default)]
    pub one_way: bool,
}

fn default_link_stairs() -> bool {
    true
}

fn is_walkable(feature: Feature, agent: &AgentProfile) -> bool {
    match feature {
        Feature::DeepWater => agent.swims || agent.flies,
        Feature::Lava => agent.flies,
        f => f.is_floor_like() || f.is_door() || f.is_trap(),
    }
}

impl Sandbox {
    pub fn new(branches: BranchTable, start: LevelId, pos: Pos) -> Self {
        Self {
            branches,
            levels: BTreeMap::new(),
            links: BTreeMap::new(),
            current: start,
            agent_pos: pos,
            profile: AgentProfile::default(),
            state: AgentState::default(),
            reveal_radius: DEFAULT_REVEAL_RADIUS,
        }
    }

    pub fn from_layout(layout: &DungeonLayout) -> Result<Self, TravelError> {
        let mut sandbox = Self::new(layout.branches.clone(), layout.start, Pos::UNKNOWN);
        let mut start = None;
        for entry in &layout.levels {
            layout.branches.validate(entry.id)?;
            let rows: Vec<&str> = entry.rows.iter().map(String::as_str).collect();
            let parsed = KnownLevel::from_ascii(&rows)?;
            if entry.id == layout.start {
                start = parsed.start;
            }
            sandbox.add_level(entry.id, parsed.level);
        }
        sandbox.agent_pos = start.ok_or_else(|| {
            TravelError::InvalidState(format!("start level {} has no '@'", layout.start))
        })?;
        if layout.link_stairs {
            sandbox.link_stairs_by_order();
        }
        for link in &layout.links {
            if link.one_way {
                sandbox.link_one_way(link.from, link.to);
            } else {
                sandbox.link(link.from, link.to);
            }
        }
        sandbox.profile = layout.agent;
        if let Some(radius) = layout.reveal_radius {
            sandbox.reveal_radius = radius;
        }
        sandbox.reveal();
        Ok(sandbox)
    }

    pub fn with_reveal_radius(mut self, radius: i32) -> Self {
        self.reveal_radius = radius;
        self
    }

    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn branches(&self) -> &BranchTable {
        &self.branches
    }

    pub fn add_level(&mut self, id: LevelId, level: KnownLevel) {
        self.levels.insert(id, level);
    }

    pub fn level(&self, id: LevelId) -> Option<&KnownLevel> {
        self.levels.get(&id)
    }

    pub fn level_mut(&mut self, id: LevelId) -> Option<&mut KnownLevel> {
        self.levels.get_mut(&id)
    }

    pub fn level_ids(&self) -> impl Iterator<Item = LevelId> + '_ {
        self.levels.keys().copied()
    }

    /// Two-way link between connectors.
    pub fn link(&mut self, a: LevelPos, b: LevelPos) {
        self.links.insert(a, b);
        self.links.insert(b, a);
    }

    pub fn link_one_way(&mut self, from: LevelPos, to: LevelPos) {
        self.links.insert(from, to);
    }

    pub fn link_target(&self, from: LevelPos) -> Option<LevelPos> {
        self.links.get(&from).copied()
    }

    pub fn link_stairs_by_order(&mut self) {
        let mut pairs = Vec::new();
        for (&id, level) in &self.levels {
            let Some(below) = id.depth.checked_add(1).map(|depth| LevelId { depth, ..id }) else {
                continue;
            };
            let Some(lower) = self.levels.get(&below) else {
                continue;
            };
            let downs = level.connectors().into_iter().filter(|c| c.1 == ConnectorKind::StairsDown);
            let ups = lower.connectors().into_iter().filter(|c| c.1 == ConnectorKind::StairsUp);
            for ((down, _), (up, _)) in downs.zip(ups) {
                pairs.push((LevelPos::new(id, down), LevelPos::new(below, up)));
            }
        }
        for (down, up) in pairs {
            self.link(down, up);
        }
    }

    /// Marks everything within the reveal radius of the agent as seen.
    pub fn reveal(&mut self) {
        let (pos, radius) = (self.agent_pos, self.reveal_radius);
        if let Some(level) = self.levels.get_mut(&self.current) {
            level.reveal_around(pos, radius);
        }
    }

    /// Moves one cell, opening doors on the way. Fails on impassable terrain.
    pub fn step(&mut self, direction: Direction) -> Result<(), TravelError> {
        let next = self.agent_pos.step(direction);
        let level = self.levels.get_mut(&self.current).ok_or_else(|| {
            TravelError::InvalidState(format!("agent is on unknown level {}", self.current))
        })?;
        let terrain = level.terrain_at(next);
        if !is_walkable(terrain, &self.profile) || level.monster_blocks(next) {
            return Err(TravelError::InvalidState(format!("can't step onto {terrain:?} at {next}")));
        }
        if terrain == Feature::ClosedDoor {
            level.set_terrain(next, Feature::OpenDoor);
        }
        self.agent_pos = next;
        self.reveal();
        Ok(())
    }

    pub fn teleport(&mut self, pos: Pos) {
        self.agent_pos = pos;
        self.reveal();
    }

    pub fn set_state(&mut self, state: AgentState) {
        self.state = state;
    }

    pub fn pick_up(&mut self, pos: Pos) -> bool {
        self.levels.get_mut(&self.current).is_some_and(|level| level.take_item(pos))
    }

    /// Runs the active session until it arrives, stops, or `max_turns` actions have been applied.
    /// Items reached by greedy explore are picked up and exploring resumes.
    pub fn drive(&mut self, ctx: &mut TravelContext, max_turns: u32) -> Result<DriveReport, TravelError> {
        let mut report = DriveReport {
            turns: 0,
            moves: 0,
            crossings: 0,
            pickups: 0,
            outcome: DriveOutcome::OutOfTurns,
        };
        while report.turns < max_turns {
            report.turns += 1;
            let goal = ctx.goal();
            match ctx.next_step(&*self)? {
                TravelAction::Move(direction) => {
                    self.step(direction)?;
                    report.moves += 1;
                }
                TravelAction::TakeConnector(_) => match ctx.cross_connector(&mut *self) {
                    Ok(_) => report.crossings += 1,
                    // A dead connector; the repeated-take check ends the session next turn.
                    Err(TravelError::NoPath) => {}
                    Err(err) => return Err(err),
                },
                TravelAction::Arrived => {
                    report.outcome = DriveOutcome::Arrived;
                    return Ok(report);
                }
                TravelAction::Blocked(StopReason::ReachedItem(pos)) => {
                    if self.pick_up(pos) {
                        report.pickups += 1;
                    }
                    if let Some(TravelGoal::Explore { greedy }) = goal {
                        ctx.start_explore(&*self, greedy)?;
                    }
                }
                TravelAction::Blocked(reason) => {
                    report.outcome = DriveOutcome::Stopped(reason);
                    return Ok(report);
                }
            }
        }
        tracing::debug!(target: "travel::sandbox", turns = report.turns, "turn limit reached");
        Ok(report)
    }
}

impl TravelWorld for Sandbox {
    fn current_level(&self) -> LevelId {
        self.current
    }

    fn agent_pos(&self) -> Pos {
        self.agent_pos
    }

    fn agent(&self) -> AgentProfile {
        self.profile
    }

    fn agent_state(&self) -> AgentState {
        self.state
    }

    fn level_view(&self, level: LevelId) -> Option<&dyn LevelView> {
        self.levels.get(&level).map(|known| known as &dyn LevelView)
    }
}

impl LevelTransition for Sandbox {
    fn traverse(&mut self, from: LevelPos) -> Option<LevelPos> {
        if from != LevelPos::new(self.current, self.agent_pos) {
            return None;
        }
        let to = self.link_target(from)?;
        if !self.levels.contains_key(&to.level) {
            return None;
        }
        self.current = to.level;
        self.agent_pos = to.pos;
        self.reveal();
        Some(to)
    }
}
