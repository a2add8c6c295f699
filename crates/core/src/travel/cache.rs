//! Everything travel has learned across levels: connector graphs and waypoints.
//! This module exists so crossings, placeholders and waypoint slots are updated in one place.
//! It does not touch disk; `cache_file` owns the persisted form.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::*;

pub const WAYPOINT_COUNT: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TravelCache {
    levels: BTreeMap<LevelId, LevelInfo>,
    waypoints: [Option<LevelPos>; WAYPOINT_COUNT],
}

impl TravelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, id: LevelId) -> Option<&LevelInfo> {
        self.levels.get(&id)
    }

    /// Creates an empty record on first access.
    pub fn level_mut(&mut self, id: LevelId) -> &mut LevelInfo {
        self.levels.entry(id).or_insert_with(|| LevelInfo::new(id))
    }

    pub fn has_level(&self, id: LevelId) -> bool {
        self.levels.contains_key(&id)
    }

    pub fn levels(&self) -> impl Iterator<Item = &LevelInfo> {
        self.levels.values()
    }

    pub(crate) fn insert_level(&mut self, info: LevelInfo) {
        self.levels.insert(info.id(), info);
    }

    /// Records that taking the `kind` connector at `from` put the agent at `to`.
    ///
    /// The near side learns its true destination. The far side learns where it leads back to,
    /// as a guess, unless the connector is one-way.
    pub fn record_crossing(&mut self, from: LevelPos, kind: ConnectorKind, to: LevelPos) {
        tracing::debug!(
            target: "travel::cache",
            from = %from.level,
            to = %to.level,
            kind = ?kind,
            "recorded connector crossing"
        );
        let near = self.level_mut(from.level);
        if !near.update_connector(from.pos, to, false) {
            near.add_connector(Connector {
                pos: from.pos,
                kind,
                destination: Some(to),
                guessed: false,
                state: ConnectorState::Mapped,
            });
        }

        if kind.is_one_way() {
            return;
        }
        let Some(back_kind) = kind.reverse() else {
            return;
        };
        let far = self.level_mut(to.level);
        if !far.update_connector(to.pos, from, true) {
            far.add_placeholder(to.pos, back_kind, from, true);
        }
    }

    pub fn set_waypoint(&mut self, number: usize, at: LevelPos) -> Result<(), TravelError> {
        let slot = self.waypoints.get_mut(number).ok_or_else(|| {
            TravelError::InvalidState(format!("waypoint {number} is out of range"))
        })?;
        *slot = Some(at);
        Ok(())
    }

    pub fn clear_waypoint(&mut self, number: usize) -> Option<LevelPos> {
        self.waypoints.get_mut(number).and_then(Option::take)
    }

    pub fn waypoint(&self, number: usize) -> Option<LevelPos> {
        self.waypoints.get(number).copied().flatten()
    }

    pub fn waypoints(&self) -> &[Option<LevelPos>; WAYPOINT_COUNT] {
        &self.waypoints
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.iter().flatten().count()
    }

    /// Slot holding exactly `at`, if any.
    pub fn waypoint_number(&self, at: LevelPos) -> Option<usize> {
        self.waypoints.iter().position(|w| *w == Some(at))
    }

    /// Waypoint positions on `level`, for feature listings.
    pub fn waypoints_on(&self, level: LevelId) -> Vec<Pos> {
        self.waypoints.iter().flatten().filter(|w| w.level == level).map(|w| w.pos).collect()
    }

    pub fn is_known_branch(&self, branch: BranchId) -> bool {
        self.levels.keys().any(|id| id.branch == branch)
    }

    /// Whether some chain of crossed connectors leads from `from` to `to`.
    /// Guessed destinations, including far sides learned only as a reverse guess, do not count.
    pub fn has_learned_path(&self, from: LevelId, to: LevelId) -> bool {
        let mut seen = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(level) = queue.pop_front() {
            if level == to {
                return true;
            }
            let Some(info) = self.levels.get(&level) else {
                continue;
            };
            let observed = info.connectors().iter().filter(|c| !c.guessed);
            for next in observed.filter_map(Connector::destination_level) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }
}
