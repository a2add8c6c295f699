//! Per-level connector graph with cached pairwise walking distances.
//! This module exists so route planning can hop across a level without re-flooding it.
//! It does not decide routes; it only records what is known about one level's connectors.

use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorState {
    /// In view right now.
    Physical,
    /// Known from memory but out of sight.
    Mapped,
    /// Known only from the far side; the recorded position may be wrong.
    Placeholder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub pos: Pos,
    pub kind: ConnectorKind,
    /// `None` when even the far level is unknown.
    pub destination: Option<LevelPos>,
    /// True until someone has actually crossed and observed the far end.
    pub guessed: bool,
    pub state: ConnectorState,
}

impl Connector {
    pub fn is_resolved(&self) -> bool {
        self.destination.is_some_and(|d| d.is_resolved())
    }

    pub fn destination_level(&self) -> Option<LevelId> {
        self.destination.map(|d| d.level)
    }
}

/// A connector found on the level map during a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObservedConnector {
    pub pos: Pos,
    pub kind: ConnectorKind,
    pub visible: bool,
}

/// Every connector the agent knows about on `view`, in position order.
pub fn scan_connectors(view: &dyn LevelView) -> Vec<ObservedConnector> {
    let (height, width) = view.bounds();
    let mut found = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let pos = Pos { y, x };
            if let Some(kind) = view.feature_at(pos).and_then(Feature::connector_kind) {
                found.push(ObservedConnector { pos, kind, visible: view.is_visible(pos) });
            }
        }
    }
    found
}

/// Hash of the terrain knowledge and exclusions that connector distances depend on.
pub fn knowledge_fingerprint(view: &dyn LevelView, exclusions: &ExclusionSet) -> u64 {
    let (height, width) = view.bounds();
    let mut hasher = Xxh3::new();
    hasher.write_i32(height);
    hasher.write_i32(width);
    for y in 0..height {
        for x in 0..width {
            hasher.write_u16(view.feature_at(Pos { y, x }).map_or(0, Feature::stable_code));
        }
    }
    for zone in exclusions.iter() {
        hasher.write_i32(zone.center.y);
        hasher.write_i32(zone.center.x);
        hasher.write_u8(zone.radius);
        hasher.write_u8(zone.kind as u8);
    }
    hasher.finish()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelInfo {
    id: LevelId,
    connectors: Vec<Connector>,
    /// Row-major `n * n`; row `i` comes from the flood seeded at connector `i`.
    distances: Vec<Option<u32>>,
    exclusions: ExclusionSet,
    fingerprint: Option<u64>,
}

impl LevelInfo {
    pub fn new(id: LevelId) -> Self {
        Self {
            id,
            connectors: Vec::new(),
            distances: Vec::new(),
            exclusions: ExclusionSet::new(),
            fingerprint: None,
        }
    }

    pub(crate) fn from_parts(
        id: LevelId,
        connectors: Vec<Connector>,
        distances: Vec<Option<u32>>,
        exclusions: ExclusionSet,
        fingerprint: Option<u64>,
    ) -> Result<Self, String> {
        let n = connectors.len();
        if distances.len() != n * n {
            return Err(format!(
                "level {id}: {n} connectors need {} distances, found {}",
                n * n,
                distances.len()
            ));
        }
        for (i, connector) in connectors.iter().enumerate() {
            if connectors[..i].iter().any(|other| other.pos == connector.pos) {
                return Err(format!("level {id}: two connectors at {}", connector.pos));
            }
        }
        Ok(Self { id, connectors, distances, exclusions, fingerprint })
    }

    pub fn id(&self) -> LevelId {
        self.id
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    pub fn distances(&self) -> &[Option<u32>] {
        &self.distances
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Any edit to the exclusions leaves the matrix stale until the next rebuild.
    pub fn exclusions_mut(&mut self) -> &mut ExclusionSet {
        self.fingerprint = None;
        &mut self.exclusions
    }

    pub fn fingerprint(&self) -> Option<u64> {
        self.fingerprint
    }

    pub fn connector_index(&self, pos: Pos) -> Option<usize> {
        self.connectors.iter().position(|c| c.pos == pos)
    }

    pub fn connector_at(&self, pos: Pos) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.pos == pos)
    }

    pub fn distance_between(&self, from: usize, to: usize) -> Option<u32> {
        let n = self.connectors.len();
        if from >= n || to >= n {
            return None;
        }
        self.distances[from * n + to]
    }

    /// Fails with `StaleCache` when `current` differs from the knowledge the matrix was built on.
    pub fn check_fresh(&self, current: u64) -> Result<(), TravelError> {
        if self.fingerprint == Some(current) {
            Ok(())
        } else {
            Err(TravelError::StaleCache(self.id))
        }
    }

    /// True when distances are cached but were built before the latest exclusion edit.
    pub fn has_stale_distances(&self) -> bool {
        self.fingerprint.is_none() && self.distances.iter().any(Option::is_some)
    }

    /// Drops every cached distance. The connectors and their destinations stay.
    pub fn forget_distances(&mut self) {
        self.distances.fill(None);
        self.fingerprint = None;
    }

    /// Replaces the connector list with what is on the map now, then rebuilds the matrix.
    ///
    /// Known connectors keep their learned destinations, vanished ones are dropped, new ones
    /// get a branch-table guess, and placeholders are consumed by the real connector they
    /// stood in for.
    pub fn record_observed(
        &mut self,
        observed: &[ObservedConnector],
        branches: &BranchTable,
        inputs: SafetyInputs<'_>,
        pathfinder: &mut Pathfinder,
    ) {
        let mut placeholders: Vec<Connector> = self
            .connectors
            .iter()
            .filter(|c| c.state == ConnectorState::Placeholder)
            .cloned()
            .collect();
        let mut rebuilt = Vec::with_capacity(observed.len() + placeholders.len());

        for seen in observed {
            let state =
                if seen.visible { ConnectorState::Physical } else { ConnectorState::Mapped };
            let guess = branches.guess_destination(self.id, seen.kind);

            if let Some(known) = self.connectors.iter().find(|c| {
                c.state != ConnectorState::Placeholder && c.pos == seen.pos && c.kind == seen.kind
            }) {
                rebuilt.push(Connector { state, ..known.clone() });
                continue;
            }

            let stand_in = placeholders.iter().position(|p| p.pos == seen.pos).or_else(|| {
                placeholders.iter().position(|p| {
                    p.kind == seen.kind && guess.is_some() && p.destination_level() == guess
                })
            });
            if let Some(index) = stand_in {
                let placeholder = placeholders.remove(index);
                rebuilt.push(Connector {
                    pos: seen.pos,
                    kind: seen.kind,
                    destination: placeholder.destination,
                    guessed: placeholder.guessed,
                    state,
                });
                continue;
            }

            rebuilt.push(Connector {
                pos: seen.pos,
                kind: seen.kind,
                destination: guess.map(LevelPos::anywhere),
                guessed: true,
                state,
            });
        }

        // Unmatched placeholders still carry a known destination.
        for placeholder in placeholders {
            if !rebuilt.iter().any(|c| c.pos == placeholder.pos) {
                rebuilt.push(placeholder);
            }
        }

        self.connectors = rebuilt;
        self.recompute_distances(inputs, pathfinder);
    }

    /// Sets a connector's destination.
    ///
    /// A guess never overwrites an observed destination. An observed destination is copied to
    /// same-kind connectors that are still guessed and unresolved, which keep `guessed` set.
    /// Returns false when there is no connector at `pos` or the update was refused.
    pub fn update_connector(&mut self, pos: Pos, destination: LevelPos, guessed: bool) -> bool {
        let Some(index) = self.connector_index(pos) else {
            return false;
        };
        let connector = &mut self.connectors[index];
        if !connector.guessed && guessed {
            return false;
        }
        connector.destination = Some(destination);
        connector.guessed = guessed;
        let kind = connector.kind;

        if !guessed {
            for (i, sibling) in self.connectors.iter_mut().enumerate() {
                if i != index && sibling.kind == kind && sibling.guessed && !sibling.is_resolved() {
                    sibling.destination = Some(destination);
                }
            }
        }
        true
    }

    /// Records a connector known only from the far side. Its matrix row stays unknown.
    pub fn add_placeholder(
        &mut self,
        pos: Pos,
        kind: ConnectorKind,
        destination: LevelPos,
        guessed: bool,
    ) {
        self.add_connector(Connector {
            pos,
            kind,
            destination: Some(destination),
            guessed,
            state: ConnectorState::Placeholder,
        });
    }

    /// Appends a connector with unknown distances until the next rebuild.
    /// Ignored when a connector already sits at the same position.
    pub fn add_connector(&mut self, connector: Connector) {
        if self.connector_index(connector.pos).is_some() {
            return;
        }
        self.connectors.push(connector);
        let n = self.connectors.len();
        let mut grown = vec![None; n * n];
        for i in 0..n - 1 {
            for j in 0..n - 1 {
                grown[i * n + j] = self.distances[i * (n - 1) + j];
            }
        }
        self.distances = grown;
    }

    /// One flood per connector; row `i` of the matrix is read off connector `i`'s flood.
    pub fn recompute_distances(&mut self, inputs: SafetyInputs<'_>, pathfinder: &mut Pathfinder) {
        let oracle = SafetyOracle::new(inputs, &self.exclusions);
        let n = self.connectors.len();
        let mut distances = vec![None; n * n];
        for (i, from) in self.connectors.iter().enumerate() {
            if from.state == ConnectorState::Placeholder {
                continue;
            }
            let grid = pathfinder.distances_from(&oracle, from.pos);
            for (j, to) in self.connectors.iter().enumerate() {
                if i == j || to.state == ConnectorState::Placeholder {
                    continue;
                }
                distances[i * n + j] = grid.distance(to.pos).filter(|&d| d > 0);
            }
        }
        self.distances = distances;
        self.fingerprint = Some(knowledge_fingerprint(inputs.view, &self.exclusions));
        tracing::debug!(
            target: "travel::level_info",
            level = %self.id,
            connectors = n,
            "rebuilt connector distances"
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused_imports)]
    use std::collections::BTreeSet;

    use super::*;
    use crate::map::KnownLevel;
    use crate::travel::test_support::*;

    fn rebuild(info: &mut LevelInfo, level: &KnownLevel, pathfinder: &mut Pathfinder) {
        let forbidden = BTreeSet::new();
        let inputs = SafetyInputs { view: level, agent: AgentProfile::default(), forbidden: &forbidden };
        info.record_observed(&scan_connectors(level), &BranchTable::standard(), inputs, pathfinder);
    }

    #[test]
    fn new_connectors_get_branch_guesses() {
        let level = two_stair_level();
        let mut info = LevelInfo::new(lvl(2));
        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);

        let up = info.connector_at(Pos::new(1, 1)).expect("up stairs recorded");
        assert_eq!(up.destination, Some(LevelPos::anywhere(lvl(1))));
        assert!(up.guessed);
        let down = info.connector_at(Pos::new(2, 9)).expect("down stairs recorded");
        assert_eq!(down.destination, Some(LevelPos::anywhere(lvl(3))));
        assert_eq!(down.state, ConnectorState::Mapped);
    }

    #[test]
    fn distances_are_symmetric_on_an_open_level() {
        let level = two_stair_level();
        let mut info = LevelInfo::new(lvl(2));
        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);

        let a = info.connector_index(Pos::new(1, 1)).expect("up stairs");
        let b = info.connector_index(Pos::new(2, 9)).expect("down stairs");
        assert_eq!(info.distance_between(a, b), Some(8));
        assert_eq!(info.distance_between(a, b), info.distance_between(b, a));
        assert_eq!(info.distance_between(a, a), None);
    }

    #[test]
    fn rebuilding_unchanged_level_is_idempotent() {
        let level = two_stair_level();
        let mut info = LevelInfo::new(lvl(2));
        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);
        let first = info.clone();
        rebuild(&mut info, &level, &mut pathfinder);
        assert_eq!(info.connectors(), first.connectors());
        assert_eq!(info.distances(), first.distances());
        assert_eq!(info.fingerprint(), first.fingerprint());
    }

    #[test]
    fn vanished_connectors_are_dropped_and_learned_ones_kept() {
        let mut level = two_stair_level();
        let mut info = LevelInfo::new(lvl(2));
        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);
        let landing = LevelPos::new(lvl(1), Pos::new(4, 4));
        assert!(info.update_connector(Pos::new(1, 1), landing, false));

        level.set_terrain(Pos::new(2, 9), Feature::Floor);
        rebuild(&mut info, &level, &mut pathfinder);
        assert_eq!(info.connectors().len(), 1);
        assert_eq!(info.connectors()[0].destination, Some(landing));
        assert!(!info.connectors()[0].guessed);
        assert_eq!(info.distances(), &[None]);
    }

    #[test]
    fn observed_destination_propagates_to_guessed_siblings() {
        let level = seen_level(&[
            "#########",
            "#>.....>#",
            "#########",
        ]);
        let mut info = LevelInfo::new(lvl(1));
        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);

        let landing = LevelPos::new(lvl(2), Pos::new(3, 3));
        assert!(info.update_connector(Pos::new(1, 1), landing, false));
        let sibling = info.connector_at(Pos::new(1, 7)).expect("second down stairs");
        assert_eq!(sibling.destination, Some(landing));
        assert!(sibling.guessed, "propagated destinations remain guesses");
    }

    #[test]
    fn guesses_never_overwrite_observations() {
        let level = two_stair_level();
        let mut info = LevelInfo::new(lvl(2));
        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);

        let observed = LevelPos::new(lvl(3), Pos::new(2, 2));
        assert!(info.update_connector(Pos::new(2, 9), observed, false));
        assert!(!info.update_connector(Pos::new(2, 9), LevelPos::new(lvl(3), Pos::new(5, 5)), true));
        assert_eq!(info.connector_at(Pos::new(2, 9)).and_then(|c| c.destination), Some(observed));
        assert!(!info.update_connector(Pos::new(3, 3), observed, false), "no connector there");
    }

    #[test]
    fn placeholder_is_replaced_by_the_real_connector() {
        let level = two_stair_level();
        let mut info = LevelInfo::new(lvl(2));
        let back = LevelPos::new(lvl(1), Pos::new(2, 7));
        info.add_placeholder(Pos::new(1, 1), ConnectorKind::StairsUp, back, true);
        assert_eq!(info.connectors()[0].state, ConnectorState::Placeholder);
        assert_eq!(info.distances(), &[None]);

        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);
        assert_eq!(info.connectors().len(), 2);
        let up = info.connector_at(Pos::new(1, 1)).expect("real up stairs");
        assert_eq!(up.state, ConnectorState::Mapped);
        assert_eq!(up.destination, Some(back));
    }

    #[test]
    fn stale_fingerprint_is_reported() {
        let mut level = two_stair_level();
        let mut info = LevelInfo::new(lvl(2));
        let mut pathfinder = Pathfinder::new();
        rebuild(&mut info, &level, &mut pathfinder);
        let fresh = knowledge_fingerprint(&level, info.exclusions());
        assert_eq!(info.check_fresh(fresh), Ok(()));

        level.set_terrain(Pos::new(2, 5), Feature::Wall);
        let changed = knowledge_fingerprint(&level, info.exclusions());
        assert_eq!(info.check_fresh(changed), Err(TravelError::StaleCache(lvl(2))));
    }
}
