//! Explore target selection on top of the floodout pathfinder.
//! This module exists to weigh the nearest unexplored frontier against the nearest item
//! worth a detour, and to tell "done" apart from "blocked by hazards".
//! It does not step the agent; the travel driver turns targets into moves.

use std::ops::ControlFlow;

use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExploreTargetKind {
    /// A reachable cell bordering unseen territory.
    Frontier,
    /// A reachable cell holding something worth picking up.
    Item,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExploreTarget {
    pub pos: Pos,
    pub kind: ExploreTargetKind,
    pub distance: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExploreOutcome {
    Target(ExploreTarget),
    FullyExplored,
    /// Unseen territory, or an item greedy explore wants, remains but only behind hazards.
    PartlyExplored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExploreRequest {
    pub greedy: bool,
    /// Added to item distances before comparing them with frontier distances.
    pub item_greed: i32,
    pub autopickup: bool,
}

impl ExploreRequest {
    pub fn from_options(options: &TravelOptions, greedy: bool) -> Self {
        Self { greedy, item_greed: options.explore_item_greed, autopickup: options.autopickup }
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    pos: Pos,
    distance: u32,
    adjusted: i64,
}

#[derive(Default)]
struct Candidates {
    frontier: Option<Candidate>,
    item: Option<Candidate>,
}

impl Candidates {
    /// Lower adjusted distance wins; ties go to the item.
    fn winner(&self) -> Option<ExploreTarget> {
        let pick = |c: Candidate, kind| ExploreTarget { pos: c.pos, kind, distance: c.distance };
        match (self.frontier, self.item) {
            (Some(f), Some(i)) if f.adjusted < i.adjusted => Some(pick(f, ExploreTargetKind::Frontier)),
            (_, Some(i)) => Some(pick(i, ExploreTargetKind::Item)),
            (Some(f), None) => Some(pick(f, ExploreTargetKind::Frontier)),
            (None, None) => None,
        }
    }

    /// Whether nothing expanded at `round` or later can change the winner.
    fn is_settled(&self, round: i64, greed: i64) -> bool {
        match (self.frontier, self.item) {
            (Some(_), Some(_)) => true,
            (Some(f), None) => round + greed > f.adjusted,
            (None, Some(i)) => round >= i.adjusted,
            (None, None) => false,
        }
    }
}

fn borders_unseen(view: &dyn LevelView, pos: Pos) -> bool {
    neighbors(pos).into_iter().any(|n| view.in_bounds(n) && !view.is_seen(n))
}

/// Picks where explore should head next from `origin`.
pub fn select_explore_target(
    pathfinder: &mut Pathfinder,
    oracle: &SafetyOracle<'_>,
    origin: Pos,
    request: ExploreRequest,
) -> ExploreOutcome {
    let view = oracle.view();
    let greedy = request.greedy && request.autopickup;
    let greed = if greedy { i64::from(request.item_greed) } else { 0 };
    let mut found = Candidates::default();

    pathfinder.flood_from(oracle, origin, &mut |_, pos, distance| {
        let round = i64::from(distance);
        if found.is_settled(round, greed) {
            return ControlFlow::Break(());
        }
        if found.frontier.is_none() && pos != origin && borders_unseen(view, pos) {
            found.frontier = Some(Candidate { pos, distance, adjusted: round });
            if !greedy {
                return ControlFlow::Break(());
            }
        }
        if greedy && found.item.is_none() && view.needs_visit(pos, request.autopickup) {
            found.item = Some(Candidate { pos, distance, adjusted: round + greed });
        }
        if found.is_settled(round, greed) {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    });

    if let Some(target) = found.winner() {
        return ExploreOutcome::Target(target);
    }

    // Items only count as unreached when explore would have gone for them.
    let mut blocked = false;
    pathfinder.flood_hazards(oracle, &mut |_, pos, _| {
        if borders_unseen(view, pos) || (greedy && view.needs_visit(pos, request.autopickup)) {
            blocked = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    });
    if blocked { ExploreOutcome::PartlyExplored } else { ExploreOutcome::FullyExplored }
}

/// A previously chosen target is kept while it still serves its purpose.
pub fn is_target_still_valid(view: &dyn LevelView, target: &ExploreTarget, autopickup: bool) -> bool {
    match target.kind {
        ExploreTargetKind::Frontier => borders_unseen(view, target.pos),
        ExploreTargetKind::Item => view.needs_visit(target.pos, autopickup),
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused_imports)]
    use std::collections::BTreeSet;

    use super::*;
    use crate::travel::test_support::*;

    fn request(greedy: bool, item_greed: i32) -> ExploreRequest {
        ExploreRequest { greedy, item_greed, autopickup: true }
    }

    #[test]
    fn seen_empty_room_is_fully_explored() {
        let level = open_level(6, 8);
        let exclusions = ExclusionSet::new();
        let forbidden = BTreeSet::new();
        let oracle = oracle_for(&level, &exclusions, &forbidden);
        let mut pathfinder = Pathfinder::new();
        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(2, 2), request(true, 10));
        assert_eq!(outcome, ExploreOutcome::FullyExplored);
    }

    #[test]
    fn nearest_frontier_is_chosen() {
        let mut level = open_level(7, 12);
        for y in 0..7 {
            level.forget(Pos::new(y, 11));
            level.forget(Pos::new(y, 10));
        }
        let exclusions = ExclusionSet::new();
        let forbidden = BTreeSet::new();
        let oracle = oracle_for(&level, &exclusions, &forbidden);
        let mut pathfinder = Pathfinder::new();
        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(3, 2), request(false, 0));
        let ExploreOutcome::Target(target) = outcome else {
            panic!("expected a frontier target, got {outcome:?}");
        };
        assert_eq!(target.kind, ExploreTargetKind::Frontier);
        assert_eq!(target.pos.x, 9, "frontier cells border the unseen columns");
        assert_eq!(target.distance, 7);
    }

    #[test]
    fn positive_greed_finishes_exploring_before_distant_items() {
        let mut level = seen_level(&[
            "##############",
            "#@..........$#",
            "##############",
        ]);
        level.forget(Pos::new(0, 3));
        let exclusions = ExclusionSet::new();
        let forbidden = BTreeSet::new();
        let oracle = oracle_for(&level, &exclusions, &forbidden);
        let mut pathfinder = Pathfinder::new();

        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(1, 1), request(true, 5));
        assert!(matches!(
            outcome,
            ExploreOutcome::Target(ExploreTarget { kind: ExploreTargetKind::Frontier, .. })
        ));

        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(1, 1), request(true, -20));
        assert_eq!(
            outcome,
            ExploreOutcome::Target(ExploreTarget {
                pos: Pos::new(1, 12),
                kind: ExploreTargetKind::Item,
                distance: 11
            })
        );
    }

    #[test]
    fn item_wins_ties_and_plain_explore_ignores_items() {
        let mut level = seen_level(&[
            "##########",
            "#@..$....#",
            "##########",
        ]);
        level.forget(Pos::new(0, 2));
        let exclusions = ExclusionSet::new();
        let forbidden = BTreeSet::new();
        let oracle = oracle_for(&level, &exclusions, &forbidden);
        let mut pathfinder = Pathfinder::new();

        // Frontier at (1, 2) is one round away, the item three; greed -2 ties them.
        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(1, 1), request(true, -2));
        assert!(matches!(
            outcome,
            ExploreOutcome::Target(ExploreTarget { kind: ExploreTargetKind::Item, .. })
        ));

        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(1, 1), request(false, -2));
        assert!(matches!(
            outcome,
            ExploreOutcome::Target(ExploreTarget { kind: ExploreTargetKind::Frontier, .. })
        ));
    }

    #[test]
    fn unseen_area_behind_lava_is_partly_explored() {
        let mut level = seen_level(&[
            "#########",
            "#...l...#",
            "#...l...#",
            "#########",
        ]);
        for y in 0..4 {
            level.forget(Pos::new(y, 7));
            level.forget(Pos::new(y, 8));
        }
        let exclusions = ExclusionSet::new();
        let forbidden = BTreeSet::new();
        let oracle = oracle_for(&level, &exclusions, &forbidden);
        let mut pathfinder = Pathfinder::new();
        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(1, 1), request(false, 0));
        assert_eq!(outcome, ExploreOutcome::PartlyExplored);
    }

    #[test]
    fn item_behind_deep_water_leaves_greedy_explore_unfinished() {
        let level = seen_level(&[
            "#########",
            "#...w.$.#",
            "#...w...#",
            "#########",
        ]);
        let exclusions = ExclusionSet::new();
        let forbidden = BTreeSet::new();
        let oracle = oracle_for(&level, &exclusions, &forbidden);
        let mut pathfinder = Pathfinder::new();

        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(1, 1), request(true, 0));
        assert_eq!(outcome, ExploreOutcome::PartlyExplored);
        let outcome = select_explore_target(&mut pathfinder, &oracle, Pos::new(1, 1), request(false, 0));
        assert_eq!(outcome, ExploreOutcome::FullyExplored);
    }

    #[test]
    fn targets_stay_valid_until_their_purpose_is_served() {
        let mut level = open_level(5, 6);
        level.place_item(Pos::new(2, 2));
        let frontier = ExploreTarget { pos: Pos::new(1, 4), kind: ExploreTargetKind::Frontier, distance: 3 };
        let item = ExploreTarget { pos: Pos::new(2, 2), kind: ExploreTargetKind::Item, distance: 1 };
        assert!(!is_target_still_valid(&level, &frontier, true));
        assert!(is_target_still_valid(&level, &item, true));
        assert!(!is_target_still_valid(&level, &item, false));

        level.forget(Pos::new(0, 5));
        level.take_item(Pos::new(2, 2));
        assert!(is_target_still_valid(&level, &frontier, true));
        assert!(!is_target_still_valid(&level, &item, true));
    }
}
