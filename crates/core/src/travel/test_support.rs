//! Shared test fixtures for the `travel` submodule test suites.
//! This module exists to avoid repeating level and oracle setup across many tests.
//! It does not own production travel logic.

use std::collections::BTreeSet;

use super::*;
use crate::map::KnownLevel;
use crate::sandbox::Sandbox;

pub(crate) fn lvl(depth: u8) -> LevelId {
    LevelId { branch: BranchId(0), depth }
}

/// Walled room, fully seen.
pub(crate) fn open_level(height: i32, width: i32) -> KnownLevel {
    let mut level = KnownLevel::new(height, width);
    level.reveal_all();
    level
}

/// Parses an ASCII layout and marks every cell seen.
pub(crate) fn seen_level(rows: &[&str]) -> KnownLevel {
    let mut level = KnownLevel::from_ascii(rows).expect("fixture layout must parse").level;
    level.reveal_all();
    level
}

pub(crate) fn oracle_for<'a>(
    level: &'a KnownLevel,
    exclusions: &'a ExclusionSet,
    forbidden: &'a BTreeSet<Feature>,
) -> SafetyOracle<'a> {
    SafetyOracle::new(
        SafetyInputs { view: level, agent: AgentProfile::default(), forbidden },
        exclusions,
    )
}

/// Two stairs at opposite ends of a corridor with a room in the middle.
pub(crate) fn two_stair_level() -> KnownLevel {
    seen_level(&[
        "############",
        "#<...#.....#",
        "#....'...>.#",
        "#....#.....#",
        "############",
    ])
}

/// [`three_level_layout`] with D:1 revealed around the start.
pub(crate) fn three_level_sandbox() -> Sandbox {
    let mut sandbox = three_level_layout();
    sandbox.reveal();
    sandbox
}

/// D:1 -> D:2 -> D:3, one down and one up stair per link, start on D:1 at `@`. Nothing seen yet.
pub(crate) fn three_level_layout() -> Sandbox {
    let d1 = KnownLevel::from_ascii(&[
        "##########",
        "#@.......#",
        "#......>.#",
        "##########",
    ])
    .expect("D:1 layout");
    let d2 = KnownLevel::from_ascii(&[
        "##########",
        "#.<......#",
        "#####.####",
        "#......>.#",
        "##########",
    ])
    .expect("D:2 layout");
    let d3 = KnownLevel::from_ascii(&[
        "##########",
        "#......<.#",
        "#........#",
        "##########",
    ])
    .expect("D:3 layout");

    let mut sandbox = Sandbox::new(BranchTable::standard(), lvl(1), d1.start.unwrap_or(Pos::new(1, 1)));
    sandbox.add_level(lvl(1), d1.level);
    sandbox.add_level(lvl(2), d2.level);
    sandbox.add_level(lvl(3), d3.level);
    sandbox.link_stairs_by_order();
    sandbox
}
