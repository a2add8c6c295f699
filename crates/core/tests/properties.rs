use std::collections::BTreeSet;

use proptest::{
    arbitrary::any,
    test_runner::{Config as ProptestConfig, TestCaseError, TestRunner},
};
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};
use travel_core::travel::{
    LevelInfo, PathStep, Pathfinder, SafetyInputs, SafetyOracle, TraversalPolicy, scan_connectors,
};
use travel_core::{
    AgentProfile, BranchId, BranchTable, ConnectorKind, ExclusionSet, Feature, KnownLevel,
    LevelId, Pos,
};

const HEIGHT: i32 = 12;
const WIDTH: i32 = 16;

/// Walled room with scattered inner walls, fully seen.
fn random_level(seed: u64) -> (KnownLevel, Vec<Pos>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut level = KnownLevel::new(HEIGHT, WIDTH);
    let mut floor = Vec::new();
    for y in 1..HEIGHT - 1 {
        for x in 1..WIDTH - 1 {
            let pos = Pos::new(y, x);
            if rng.next_u64() % 4 == 0 {
                level.set_terrain(pos, Feature::Wall);
            } else {
                floor.push(pos);
            }
        }
    }
    level.reveal_all();
    (level, floor)
}

fn pick(rng: &mut ChaCha8Rng, cells: &[Pos]) -> Pos {
    cells[rng.next_u64() as usize % cells.len()]
}

fn check_paths(map_seed: u64, pick_seed: u64) -> Result<(), String> {
    let (level, floor) = random_level(map_seed);
    if floor.len() < 2 {
        return Ok(());
    }
    let mut rng = ChaCha8Rng::seed_from_u64(pick_seed);
    let a = pick(&mut rng, &floor);
    let b = pick(&mut rng, &floor);

    let exclusions = ExclusionSet::new();
    let forbidden = BTreeSet::new();
    let inputs = SafetyInputs { view: &level, agent: AgentProfile::default(), forbidden: &forbidden };
    let oracle = SafetyOracle::new(inputs, &exclusions);
    let mut pathfinder = Pathfinder::new();

    let from_a = pathfinder.distances_from(&oracle, a).clone();
    let again = pathfinder.distances_from(&oracle, a).clone();
    if from_a != again {
        return Err(format!("flood from {a} is not deterministic (map_seed {map_seed})"));
    }
    let from_b = pathfinder.distances_from(&oracle, b).clone();
    if from_a.distance(b) != from_b.distance(a) {
        return Err(format!("distance {a} <-> {b} is not symmetric (map_seed {map_seed})"));
    }

    match (pathfinder.path(&oracle, a, b), from_a.distance(b)) {
        (Some(path), Some(distance)) => {
            if path.len() as u32 != distance {
                return Err(format!("path {a} -> {b} has {} steps, flood says {distance}", path.len()));
            }
            let mut prev = a;
            for &cell in &path {
                if prev.chebyshev(cell) != 1 {
                    return Err(format!("path jumps from {prev} to {cell}"));
                }
                if !oracle.is_traversable(cell, TraversalPolicy::STRICT) {
                    return Err(format!("path crosses unsafe cell {cell}"));
                }
                prev = cell;
            }
        }
        (None, None) => {}
        (path, distance) => {
            return Err(format!("path {path:?} disagrees with distance {distance:?} for {a} -> {b}"));
        }
    }

    match pathfinder.next_step(&oracle, a, b) {
        Ok(PathStep::Arrived) if a == b => {}
        Ok(PathStep::Step { next, remaining, .. }) => {
            if Some(remaining + 1) != from_b.distance(a) || from_b.distance(next) != Some(remaining) {
                return Err(format!("step {a} -> {next} does not shorten the way to {b}"));
            }
        }
        Err(_) if from_a.distance(b).is_none() => {}
        other => return Err(format!("unexpected next step {other:?} for {a} -> {b}")),
    }
    Ok(())
}

fn check_connector_symmetry(map_seed: u64, pick_seed: u64) -> Result<(), String> {
    let (mut level, floor) = random_level(map_seed);
    if floor.len() < 2 {
        return Ok(());
    }
    let mut rng = ChaCha8Rng::seed_from_u64(pick_seed);
    let a = pick(&mut rng, &floor);
    let b = pick(&mut rng, &floor);
    if a == b {
        return Ok(());
    }
    level.set_terrain(a, Feature::Connector(ConnectorKind::StairsDown));
    level.set_terrain(b, Feature::Connector(ConnectorKind::StairsUp));

    let forbidden = BTreeSet::new();
    let inputs = SafetyInputs { view: &level, agent: AgentProfile::default(), forbidden: &forbidden };
    let mut info = LevelInfo::new(LevelId { branch: BranchId(0), depth: 2 });
    let mut pathfinder = Pathfinder::new();
    info.record_observed(&scan_connectors(&level), &BranchTable::standard(), inputs, &mut pathfinder);

    let (Some(ia), Some(ib)) = (info.connector_index(a), info.connector_index(b)) else {
        return Err(format!("connectors at {a} and {b} were not recorded"));
    };
    if info.distance_between(ia, ib) != info.distance_between(ib, ia) {
        return Err(format!(
            "connector distances differ: {:?} vs {:?} (map_seed {map_seed})",
            info.distance_between(ia, ib),
            info.distance_between(ib, ia)
        ));
    }
    Ok(())
}

#[test]
fn paths_agree_with_flood_distances() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(64));
    let seeds = (any::<u64>(), any::<u64>());

    runner
        .run(&seeds, |(map_seed, pick_seed)| {
            check_paths(map_seed, pick_seed).map_err(TestCaseError::fail)?;
            Ok(())
        })
        .expect("paths should agree with flood distances");
}

#[test]
fn connector_distances_are_symmetric() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(32));
    let seeds = (any::<u64>(), any::<u64>());

    runner
        .run(&seeds, |(map_seed, pick_seed)| {
            check_connector_symmetry(map_seed, pick_seed).map_err(TestCaseError::fail)?;
            Ok(())
        })
        .expect("connector distance matrix should be symmetric on open levels");
}
