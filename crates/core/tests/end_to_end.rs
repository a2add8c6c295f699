use tempfile::tempdir;
use travel_core::{
    BranchId, BranchTable, DriveOutcome, DungeonLayout, LevelId, LevelPos, LevelView, Pos, Sandbox,
    StopReason, TravelContext, TravelOptions, TravelWorld, load_cache_from_file,
    save_cache_to_file,
};

const MAX_TURNS: u32 = 500;

fn dungeon_json(reveal_radius: Option<i32>) -> String {
    let radius = reveal_radius.map_or("null".to_string(), |r| r.to_string());
    format!(
        r################"{{
            "levels": [
                {{ "id": {{ "branch": 0, "depth": 1 }}, "rows": [
                    "############",
                    "#@.........#",
                    "#....$...>.#",
                    "############"
                ] }},
                {{ "id": {{ "branch": 0, "depth": 2 }}, "rows": [
                    "############",
                    "#.<........#",
                    "######.#####",
                    "#........>.#",
                    "############"
                ] }},
                {{ "id": {{ "branch": 0, "depth": 3 }}, "rows": [
                    "############",
                    "#........<.#",
                    "#..........#",
                    "############"
                ] }}
            ],
            "start": {{ "branch": 0, "depth": 1 }},
            "reveal_radius": {radius}
        }}"################
    )
}

fn sandbox(reveal_radius: Option<i32>) -> Sandbox {
    let layout: DungeonLayout =
        serde_json::from_str(&dungeon_json(reveal_radius)).expect("layout parses");
    Sandbox::from_layout(&layout).expect("layout is valid")
}

fn dungeon(depth: u8) -> LevelId {
    LevelId { branch: BranchId(0), depth }
}

fn context() -> TravelContext {
    TravelContext::new(TravelOptions::default(), BranchTable::standard())
}

#[test]
fn travel_to_an_unvisited_level_then_back_to_a_waypoint() {
    let mut world = sandbox(None);
    let mut ctx = context();

    ctx.start_interlevel_travel(&world, LevelPos::anywhere(dungeon(3))).expect("D:3 is valid");
    let report = world.drive(&mut ctx, MAX_TURNS).expect("drive to D:3");
    assert_eq!(report.outcome, DriveOutcome::Arrived);
    assert_eq!(report.crossings, 2);
    assert_eq!(world.current_level(), dungeon(3));

    ctx.start_travel(&world, Pos::new(2, 2)).expect("cell on D:3");
    let report = world.drive(&mut ctx, MAX_TURNS).expect("walk on D:3");
    assert_eq!(report.outcome, DriveOutcome::Arrived);
    ctx.set_waypoint(&world, 1).expect("slot 1 exists");

    ctx.start_interlevel_travel(&world, LevelPos::anywhere(dungeon(1))).expect("D:1 is valid");
    let report = world.drive(&mut ctx, MAX_TURNS).expect("climb back to D:1");
    assert_eq!(report.outcome, DriveOutcome::Arrived);
    assert_eq!(world.current_level(), dungeon(1));

    ctx.travel_to_waypoint(&world, 1).expect("waypoint 1 is set");
    let report = world.drive(&mut ctx, MAX_TURNS).expect("return to the waypoint");
    assert_eq!(report.outcome, DriveOutcome::Arrived);
    assert_eq!(report.crossings, 2);
    assert_eq!(world.current_level(), dungeon(3));
    assert_eq!(world.agent_pos(), Pos::new(2, 2));
    assert!(!ctx.is_active());
}

#[test]
fn learned_connectors_survive_a_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("travel").join("cache.jsonl");

    let mut world = sandbox(None);
    let mut ctx = context();
    ctx.start_interlevel_travel(&world, LevelPos::new(dungeon(3), Pos::new(2, 2)))
        .expect("D:3 is valid");
    let first = world.drive(&mut ctx, MAX_TURNS).expect("first trip");
    assert_eq!(first.outcome, DriveOutcome::Arrived);
    ctx.set_waypoint(&world, 0).expect("slot 0 exists");

    let cache = ctx.into_cache();
    save_cache_to_file(&path, &cache).unwrap();
    let loaded = load_cache_from_file(&path).unwrap();
    assert_eq!(loaded, cache);
    assert!(loaded.has_learned_path(dungeon(1), dungeon(3)));

    // A fresh agent on D:1 with only the loaded cache takes the same way down.
    let mut world = sandbox(None);
    let mut ctx = TravelContext::with_cache(loaded, TravelOptions::default(), BranchTable::standard());
    ctx.travel_to_waypoint(&world, 0).expect("waypoint 0 was saved");
    let second = world.drive(&mut ctx, MAX_TURNS).expect("second trip");
    assert_eq!(second.outcome, DriveOutcome::Arrived);
    assert_eq!(second.crossings, 2);
    assert_eq!(second.moves, first.moves);
    assert_eq!(
        LevelPos::new(world.current_level(), world.agent_pos()),
        LevelPos::new(dungeon(3), Pos::new(2, 2))
    );
}

#[test]
fn greedy_explore_collects_items_and_finishes() {
    let mut world = sandbox(Some(2));
    let mut ctx = context();
    assert!(!world.level_view(dungeon(1)).expect("D:1 known").is_seen(Pos::new(2, 10)));

    ctx.start_explore(&world, true).expect("explore D:1");
    let report = world.drive(&mut ctx, MAX_TURNS).expect("explore");
    assert_eq!(report.outcome, DriveOutcome::Stopped(StopReason::FullyExplored));
    assert_eq!(report.pickups, 1);
    assert_eq!(report.crossings, 0);

    let view = world.level_view(dungeon(1)).expect("D:1 known");
    assert!(view.is_seen(Pos::new(2, 10)));
    assert!(!view.needs_visit(Pos::new(2, 5), true));
}

#[test]
fn unknown_branch_levels_are_reported() {
    let mut world = sandbox(None);
    let mut ctx = context();
    let lair = LevelId { branch: BranchId(1), depth: 2 };

    ctx.start_interlevel_travel(&world, LevelPos::anywhere(lair)).expect("Lair:2 exists");
    let report = world.drive(&mut ctx, MAX_TURNS).expect("drive");
    // The main dungeon is followed as deep as it is mapped before giving up.
    assert_eq!(report.outcome, DriveOutcome::Stopped(StopReason::RouteUnknown(lair)));
    assert_eq!(world.current_level(), dungeon(3));
    assert_eq!(
        StopReason::RouteUnknown(lair).status_line(ctx.branches()),
        "Don't know how to get to Lair:2."
    );
}
