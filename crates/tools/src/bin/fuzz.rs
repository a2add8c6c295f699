use anyhow::{Result, bail};
use clap::Parser;
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};
use travel_core::cache_file::{decode_cache, encode_cache};
use travel_core::{
    BranchId, BranchTable, ConnectorKind, DriveOutcome, Feature, KnownLevel, LevelId, LevelPos,
    Pos, Sandbox, TravelContext, TravelOptions, TravelWorld,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    #[arg(short, long, default_value_t = 200)]
    rounds: u32,
    #[arg(short, long, default_value_t = 4)]
    levels: u8,
}

const HEIGHT: i32 = 14;
const WIDTH: i32 = 24;
const TURNS_PER_ROUND: u32 = 400;

fn choose<T: Clone>(rng: &mut ChaCha8Rng, slice: &[T]) -> T {
    let p = rng.next_u64() as usize % slice.len();
    slice[p].clone()
}

fn dungeon(depth: u8) -> LevelId {
    LevelId { branch: BranchId(0), depth }
}

/// Random walls, water and doors inside a walled rectangle. Returns the level and its open cells.
fn random_level(rng: &mut ChaCha8Rng) -> (KnownLevel, Vec<Pos>) {
    let mut level = KnownLevel::new(HEIGHT, WIDTH);
    let mut open = Vec::new();
    for y in 1..HEIGHT - 1 {
        for x in 1..WIDTH - 1 {
            let pos = Pos::new(y, x);
            let feature = match rng.next_u64() % 20 {
                0..=3 => Feature::Wall,
                4 => Feature::ShallowWater,
                5 => Feature::ClosedDoor,
                _ => Feature::Floor,
            };
            level.set_terrain(pos, feature);
            if feature != Feature::Wall {
                open.push(pos);
            }
        }
    }
    (level, open)
}

fn build_world(rng: &mut ChaCha8Rng, depth: u8) -> Sandbox {
    let mut levels = Vec::new();
    for d in 1..=depth {
        let (mut level, open) = random_level(rng);
        if d > 1 {
            level.set_terrain(choose(rng, &open), Feature::Connector(ConnectorKind::StairsUp));
        }
        if d < depth {
            level.set_terrain(choose(rng, &open), Feature::Connector(ConnectorKind::StairsDown));
        }
        for _ in 0..2 {
            level.place_item(choose(rng, &open));
        }
        levels.push((dungeon(d), level, open));
    }

    let start = levels
        .first()
        .map(|(_, level, open)| {
            open.iter()
                .copied()
                .find(|&pos| level.terrain_at(pos) == Feature::Floor)
                .unwrap_or(Pos::new(1, 1))
        })
        .unwrap_or(Pos::new(1, 1));
    let mut world = Sandbox::new(BranchTable::standard(), dungeon(1), start).with_reveal_radius(6);
    for (id, level, _) in levels {
        world.add_level(id, level);
    }
    world.link_stairs_by_order();
    world.reveal();
    world
}

fn check_invariants(world: &Sandbox, ctx: &TravelContext, round: u32) -> Result<()> {
    let here = world.agent_pos();
    let Some(level) = world.level(world.current_level()) else {
        bail!("Invariant failed in round {round}: agent on a level that does not exist");
    };
    if matches!(level.terrain_at(here), Feature::Wall | Feature::ClosedDoor) {
        bail!("Invariant failed in round {round}: agent at {here} is inside {:?}", level.terrain_at(here));
    }

    for info in ctx.cache().levels() {
        let count = info.connectors().len();
        for i in 0..count {
            for j in 0..count {
                if info.distance_between(i, j) != info.distance_between(j, i) {
                    bail!("Invariant failed in round {round}: asymmetric distances on {}", info.id());
                }
            }
        }
    }

    let decoded = decode_cache(&encode_cache(ctx.cache())?)?;
    if &decoded != ctx.cache() {
        bail!("Invariant failed in round {round}: cache does not survive encoding");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let depth = args.levels.clamp(2, 12);

    println!("Starting travel fuzz on seed {} for {} rounds over {} levels...", args.seed, args.rounds, depth);
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut world = build_world(&mut rng, depth);
    let options = TravelOptions { confirm_detours: false, ..TravelOptions::default() };
    let mut ctx = TravelContext::new(options, BranchTable::standard());

    let mut arrivals = 0;
    let mut stops = 0;
    for round in 0..args.rounds {
        let level = dungeon(1 + (rng.next_u64() % u64::from(depth)) as u8);
        let cell = Pos::new(
            1 + (rng.next_u64() % (HEIGHT as u64 - 2)) as i32,
            1 + (rng.next_u64() % (WIDTH as u64 - 2)) as i32,
        );
        let started = match rng.next_u64() % 5 {
            0 => ctx.start_explore(&world, false),
            1 => ctx.start_explore(&world, true),
            2 => ctx.start_travel(&world, cell),
            3 => ctx.start_interlevel_travel(&world, LevelPos::anywhere(level)),
            _ => ctx.start_interlevel_travel(&world, LevelPos::new(level, cell)),
        };
        if started.is_err() {
            continue;
        }

        let report = world.drive(&mut ctx, TURNS_PER_ROUND)?;
        match report.outcome {
            DriveOutcome::Arrived => arrivals += 1,
            DriveOutcome::Stopped(_) => stops += 1,
            DriveOutcome::OutOfTurns => {
                ctx.stop();
                println!("Round {round} ran out of turns after {} moves", report.moves);
            }
        }
        if let Some(goal) = ctx.goal() {
            bail!("Invariant failed in round {round}: session {goal:?} outlived its drive");
        }
        check_invariants(&world, &ctx, round)?;
    }

    println!("Arrivals: {arrivals}, stops: {stops}, known levels: {}", ctx.cache().levels().count());
    println!("Fuzzing completed successfully.");
    Ok(())
}
