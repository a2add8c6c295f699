use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::fs;
use std::path::Path;
use travel_core::{
    BranchTable, DriveOutcome, DungeonLayout, LevelId, LevelPos, Pos, Sandbox, TravelCache,
    TravelContext, TravelOptions, TravelWorld, load_cache_from_file, save_cache_to_file,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the dungeon layout JSON file
    #[arg(short, long)]
    dungeon: String,
    /// Path to a TOML file with travel options
    #[arg(short, long)]
    options: Option<String>,
    /// Destination as BRANCH:DEPTH or BRANCH:DEPTH:Y,X
    #[arg(short, long, conflicts_with_all = ["waypoint", "explore"])]
    target: Option<String>,
    /// Travel to a saved waypoint
    #[arg(short, long, conflicts_with = "explore")]
    waypoint: Option<usize>,
    /// Explore the starting level instead of travelling
    #[arg(short, long)]
    explore: bool,
    /// Detour for items while exploring
    #[arg(short, long, requires = "explore")]
    greedy: bool,
    /// Save the agent's final position as this waypoint
    #[arg(long)]
    mark: Option<usize>,
    /// Travel cache file, loaded before and saved after the run
    #[arg(short, long)]
    cache: Option<String>,
    #[arg(short, long, default_value_t = 2000)]
    max_turns: u32,
}

fn parse_destination(branches: &BranchTable, text: &str) -> Result<LevelPos> {
    let mut parts = text.splitn(3, ':');
    let abbrev = parts.next().unwrap_or_default();
    let branch = branches
        .find_by_abbrev(abbrev)
        .ok_or_else(|| anyhow!("Unknown branch '{abbrev}' in destination '{text}'"))?;
    let depth: u8 = parts
        .next()
        .ok_or_else(|| anyhow!("Destination '{text}' has no depth"))?
        .parse()
        .with_context(|| format!("Invalid depth in destination '{text}'"))?;
    let level = LevelId::new(branch.id, depth)?;

    let Some(cell) = parts.next() else {
        return Ok(LevelPos::anywhere(level));
    };
    let Some((y, x)) = cell.split_once(',') else {
        bail!("Expected Y,X after the depth in destination '{text}'");
    };
    let pos = Pos::new(
        y.trim().parse().with_context(|| format!("Invalid row in destination '{text}'"))?,
        x.trim().parse().with_context(|| format!("Invalid column in destination '{text}'"))?,
    );
    Ok(LevelPos::new(level, pos))
}

fn load_options(path: Option<&str>) -> Result<TravelOptions> {
    let Some(path) = path else {
        return Ok(TravelOptions::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read options file: {path}"))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse options file: {path}"))
}

fn load_cache(path: Option<&str>) -> Result<TravelCache> {
    match path {
        Some(path) if Path::new(path).exists() => load_cache_from_file(Path::new(path))
            .with_context(|| format!("Failed to load travel cache: {path}")),
        _ => Ok(TravelCache::new()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let layout_data = fs::read_to_string(&args.dungeon)
        .with_context(|| format!("Failed to read dungeon file: {}", args.dungeon))?;
    let layout: DungeonLayout =
        serde_json::from_str(&layout_data).with_context(|| "Failed to deserialize dungeon JSON")?;
    let mut world = Sandbox::from_layout(&layout).with_context(|| "Dungeon layout is invalid")?;

    let options = load_options(args.options.as_deref())?;
    let cache = load_cache(args.cache.as_deref())?;
    let mut ctx = TravelContext::with_cache(cache, options, layout.branches.clone());

    if let Some(target) = &args.target {
        let destination = parse_destination(&layout.branches, target)?;
        if destination.level == world.current_level() && destination.pos.is_known() {
            ctx.start_travel(&world, destination.pos)?;
        } else {
            ctx.start_interlevel_travel(&world, destination)?;
        }
    } else if let Some(number) = args.waypoint {
        ctx.travel_to_waypoint(&world, number)?;
    } else if args.explore {
        ctx.start_explore(&world, args.greedy)?;
    } else if args.mark.is_none() {
        bail!("Nothing to do: pass --target, --waypoint, --explore or --mark");
    }

    if ctx.is_active() {
        let report = world.drive(&mut ctx, args.max_turns)?;
        let status = match report.outcome {
            DriveOutcome::Arrived => "Arrived.".to_string(),
            DriveOutcome::Stopped(reason) => reason.status_line(ctx.branches()),
            DriveOutcome::OutOfTurns => "Turn limit reached.".to_string(),
        };
        println!("{status}");
        println!("Turns: {}", report.turns);
        println!("Moves: {}", report.moves);
        println!("Crossings: {}", report.crossings);
        println!("Pickups: {}", report.pickups);
    }
    println!(
        "Position: {} {}",
        ctx.branches().describe(world.current_level()),
        world.agent_pos()
    );

    if let Some(number) = args.mark {
        ctx.set_waypoint(&world, number)?;
        println!("Waypoint {number} set.");
    }
    if let Some(path) = &args.cache {
        save_cache_to_file(Path::new(path), ctx.cache())
            .with_context(|| format!("Failed to save travel cache: {path}"))?;
    }

    Ok(())
}
