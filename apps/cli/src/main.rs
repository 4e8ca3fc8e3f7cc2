#![deny(warnings)]

//! Headless CLI: load a scenario, build the rally and formations, and
//! recommend a formation count.

use anyhow::{Context, Result};
use muster_alloc::sample_simplex;
use muster_core::{CombatStats, CombatTuning, PlanInput, RallyMode, StatPair, Troops};
use muster_plan::{Plan, PlannerSession};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    scenario: Option<String>,
    config: Option<String>,
    json: bool,
    grid: Option<u32>,
    tier: Option<String>,
    rally: Option<u64>,
    capacity: Option<u64>,
    formations: Option<u32>,
    max_formations: Option<u32>,
    composition: Option<String>,
    proportional: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--config" => args.config = it.next(),
            "--json" => args.json = true,
            "--grid" => args.grid = it.next().and_then(|s| s.parse().ok()),
            "--tier" => args.tier = it.next(),
            "--rally" => args.rally = it.next().and_then(|s| s.parse().ok()),
            "--capacity" => args.capacity = it.next().and_then(|s| s.parse().ok()),
            "--formations" => args.formations = it.next().and_then(|s| s.parse().ok()),
            "--max-formations" => args.max_formations = it.next().and_then(|s| s.parse().ok()),
            "--override" => args.composition = it.next(),
            "--proportional" => args.proportional = true,
            _ => {}
        }
    }
    args
}

fn load_yaml<T: DeserializeOwned>(path: &str) -> Result<T> {
    let text = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("reading {path}"))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {path}"))
}

fn demo_input() -> PlanInput {
    PlanInput {
        stats: CombatStats {
            inf: StatPair::new(310.0, 255.0),
            cav: StatPair::new(330.0, 270.0),
            arc: StatPair::new(320.0, 265.0),
        },
        tier: "T7–TG2".to_string(),
        stock: Troops::new(60_000, 120_000, 420_000),
        rally_size: 150_000,
        capacity: 90_000,
        formations: 4,
        max_formations: Some(6),
        composition_override: None,
        rally_mode: RallyMode::Bounded,
    }
}

fn apply_overrides(input: &mut PlanInput, args: &Args) {
    if let Some(tier) = &args.tier {
        input.tier = tier.clone();
    }
    if let Some(rally) = args.rally {
        input.rally_size = rally;
    }
    if let Some(capacity) = args.capacity {
        input.capacity = capacity;
    }
    if let Some(formations) = args.formations {
        input.formations = formations;
    }
    if args.max_formations.is_some() {
        input.max_formations = args.max_formations;
    }
    if args.composition.is_some() {
        input.composition_override = args.composition.clone();
    }
    if args.proportional {
        input.rally_mode = RallyMode::Proportional;
    }
}

fn print_plan(plan: &Plan, input: &PlanInput) {
    println!(
        "Target composition (Inf/Cav/Arc): {} [{:?}] | {:.1}% of theoretical damage",
        plan.percentages,
        plan.source,
        plan.efficiency * 100.0
    );
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10}",
        "Type", "Infantry", "Cavalry", "Archers", "Total"
    );
    if input.rally_size > 0 {
        let r = plan.rally;
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>10}",
            "CALL RALLY",
            r.inf,
            r.cav,
            r.arc,
            r.total()
        );
    }
    for (idx, p) in plan.packs.iter().enumerate() {
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>10}",
            format!("#{}", idx + 1),
            p.inf,
            p.cav,
            p.arc,
            p.total()
        );
    }

    let s = &plan.summary;
    if input.rally_size > 0 {
        println!(
            "Rally used | INF {} CAV {} ARC {} (total {}, short {})",
            plan.rally.inf, plan.rally.cav, plan.rally.arc, s.rally_total, s.rally_shortfall
        );
    } else {
        println!("Rally not built (rally size is 0)");
    }
    println!(
        "Formations built: {} x cap {} (troops placed: {})",
        plan.packs.len(),
        input.capacity,
        s.placed
    );
    println!(
        "Leftover | INF {} CAV {} ARC {}",
        plan.leftover.inf, plan.leftover.cav, plan.leftover.arc
    );
    println!("Stock used: {} of {}", s.stock_used, s.stock_before);
    let rec = &plan.recommendation;
    println!(
        "Recommended formations: {} | full {}/{} | min fill {:.1}% | avg fill {:.1}%",
        rec.formations,
        rec.full_slots,
        rec.formations,
        rec.min_fill * 100.0,
        rec.avg_fill * 100.0
    );
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    info!(scenario = ?args.scenario, config = ?args.config, "starting CLI");

    let tuning: CombatTuning = match &args.config {
        Some(path) => load_yaml(path)?,
        None => CombatTuning::default(),
    };
    let mut input: PlanInput = match &args.scenario {
        Some(path) => load_yaml(path)?,
        None => demo_input(),
    };
    apply_overrides(&mut input, &args);

    let mut session = PlannerSession::new(tuning)?;

    if let Some(steps) = args.grid {
        let (_, _, weights) = session.weights(&input);
        let samples = sample_simplex(&weights, steps);
        println!("{}", serde_json::to_string(&samples)?);
        return Ok(());
    }

    let plan = session.optimize(&input)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan, &input);
    }
    Ok(())
}
