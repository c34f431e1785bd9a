// src/main.rs
//
// Research-harness CLI for Galvena.
//
// - Deterministic runs via --seed.
// - Agent baseline selection (threshold / idle).
// - Optional JSONL telemetry to a file (also reachable via env vars).
// - Prints a concise run header (cfg version/hash, agent, duration, seed)
//   and the end-of-run summary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};

use galvena::agent::{Agent, IdleAgent, ThresholdAgent};
use galvena::config::Config;
use galvena::controller::ControllerError;
use galvena::sim::{SimNode, SimSummary};
use galvena::telemetry::JsonlSink;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AgentArg {
    Threshold,
    Idle,
}

#[derive(Debug, Parser)]
#[command(
    name = "galvena",
    about = "Energy-constrained node + RL-agent decision loop simulator",
    version
)]
struct Args {
    /// Simulated run length in milliseconds.
    #[arg(long, default_value_t = 300_000)]
    duration_ms: i64,

    /// Agent baseline to drive decisions.
    #[arg(long, value_enum, default_value_t = AgentArg::Threshold)]
    agent: AgentArg,

    /// Battery floor percentage below which the threshold agent switches
    /// sends to wired power.
    #[arg(long, default_value_t = 20.0)]
    battery_floor: f64,

    /// Deterministic seed for the charger and traffic streams.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write per-cycle JSONL telemetry to this path.
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn run_with<A: Agent>(
    cfg: &Config,
    agent: A,
    sink: JsonlSink,
    args: &Args,
) -> Result<SimSummary, ControllerError> {
    let mut node = SimNode::new(cfg, agent, sink, args.seed);
    node.run(args.duration_ms)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Env overrides already handled in Config.
    let cfg = Config::from_env();
    let cfg_hash = fnv1a64(&format!("{cfg:?}"));

    println!(
        "galvena | cfg={} | cfg_hash=0x{:016x} | agent={:?} | duration_ms={} | seed={}",
        cfg.version, cfg_hash, args.agent, args.duration_ms, args.seed
    );

    // Sink precedence: explicit --telemetry path, then env vars. A sink
    // that neither enables stays inert, so there is no separate noop path.
    let sink = match &args.telemetry {
        Some(path) => match JsonlSink::create(path.clone()) {
            Ok(sink) => sink,
            Err(e) => {
                eprintln!("[main] ERROR: cannot open telemetry file {path:?}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => JsonlSink::from_env(),
    };

    let result = match args.agent {
        AgentArg::Threshold => run_with(
            &cfg,
            ThresholdAgent::new(args.battery_floor, cfg.sim.default_burst),
            sink,
            &args,
        ),
        AgentArg::Idle => run_with(&cfg, IdleAgent, sink, &args),
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("[main] ERROR: controller failed: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "cycles={} requests={} sends={} idles={} illegal={} | arrived={} sent={} dropped={}",
        summary.cycles,
        summary.requests,
        summary.sends,
        summary.idles,
        summary.illegal_actions,
        summary.packets_arrived,
        summary.packets_sent,
        summary.packets_dropped,
    );
    println!(
        "battery={:.1}% | reward mean={:.4} min={:.4} max={:.4} | agent={}",
        summary.final_battery_percentage,
        summary.mean_reward,
        summary.min_reward,
        summary.max_reward,
        summary.agent_version,
    );

    if args.verbose > 0 {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("[main] WARN: cannot serialize summary: {e}"),
        }
    }

    ExitCode::SUCCESS
}
