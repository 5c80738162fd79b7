//! circuit-sim: run a light switch against a light controller over the loopback.

use std::path::PathBuf;
use std::process::ExitCode;

use circuit_common::SystemClock;
use circuit_runner::{run_scenario, RunnerResult, Scenario, SimClock, SimulationReport};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "circuit-sim",
    version,
    about = "Simulate a light switch driving a light controller"
)]
struct Args {
    /// Scenario file (YAML). Runs the built-in scenario when omitted.
    #[arg(short, long, value_name = "FILE")]
    scenario: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Log filter, e.g. `debug` or `circuit_switch=trace`. Overrides RUST_LOG.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Check expiry times against the host clock instead of a simulated one.
    #[arg(long)]
    wall_clock: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());
    circuit_metrics::describe_metrics();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("circuit-sim: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(directives: Option<&str>) {
    let filter = match directives {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> RunnerResult<()> {
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::builtin(),
    };
    let clock = if args.wall_clock {
        SimClock::System(SystemClock)
    } else {
        SimClock::manual_now()
    };

    let report = run_scenario(&scenario, clock)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&scenario, &report);
    }
    Ok(())
}

fn print_summary(scenario: &Scenario, report: &SimulationReport) {
    let controller = &report.controller;
    let switch = &report.switch;

    println!("Scenario: {}", scenario.name);
    println!(
        "Duration: {} ms, {} deliveries",
        (report.finished_at - report.started_at).num_milliseconds(),
        report.deliveries
    );
    println!();
    println!(
        "Controller: {}, version {}",
        controller.light, controller.version
    );
    println!(
        "  applied {}, rejected {}, reply failures {}, notifications {}",
        controller.commands_applied,
        controller.commands_rejected,
        controller.reply_failures,
        controller.notifications
    );
    println!("  state trait: {}", controller.snapshot_hex);
    println!(
        "Switch: {} level {}{}, binding {}",
        switch.desired.state(),
        switch.desired.level(),
        if switch.desired.change_pending() { " (pending)" } else { "" },
        switch.binding_state
    );
    println!(
        "  sent {}, failures {}, acks {}, last confirmed version {}",
        switch.commands_sent,
        switch.send_failures,
        switch.acks_received,
        switch
            .last_confirmed_version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(status) = switch.last_rejection {
        println!("  last rejection: {}", status);
    }
    println!();
    println!("Messages:");
    for record in &report.messages {
        println!(
            "  {:<22} 0x{:08X}/0x{:02X} {}{}",
            record.direction.to_string(),
            record.profile_id,
            record.msg_type,
            record.payload_hex,
            if record.dropped { " (dropped)" } else { "" }
        );
    }
}
