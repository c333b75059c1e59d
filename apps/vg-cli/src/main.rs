use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vg_app::{
    AppResult, JobProgressEvent, JobSummary, LayerOutcome, PlanOptions, PrintJob, SimOptions,
    SimulatedMachine, SystemState, UnroutablePolicy, load_plan, plan_layer, save_plan,
};
use vg_config::MachineConfig;
use vg_core::ZoneId;
use vg_exec::{ExecEvent, ExecEventKind};
use vg_route::TargetSet;
use vg_schedule::PlanFile;

#[derive(Parser)]
#[command(name = "vg-cli")]
#[command(about = "ValveGrid CLI - valve-network routing and layer execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a machine configuration and build its grid
    Validate {
        /// Path to the machine YAML or JSON file
        config_path: PathBuf,
    },
    /// Route and compile layers into a plan file
    Plan {
        /// Path to the machine YAML or JSON file
        config_path: PathBuf,
        /// Target set files, one per layer
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        /// Output plan file (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Plan the routable subset when targets are unreachable
        #[arg(long)]
        skip_unroutable: bool,
    },
    /// Print layers on simulated hardware
    Run {
        /// Path to the machine YAML or JSON file
        config_path: PathBuf,
        /// Target set files, one per layer
        targets: Vec<PathBuf>,
        /// Execute a previously written plan file instead of routing
        #[arg(long, conflicts_with = "targets")]
        plan: Option<PathBuf>,
        /// Zone whose first acknowledgement never arrives
        #[arg(long)]
        drop_zone: Option<u32>,
        /// Simulated valve batch latency in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
        /// Print the routable subset when targets are unreachable
        #[arg(long)]
        skip_unroutable: bool,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VG_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Plan {
            config_path,
            targets,
            output,
            skip_unroutable,
        } => cmd_plan(&config_path, &targets, output.as_deref(), skip_unroutable),
        Commands::Run {
            config_path,
            targets,
            plan,
            drop_zone,
            latency_ms,
            skip_unroutable,
        } => cmd_run(
            &config_path,
            &targets,
            plan.as_deref(),
            SimOptions {
                latency: Duration::from_millis(latency_ms),
                drop_zone: drop_zone.map(ZoneId::from_index),
            },
            skip_unroutable,
        ),
    }
}

fn plan_options(config: &MachineConfig, skip_unroutable: bool) -> PlanOptions {
    let policy = if skip_unroutable {
        UnroutablePolicy::Skip
    } else {
        UnroutablePolicy::Fail
    };
    PlanOptions::from_config(config).with_unroutable(policy)
}

fn load_layers(config: &MachineConfig, paths: &[PathBuf]) -> AppResult<Vec<TargetSet>> {
    let grid = config.build_grid()?;
    paths
        .iter()
        .map(|p| Ok(vg_config::load_targets(p)?.to_target_set(&grid)?))
        .collect()
}

fn cmd_validate(config_path: &Path) -> AppResult<()> {
    println!("Validating configuration: {}", config_path.display());
    let config = vg_config::load(config_path)?;
    let grid = config.build_grid()?;
    println!("✓ Configuration is valid");
    println!(
        "  {} ({}x{} grid, {} channels, {} slots/node, {} zones, {} injection points)",
        config.name,
        grid.rows(),
        grid.cols(),
        grid.edge_count(),
        grid.slot_layout().slot_count(),
        grid.zones().len(),
        grid.injection_points().len()
    );
    Ok(())
}

fn cmd_plan(
    config_path: &Path,
    target_paths: &[PathBuf],
    output: Option<&Path>,
    skip_unroutable: bool,
) -> AppResult<()> {
    let config = vg_config::load(config_path)?;
    let grid = config.build_grid()?;
    let options = plan_options(&config, skip_unroutable);
    let layers = load_layers(&config, target_paths)?;

    let mut file = PlanFile::new(&grid);
    for targets in &layers {
        let planned = plan_layer(&grid, targets, &options)?;
        let report = &planned.accepted.report;
        println!(
            "Layer {}: {} paths, {} unroutable, {} stages, {} open valves, supply {:.0}%, max drop {:.1} kPa ({} attempts)",
            targets.layer,
            planned.accepted.plan.paths.len(),
            planned.accepted.plan.unroutable.len(),
            planned.schedule.stage_count(),
            planned.schedule.stats.open_valves,
            report.supply_utilization() * 100.0,
            vg_core::to_pa(report.max_pressure_drop) / 1e3,
            planned.accepted.attempts
        );
        for u in &planned.accepted.plan.unroutable {
            println!("  {u}");
        }
        file.push(&planned.schedule);
    }

    if let Some(path) = output {
        save_plan(path, &file)?;
        println!("✓ Plan written: {}", path.display());
    }
    Ok(())
}

fn cmd_run(
    config_path: &Path,
    target_paths: &[PathBuf],
    plan: Option<&Path>,
    sim: SimOptions,
    skip_unroutable: bool,
) -> AppResult<()> {
    let config = vg_config::load(config_path)?;
    let grid = config.build_grid()?;
    let machine = SimulatedMachine::start(&grid, config.coordinator_config(), sim)?;
    let job = PrintJob::new(
        &grid,
        &machine.coordinator,
        plan_options(&config, skip_unroutable),
    );
    let mut state = SystemState::new();

    let mut render = |event: JobProgressEvent| render_cli_progress(&event);
    let outcome = match plan {
        Some(path) => {
            let schedules = load_plan(path, &grid)?;
            job.run_schedules(&mut state, schedules, Some(&mut render))
        }
        None => {
            let layers = load_layers(&config, target_paths)?;
            job.run(&mut state, &layers, Some(&mut render))
        }
    };
    clear_progress_line();

    print_event_summary(&machine.coordinator.events().snapshot());
    match outcome {
        Ok(summary) => {
            print_job_summary(&summary);
            Ok(())
        }
        Err(err) => {
            println!("✗ Job halted in {:?}: {err}", state.phase());
            Err(err)
        }
    }
}

fn render_cli_progress(event: &JobProgressEvent) {
    let layer = event
        .layer
        .as_ref()
        .map(|l| format!(" layer {} ({}/{})", l.layer, l.layer_index + 1, l.layer_count))
        .unwrap_or_default();
    let message = event
        .message
        .as_deref()
        .map(|m| format!(" - {m}"))
        .unwrap_or_default();
    print!(
        "\r[{:>7.2}s] {:?}{}{}\x1b[K",
        event.elapsed_wall_s, event.stage, layer, message
    );
    let _ = io::stdout().flush();
}

fn clear_progress_line() {
    print!("\r\x1b[K");
    let _ = io::stdout().flush();
}

fn print_job_summary(summary: &JobSummary) {
    println!(
        "✓ Job finished: {} printed, {} aborted in {:.2} s",
        summary.printed(),
        summary.aborted(),
        summary.elapsed_s
    );
    for layer in &summary.layers {
        match layer {
            LayerOutcome::Printed {
                layer,
                stages,
                attempts,
                skipped_targets,
                elapsed,
            } => println!(
                "  layer {layer}: {stages} stages, {attempts} routing attempts, {skipped_targets} skipped, {:.1} ms",
                elapsed.as_secs_f64() * 1e3
            ),
            LayerOutcome::Aborted { layer, reason } => {
                println!("  layer {layer}: aborted ({reason})")
            }
        }
    }
}

fn print_event_summary(events: &[ExecEvent]) {
    let count = |pred: fn(&ExecEventKind) -> bool| events.iter().filter(|e| pred(&e.kind)).count();
    println!("Coordinator events: {}", events.len());
    println!(
        "  commands {}, acks {}, barriers {}, ack timeouts {}",
        count(|k| matches!(k, ExecEventKind::CommandSent { .. })),
        count(|k| matches!(k, ExecEventKind::ZoneAcked { .. })),
        count(|k| matches!(k, ExecEventKind::BarrierReleased { .. })),
        count(|k| matches!(k, ExecEventKind::AckTimeout { .. })),
    );
    for e in events.iter().filter(|e| {
        matches!(
            e.kind,
            ExecEventKind::ZoneFaulted { .. }
                | ExecEventKind::LayerFailed { .. }
                | ExecEventKind::SafetyTripped { .. }
        )
    }) {
        println!("  [{:>8.3}s] {:?}", e.at.as_secs_f64(), e.kind);
    }
}
