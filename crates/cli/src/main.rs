use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use cam_diag_core::{
    check_sink_location, referenced_capabilities, standard_groups, write_summary,
    AvailabilityChecker, Capability, CompileOptions, OutcomeKind, ProgressEvent, ReportCompiler,
    SystemChecker,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "cam-diag",
    version,
    about = "Capture a read-only diagnostic report of a camera host for offline sharing."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every probe and write the diagnostic report.
    Collect(CollectArgs),
    /// Print the probe battery without running anything.
    List(ListArgs),
    /// Show which tools, files and modules the probes depend on are present.
    Capabilities(CapabilitiesArgs),
}

#[derive(Debug, Args)]
struct CollectArgs {
    /// Camera device the report is about.
    #[arg(long, default_value = "/dev/video0", value_name = "DEVICE")]
    device: String,

    /// Output report path. Its directory must already exist.
    #[arg(long, default_value = "camera-diagnostics.txt", value_name = "FILE")]
    output: PathBuf,

    /// Optional JSON run summary output file.
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Suppress per-probe progress lines on stderr.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Camera device to substitute into device probes.
    #[arg(long, default_value = "/dev/video0", value_name = "DEVICE")]
    device: String,
}

#[derive(Debug, Args)]
struct CapabilitiesArgs {
    /// Camera device to substitute into device probes.
    #[arg(long, default_value = "/dev/video0", value_name = "DEVICE")]
    device: String,

    /// Optional JSON output file for capability status.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CapabilityStatus {
    capability: Capability,
    available: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Collect(args) => run_collect_command(args),
        Commands::List(args) => {
            run_list_command(args);
            Ok(())
        }
        Commands::Capabilities(args) => run_capabilities_command(args),
    }
}

fn run_collect_command(args: CollectArgs) -> Result<()> {
    let CollectArgs {
        device,
        output,
        summary,
        quiet,
    } = args;

    if let Some(summary_path) = &summary {
        check_sink_location(summary_path).context("run summary cannot be written")?;
    }

    let options = CompileOptions {
        target: device.clone(),
        invocation: invocation_string(),
        ..CompileOptions::default()
    };
    let groups = standard_groups(&device);
    debug!(invocation = %options.invocation, output = %output.display(), "starting collection");
    let checker = SystemChecker::new();
    let mut compiler = ReportCompiler::new(&checker, options);

    let result = compiler
        .compile_with_callback(&groups, &output, |event| {
            if !quiet {
                print_progress(event);
            }
        })
        .with_context(|| format!("diagnostic report for {device} not written"))?;

    println!("Report written to {}", output.display());
    println!(
        "Ran {} probe(s) in {} group(s): {} succeeded, {} failed, {} not available.",
        result.total_probes, result.groups, result.succeeded, result.failed, result.unavailable
    );

    // The report is complete at this point, so a late summary failure does
    // not change the exit status.
    if let Some(summary_path) = summary {
        match write_summary(&result, &summary_path) {
            Ok(()) => println!("Run summary written to {}", summary_path.display()),
            Err(err) => warn!(
                path = %summary_path.display(),
                error = %format!("{err:#}"),
                "run summary not written"
            ),
        }
    }

    Ok(())
}

fn run_list_command(args: ListArgs) {
    for group in standard_groups(&args.device) {
        println!("{}", group.title);
        for probe in &group.probes {
            println!("- {}: {}", probe.description, probe.operation.display_text());
            if let Some(precondition) = &probe.precondition {
                let needs = precondition
                    .capabilities()
                    .iter()
                    .map(|capability| format!("{} {}", capability.kind_label(), capability.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("  requires: {needs} (otherwise: {})", precondition.reason);
            }
        }
    }
}

fn run_capabilities_command(args: CapabilitiesArgs) -> Result<()> {
    let checker = SystemChecker::new();
    let statuses = referenced_capabilities(&standard_groups(&args.device))
        .into_iter()
        .map(|capability| CapabilityStatus {
            available: checker.is_available(&capability),
            capability,
        })
        .collect::<Vec<_>>();

    let present = statuses.iter().filter(|status| status.available).count();
    println!("Capabilities present: {}/{}", present, statuses.len());
    for status in &statuses {
        println!(
            "- [{}] {} {}",
            if status.available { "present" } else { "absent" },
            status.capability.kind_label(),
            status.capability.name
        );
    }

    if let Some(output) = args.output {
        let payload = serde_json::to_string_pretty(&statuses)
            .context("failed to serialize capability status")?;
        fs::write(&output, payload)
            .with_context(|| format!("failed to write capability status {}", output.display()))?;
        println!("Capability JSON written to {}", output.display());
    }

    Ok(())
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::GroupStarted { title, .. } => eprintln!("== {title}"),
        ProgressEvent::ProbeFinished {
            seq,
            total,
            description,
            outcome,
        } => eprintln!(
            "[{seq:>2}/{total}] {description} ... {}",
            outcome_label(*outcome)
        ),
    }
}

fn outcome_label(outcome: OutcomeKind) -> &'static str {
    match outcome {
        OutcomeKind::Success => "ok",
        OutcomeKind::Failure => "failed",
        OutcomeKind::Unavailable => "not available",
    }
}

fn invocation_string() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
