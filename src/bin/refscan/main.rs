//! Binary entry point for the refscan integrity tool.
#![forbid(unsafe_code)]

mod ui;

use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use refscan::{
    config::ToolConfig,
    demo::seed_demo,
    events::{EventSink, JsonlEventSink, RunSummary, TracingEventSink},
    lock::ToolLock,
    logging::init_logging,
    reindex::{Reindexer, REINDEX_TARGETS},
    scan::{format_elapsed, NullSink, ProgressReporter, ProgressSink},
    scrub::{present_catalogs, CatalogScrubber, ScrubReport},
    MemoryStore, ScanError, ScanReport,
};
use serde::Serialize;
use tracing::info;
use ui::{Theme, Ui};

const TOOL: &str = "refscan";

#[derive(Parser, Debug)]
#[command(
    name = "refscan",
    version,
    about = "Find and repair dangling references in a persistent object database",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "REFSCAN_CONFIG",
        help = "Config file (defaults to <config dir>/refscan/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR", help = "Directory for the detailed log")]
    tmpdir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "REFSCAN_LOCK_FILE",
        help = "Lock file guarding against concurrent runs"
    )]
    lock_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Log at debug level")]
    debug: bool,

    #[arg(long, global = true, help = "Do not emit the end-of-run status event")]
    skip_events: bool,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Also append status events to this JSON lines file"
    )]
    events_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for reports"
    )]
    format: OutputFormat,

    #[arg(long, global = true, value_enum, default_value_t = ThemeArg::Auto)]
    theme: ThemeArg,

    #[arg(short, long, global = true, help = "Suppress progress and decoration")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Scan the object graph for dangling references")]
    Scan(ScanCmd),

    #[command(about = "Remove stale entries from secondary catalogs")]
    Scrub(ScrubCmd),

    #[command(about = "Rebuild the catalog of a top-level organizer")]
    Reindex(ReindexCmd),

    #[command(about = "Write a demo object database")]
    SeedDemo(SeedDemoCmd),
}

#[derive(Args, Debug)]
struct ScanCmd {
    #[arg(value_name = "STORE")]
    store: PathBuf,

    #[arg(
        long,
        default_value = "/",
        help = "Path to scan, e.g. /zport/dmd/Devices or app.zport.dmd"
    )]
    path: String,

    #[arg(long, help = "Attempt to repair the corruption found")]
    fix: bool,

    #[arg(long, value_name = "N", help = "Maximum repair passes")]
    cycles: Option<u32>,

    #[arg(long, help = "Skip periodic transaction aborts (faster, unbounded memory)")]
    unlimited_ram: bool,
}

#[derive(Args, Debug)]
struct ScrubCmd {
    #[arg(value_name = "STORE")]
    store: PathBuf,

    #[arg(long, value_name = "NAME", help = "Catalog to scrub (all when omitted)")]
    catalog: Option<String>,

    #[arg(long, help = "List the non-empty catalogs and exit")]
    list: bool,

    #[arg(long, help = "Remove stale entries")]
    fix: bool,

    #[arg(long, value_name = "N", help = "Maximum scrub passes")]
    cycles: Option<u32>,
}

#[derive(Args, Debug)]
struct ReindexCmd {
    #[arg(value_name = "STORE")]
    store: PathBuf,

    #[arg(long = "type", value_name = "TYPE", help = "Organizer to reindex, e.g. Devices")]
    kind: Option<String>,

    #[arg(long, help = "List the organizers that can be reindexed and exit")]
    list: bool,
}

#[derive(Args, Debug)]
struct SeedDemoCmd {
    #[arg(value_name = "STORE")]
    store: PathBuf,

    #[arg(long, help = "Inject one instance of every known corruption pattern")]
    corrupt: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    let config = ToolConfig::load(cli.config.clone())?;
    let level = if cli.debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let log_dir = cli.tmpdir.clone().unwrap_or_else(|| config.log_dir());
    let log_path = init_logging(level, &log_dir, TOOL)?;
    let ui = Ui::new(cli.theme.into(), cli.quiet);
    let text = cli.format == OutputFormat::Text;
    if text {
        ui.info(&format!("Detailed log at {}", log_path.display()));
    }
    if let Some(source) = config.source() {
        info!(path = %source.display(), "config.loaded");
    }

    let lock_path = cli.lock_file.clone().unwrap_or_else(|| config.lock_path());
    let _lock = ToolLock::acquire(&lock_path)?;

    match &cli.command {
        Command::Scan(cmd) => run_scan(&cli, &config, &ui, cmd),
        Command::Scrub(cmd) => run_scrub(&cli, &config, &ui, cmd),
        Command::Reindex(cmd) => run_reindex(&cli, &ui, cmd),
        Command::SeedDemo(cmd) => run_seed_demo(&cli, &ui, cmd),
    }
}

fn run_scan(cli: &Cli, config: &ToolConfig, ui: &Ui, cmd: &ScanCmd) -> Result<i32, Box<dyn Error>> {
    let started = Instant::now();
    let mut options = config.scan_options(cmd.fix);
    if let Some(cycles) = cmd.cycles {
        options.max_cycles = cycles;
    }
    if cmd.unlimited_ram {
        options.unlimited_memory = true;
    }
    let mut store = MemoryStore::open(&cmd.store)?;
    let text = cli.format == OutputFormat::Text;
    if text {
        ui.info(&format!("Examining items under the '{}' path", cmd.path));
    }

    let sink: Box<dyn ProgressSink> = if text {
        ui.progress()
    } else {
        Box::new(NullSink)
    };
    let reporter = ProgressReporter::new(sink, options.repair);
    let report = match refscan::scan(&mut store, &cmd.path, options, reporter) {
        Ok(report) => report,
        Err(ScanError::InvalidPath { path, source }) => {
            ui.warn(&format!("Invalid path: {path} ({source})"));
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };

    emit(cli.format, &report, || print_scan_text(ui, cmd, &report))?;
    send_event(cli, "refscan-scan", report.remaining_errors(), started.elapsed())?;

    if report.remaining_errors() > 0 && !cmd.fix {
        if text {
            ui.warn("Issues were detected; rerun with --fix to repair known corruption patterns");
        }
        return Ok(1);
    }
    Ok(0)
}

fn print_scan_text(ui: &Ui, cmd: &ScanCmd, report: &ScanReport) {
    let last = report.last();
    ui.spacer();
    ui.section(
        "Scan summary",
        [
            ("store", cmd.store.display().to_string()),
            ("path", cmd.path.clone()),
            ("mode", if report.repair { "repair" } else { "scan" }.to_string()),
            (
                "cycles",
                format!("{} of {}", report.cycles.len(), report.max_cycles),
            ),
            ("state", format!("{:?}", report.state)),
            ("items scanned", last.items.to_string()),
            ("errors remaining", last.errors.to_string()),
            ("repairs", report.total_repairs().to_string()),
            ("elapsed", format_elapsed(report.elapsed)),
        ],
    );
    ui.list(
        "Findings",
        report.findings.iter().map(|finding| finding.to_string()),
    );
    if report.is_clean() {
        ui.success("No dangling references remain");
    }
}

#[derive(Serialize)]
struct ScrubOutput<'a> {
    reports: &'a [ScrubReport],
    remaining_stale: u64,
}

fn run_scrub(
    cli: &Cli,
    config: &ToolConfig,
    ui: &Ui,
    cmd: &ScrubCmd,
) -> Result<i32, Box<dyn Error>> {
    let started = Instant::now();
    let mut store = MemoryStore::open(&cmd.store)?;
    let present = present_catalogs(&mut store);

    if cmd.list {
        emit(cli.format, &present, || {
            ui.list(
                "Catalogs",
                present
                    .iter()
                    .map(|(name, size)| format!("{name} ({size} entries)")),
            )
        })?;
        return Ok(0);
    }

    let mut options = config.scrub_options(cmd.fix);
    if let Some(cycles) = cmd.cycles {
        options.max_cycles = cycles;
    }
    let catalogs: Vec<String> = match &cmd.catalog {
        Some(name) => vec![name.clone()],
        None => present.into_iter().map(|(name, _)| name).collect(),
    };

    let text = cli.format == OutputFormat::Text;
    let mut reports = Vec::new();
    for catalog in &catalogs {
        if text {
            ui.info(&format!("Scrubbing catalog {catalog}"));
        }
        let sink: Box<dyn ProgressSink> = if text {
            ui.progress()
        } else {
            Box::new(NullSink)
        };
        let mut scrubber = CatalogScrubber::new(options, sink);
        reports.push(scrubber.scrub(&mut store, catalog)?);
    }
    let remaining_stale: u64 = reports.iter().map(ScrubReport::remaining_stale).sum();

    let output = ScrubOutput {
        reports: &reports,
        remaining_stale,
    };
    emit(cli.format, &output, || print_scrub_text(ui, &reports))?;
    send_event(cli, "refscan-scrub", remaining_stale, started.elapsed())?;

    if remaining_stale > 0 && !cmd.fix {
        if text {
            ui.warn("Stale catalog entries were detected; rerun with --fix to remove them");
        }
        return Ok(1);
    }
    Ok(0)
}

fn print_scrub_text(ui: &Ui, reports: &[ScrubReport]) {
    ui.spacer();
    for report in reports {
        ui.section(
            &format!("Catalog {}", report.catalog),
            [
                ("entries", report.initial_size.to_string()),
                ("passes", report.passes.len().to_string()),
                ("state", format!("{:?}", report.state)),
                ("stale remaining", report.remaining_stale().to_string()),
                ("removed", report.total_removed().to_string()),
            ],
        );
    }
}

fn run_reindex(cli: &Cli, ui: &Ui, cmd: &ReindexCmd) -> Result<i32, Box<dyn Error>> {
    let started = Instant::now();
    let Some(kind) = cmd.kind.as_deref().filter(|_| !cmd.list) else {
        emit(cli.format, &REINDEX_TARGETS, || {
            ui.list(
                "Organizers that can be reindexed",
                REINDEX_TARGETS
                    .iter()
                    .map(|target| format!("{} ({})", target.name, target.catalog)),
            )
        })?;
        if cmd.list {
            return Ok(0);
        }
        ui.warn("No organizer given; pass one of the above with --type");
        return Ok(1);
    };

    let mut store = MemoryStore::open(&cmd.store)?;
    let text = cli.format == OutputFormat::Text;
    let sink: Box<dyn ProgressSink> = if text {
        ui.progress()
    } else {
        Box::new(NullSink)
    };
    let report = match Reindexer::new(sink).reindex(&mut store, kind) {
        Ok(report) => report,
        Err(ScanError::InvalidPath { path, source }) => {
            ui.warn(&format!("Invalid path: {path} ({source})"));
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };

    emit(cli.format, &report, || {
        ui.spacer();
        ui.section(
            &format!("Reindex {}", report.target),
            [
                ("catalog", report.catalog.clone()),
                ("indexed", report.indexed.to_string()),
                ("components", report.components.to_string()),
                ("failures", report.failures.to_string()),
                ("elapsed", format_elapsed(report.elapsed)),
            ],
        );
    })?;
    send_event(cli, "refscan-reindex", report.failures, started.elapsed())?;

    if !report.is_clean() {
        if text {
            ui.warn("Issues were encountered; consult the detailed log");
        }
        return Ok(1);
    }
    Ok(0)
}

fn run_seed_demo(cli: &Cli, ui: &Ui, cmd: &SeedDemoCmd) -> Result<i32, Box<dyn Error>> {
    let mut store = MemoryStore::create(&cmd.store)?;
    let summary = seed_demo(&mut store, cmd.corrupt)?;
    emit(cli.format, &summary, || {
        ui.success(&format!(
            "Wrote {} records to {}",
            summary.records,
            cmd.store.display()
        ));
        ui.list("Injected corruption", summary.corruptions.iter().cloned());
    })?;
    Ok(0)
}

fn send_event(
    cli: &Cli,
    tool: &str,
    errors: u64,
    elapsed: Duration,
) -> Result<(), Box<dyn Error>> {
    if cli.skip_events {
        return Ok(());
    }
    let event = RunSummary::new(tool, errors, elapsed);
    TracingEventSink.emit(&event)?;
    if let Some(path) = cli.events_file.as_deref() {
        JsonlEventSink::new(path).emit(&event)?;
    }
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}
