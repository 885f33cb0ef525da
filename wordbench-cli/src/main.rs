use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wordbench::{
    bench::{BenchmarkPlan, BenchmarkReport, BenchmarkRunner},
    config::{BenchConfig, CliOverrides, EncodingMode},
    device::{default_platform, enumerate},
    report::{summarize, write_csv},
    source::{load_dataset, Dataset},
    Method,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Word or phrase to count (case-insensitive)
    #[arg(short = 't', long)]
    target: Option<String>,

    /// Input file, one dataset each (can be specified multiple times)
    #[arg(short = 'i', long = "input")]
    inputs: Vec<PathBuf>,

    /// Repetitions of every strategy per dataset
    #[arg(short = 'r', long)]
    runs: Option<usize>,

    /// Worker counts for the thread-pool strategy (e.g. 2,4,8)
    #[arg(short = 'j', long, value_delimiter = ',')]
    threads: Vec<usize>,

    /// Strategies to run (serial, parallel, gpu, gpu-opt)
    #[arg(short = 's', long = "strategy", value_delimiter = ',')]
    strategies: Vec<Method>,

    /// Work-group size of the reduced kernel (power of two)
    #[arg(long)]
    group_size: Option<usize>,

    /// Abort when an accelerator strategy fails instead of skipping it
    #[arg(long)]
    fail_on_accelerator_error: bool,

    /// CSV output path (default: results/wordcount_<timestamp>.csv)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print the full report as JSON instead of the summary table
    #[arg(long)]
    json: bool,

    /// How to handle invalid UTF-8 sequences
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Configuration file layered over the default locations
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EncodingArg {
    /// Reject files with invalid UTF-8
    #[value(name = "fail_fast", alias = "fail-fast", alias = "failfast")]
    FailFast,
    /// Replace invalid sequences with U+FFFD
    Lossy,
}

impl From<EncodingArg> for EncodingMode {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::FailFast => EncodingMode::FailFast,
            EncodingArg::Lossy => EncodingMode::Lossy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark every selected strategy over the input files
    Run(Box<RunArgs>),

    /// Count once with every selected strategy and print the results
    Count {
        /// Word or phrase to count (case-insensitive)
        #[arg(short = 't', long)]
        target: String,

        /// Input file
        file: PathBuf,

        /// Worker counts for the thread-pool strategy
        #[arg(short = 'j', long, value_delimiter = ',')]
        threads: Vec<usize>,

        /// Strategies to run (serial, parallel, gpu, gpu-opt)
        #[arg(short = 's', long = "strategy", value_delimiter = ',')]
        strategies: Vec<Method>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// List compute devices in selection order
    Devices {
        /// Print devices as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_benchmark(*args, cli.log_level),
        Commands::Count {
            target,
            file,
            threads,
            strategies,
            json,
        } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            count_once(target, &file, threads, strategies, json)
        }
        Commands::Devices { json } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            list_devices(json)
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn cli_overrides(args: &RunArgs, log_level: Option<String>) -> CliOverrides {
    CliOverrides {
        target: args.target.clone(),
        inputs: (!args.inputs.is_empty()).then(|| args.inputs.clone()),
        runs: args.runs,
        thread_counts: (!args.threads.is_empty()).then(|| args.threads.clone()),
        strategies: (!args.strategies.is_empty()).then(|| args.strategies.clone()),
        group_size: args.group_size,
        skip_failed_accelerators: args.fail_on_accelerator_error.then_some(false),
        csv_output: args.csv.clone(),
        encoding: args.encoding.map(EncodingMode::from),
        log_level,
    }
}

fn default_csv_path() -> PathBuf {
    let stamp: String = humantime::format_rfc3339_seconds(SystemTime::now())
        .to_string()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let (date, time) = stamp.split_at(8.min(stamp.len()));
    PathBuf::from("results").join(format!("wordcount_{}_{}.csv", date, time))
}

fn load_datasets(inputs: &[PathBuf], encoding: EncodingMode) -> Result<Vec<Dataset>> {
    inputs
        .iter()
        .map(|path| {
            load_dataset(path, encoding)
                .with_context(|| format!("Failed to load input {}", path.display()))
        })
        .collect()
}

fn progress_bar(total: u64) -> Result<ProgressBar> {
    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} runs {msg}")?
            .progress_chars("=>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    Ok(progress)
}

fn run_benchmark(args: RunArgs, log_level: Option<String>) -> Result<()> {
    let file_config = BenchConfig::load_from(args.config.as_deref()).with_context(|| {
        match &args.config {
            Some(path) => format!("Failed to load config {}", path.display()),
            None => "Failed to load configuration".to_string(),
        }
    })?;
    let config = file_config.merge_with_cli(cli_overrides(&args, log_level));
    init_logging(&config.log_level);
    match &args.config {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => debug!("Using configuration from the default locations"),
    }

    if config.target.trim().is_empty() {
        bail!("Missing target word: pass --target <word> or set `target` in the config");
    }
    if config.inputs.is_empty() {
        bail!("No input files: pass --input <file> or set `inputs` in the config");
    }

    let datasets = load_datasets(&config.inputs, config.encoding)?;
    info!(
        "Loaded {} datasets, {} bytes in total",
        datasets.len(),
        datasets.iter().map(Dataset::len).sum::<usize>()
    );
    let runner = BenchmarkRunner::new(BenchmarkPlan::from_config(&config));

    let show_progress = !args.quiet && !args.json;
    let total = (runner.plan().invocations_per_dataset() * datasets.len()) as u64;
    let progress = if show_progress {
        Some(progress_bar(total)?)
    } else {
        None
    };

    let report = runner.run_with(&datasets, |record| {
        if let Some(progress) = &progress {
            progress.set_message(format!("{} {}", record.method, record.dataset));
            progress.inc(1);
        }
    })?;
    if let Some(progress) = &progress {
        progress.finish_and_clear();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    print_problems(&report);

    let csv_path = config.csv_output.clone().unwrap_or_else(default_csv_path);
    write_csv(&csv_path, &report.records)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;
    eprintln!("CSV written to {}", csv_path.display());

    Ok(())
}

fn count_once(
    target: String,
    file: &Path,
    threads: Vec<usize>,
    strategies: Vec<Method>,
    json: bool,
) -> Result<()> {
    let dataset = load_dataset(file, EncodingMode::FailFast)
        .with_context(|| format!("Failed to load input {}", file.display()))?;

    let mut plan = BenchmarkPlan::new(target);
    plan.runs = 1;
    if !threads.is_empty() {
        plan.thread_counts = threads;
    }
    if !strategies.is_empty() {
        plan.strategies = strategies;
    }

    let report = BenchmarkRunner::new(plan).run(&[dataset])?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.records)?);
    } else {
        for record in &report.records {
            let detail = match (&record.parallelism, &record.device_label) {
                (Some(threads), _) => format!("{} threads", threads),
                (None, Some(device)) => device.clone(),
                (None, None) => String::new(),
            };
            println!(
                "{:<16} {:>10} {:>12.3} ms  {}",
                record.method.to_string().blue(),
                record.occurrences.to_string().green(),
                record.duration_millis(),
                detail
            );
        }
    }
    print_problems(&report);
    Ok(())
}

fn list_devices(json: bool) -> Result<()> {
    let platform = default_platform();
    let devices = enumerate(platform.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No compute devices found");
        return Ok(());
    }
    for (i, device) in devices.iter().enumerate() {
        let marker = if i == 0 { "*" } else { " " };
        println!(
            "{} {:<12} {} (max work-group {})",
            marker.green(),
            device.class.to_string().blue(),
            device.identity(),
            device.max_work_group_size
        );
    }
    Ok(())
}

fn print_summary(report: &BenchmarkReport) {
    let mut current_dataset: Option<&str> = None;
    let rows = summarize(&report.records);
    for row in &rows {
        if current_dataset != Some(row.dataset.as_str()) {
            println!("\n{}", row.dataset.blue());
            current_dataset = Some(row.dataset.as_str());
        }
        println!(
            "  {:<20} {:>10} occurrences  avg {:>10.3} ms  min {:>10.3} ms  max {:>10.3} ms",
            row.label(),
            row.occurrences.to_string().green(),
            millis(row.average()),
            millis(row.min),
            millis(row.max)
        );
    }
}

fn print_problems(report: &BenchmarkReport) {
    for failure in &report.failures {
        eprintln!(
            "{} {} on {} (run {}): {}",
            "skipped".yellow(),
            failure.method,
            failure.dataset,
            failure.run,
            failure.error
        );
    }
    for dataset in report.mismatches() {
        eprintln!(
            "{} strategies disagree on the occurrence count for {}",
            "warning:".red(),
            dataset
        );
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
