use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::counter::Method;
use crate::errors::{CountError, CountResult};
use crate::kernel::DEFAULT_GROUP_SIZE;

/// How input files with invalid UTF-8 are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    /// Reject the file with an encoding error
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and continue
    Lossy,
}

/// Configuration for a benchmark run.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations; later sources
/// override earlier ones:
/// 1. Global `$CONFIG_DIR/wordbench/config.yaml`
/// 2. Local `.wordbench.yaml` in the current directory
/// 3. Custom config file specified via `--config` flag
///
/// # Configuration Format
///
/// ```yaml
/// # Word or phrase to count (case-insensitive)
/// target: "the"
///
/// # Input files, one dataset each
/// inputs:
///   - "corpus/small.txt"
///   - "corpus/large.txt"
///
/// # Repetitions of every strategy per dataset
/// runs: 3
///
/// # Worker counts for the thread-pool strategy
/// thread_counts: [2, 4, 8]
///
/// # Strategies to run
/// strategies: ["serial-cpu", "parallel-cpu", "parallel-gpu", "parallel-gpu-opt"]
///
/// # Reduced kernel work-group size (power of two)
/// group_size: 256
///
/// # Record accelerator failures and keep going
/// skip_failed_accelerators: true
///
/// # CSV export path
/// csv_output: "results/wordcount.csv"
///
/// # fail_fast or lossy
/// encoding: "fail_fast"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// When using the CLI, command-line arguments take precedence over config
/// file values; see [`BenchConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Word or phrase to count
    #[serde(default)]
    pub target: String,

    /// Input files, one dataset each
    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    /// Repetitions of every strategy per dataset
    #[serde(default = "default_runs")]
    pub runs: usize,

    /// Worker counts for the thread-pool strategy
    #[serde(default = "default_thread_counts")]
    pub thread_counts: Vec<usize>,

    /// Strategies to run, in any order
    #[serde(default = "default_strategies")]
    pub strategies: Vec<Method>,

    /// Reduced kernel work-group size
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Record accelerator failures instead of aborting
    #[serde(default = "default_skip_failed_accelerators")]
    pub skip_failed_accelerators: bool,

    /// Where to write the CSV export
    #[serde(default)]
    pub csv_output: Option<PathBuf>,

    /// Handling of invalid UTF-8 in inputs
    #[serde(default)]
    pub encoding: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_runs() -> usize {
    3
}

/// One fewer than the logical CPU count, leaving a core for the host
pub fn default_thread_counts() -> Vec<usize> {
    vec![num_cpus::get().saturating_sub(1).max(1)]
}

fn default_strategies() -> Vec<Method> {
    Method::ALL.to_vec()
}

fn default_group_size() -> usize {
    DEFAULT_GROUP_SIZE
}

fn default_skip_failed_accelerators() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            inputs: Vec::new(),
            runs: default_runs(),
            thread_counts: default_thread_counts(),
            strategies: default_strategies(),
            group_size: default_group_size(),
            skip_failed_accelerators: default_skip_failed_accelerators(),
            csv_output: None,
            encoding: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl BenchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> CountResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, layering a specific file over the defaults
    pub fn load_from(config_path: Option<&Path>) -> CountResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("wordbench/config.yaml")),
            Some(PathBuf::from(".wordbench.yaml")),
        ];
        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| CountError::config_error(e.to_string()))
    }

    /// Merges CLI arguments with configuration file values.
    ///
    /// Every value present in `cli` replaces the file value, including
    /// values equal to the defaults.
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(target) = cli.target {
            self.target = target;
        }
        if let Some(inputs) = cli.inputs {
            self.inputs = inputs;
        }
        if let Some(runs) = cli.runs {
            self.runs = runs;
        }
        if let Some(thread_counts) = cli.thread_counts {
            self.thread_counts = thread_counts;
        }
        if let Some(strategies) = cli.strategies {
            self.strategies = strategies;
        }
        if let Some(group_size) = cli.group_size {
            self.group_size = group_size;
        }
        if let Some(skip) = cli.skip_failed_accelerators {
            self.skip_failed_accelerators = skip;
        }
        if let Some(csv_output) = cli.csv_output {
            self.csv_output = Some(csv_output);
        }
        if let Some(encoding) = cli.encoding {
            self.encoding = encoding;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }
}

/// Values given on the command line; `None` keeps the configured value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub target: Option<String>,
    pub inputs: Option<Vec<PathBuf>>,
    pub runs: Option<usize>,
    pub thread_counts: Option<Vec<usize>>,
    pub strategies: Option<Vec<Method>>,
    pub group_size: Option<usize>,
    pub skip_failed_accelerators: Option<bool>,
    pub csv_output: Option<PathBuf>,
    pub encoding: Option<EncodingMode>,
    pub log_level: Option<String>,
}
