//! Benchmark orchestration across datasets, runs and strategies.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ResourceCache;
use crate::config::BenchConfig;
use crate::counter::{Counter, KernelCounter, Method, SerialCounter, WorkerPoolCounter};
use crate::device::{default_platform, AcceleratorPlatform};
use crate::errors::{CountError, CountResult};
use crate::kernel::{KernelVariant, DEFAULT_GROUP_SIZE};
use crate::normalize::validate_pattern;
use crate::record::MeasurementRecord;
use crate::source::Dataset;

/// What to run against every dataset
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkPlan {
    pub target: String,
    pub runs: usize,
    pub thread_counts: Vec<usize>,
    pub strategies: Vec<Method>,
    pub group_size: usize,
    pub skip_failed_accelerators: bool,
}

impl BenchmarkPlan {
    pub fn new(target: impl Into<String>) -> Self {
        let defaults = BenchConfig::default();
        Self {
            target: target.into(),
            runs: defaults.runs,
            thread_counts: defaults.thread_counts,
            strategies: defaults.strategies,
            group_size: DEFAULT_GROUP_SIZE,
            skip_failed_accelerators: defaults.skip_failed_accelerators,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            target: config.target.clone(),
            runs: config.runs,
            thread_counts: config.thread_counts.clone(),
            strategies: config.strategies.clone(),
            group_size: config.group_size,
            skip_failed_accelerators: config.skip_failed_accelerators,
        }
    }

    /// Rejects plans that would fail part-way through a run
    pub fn validate(&self) -> CountResult<()> {
        validate_pattern(&self.target)?;
        if self.runs == 0 {
            return Err(CountError::invalid_argument("runs must be at least 1"));
        }
        if self.strategies.is_empty() {
            return Err(CountError::invalid_argument("no strategies selected"));
        }
        if self.strategies.contains(&Method::ParallelCpu) {
            if self.thread_counts.is_empty() {
                return Err(CountError::invalid_argument(
                    "thread-pool strategy needs at least one thread count",
                ));
            }
            if self.thread_counts.contains(&0) {
                return Err(CountError::invalid_argument(
                    "thread count must be at least 1",
                ));
            }
        }
        if self.group_size == 0 || !self.group_size.is_power_of_two() {
            return Err(CountError::invalid_argument(format!(
                "work-group size must be a power of two, got {}",
                self.group_size
            )));
        }
        Ok(())
    }

    /// Thread counts in ascending order without duplicates
    pub fn sorted_thread_counts(&self) -> Vec<usize> {
        let mut counts = self.thread_counts.clone();
        counts.sort_unstable();
        counts.dedup();
        counts
    }

    /// Selected strategies in execution order
    pub fn ordered_strategies(&self) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|m| self.strategies.contains(m))
            .collect()
    }

    /// Records produced per dataset when nothing fails
    pub fn invocations_per_dataset(&self) -> usize {
        let per_run: usize = self
            .ordered_strategies()
            .iter()
            .map(|m| match m {
                Method::ParallelCpu => self.sorted_thread_counts().len(),
                _ => 1,
            })
            .sum();
        per_run * self.runs
    }
}

/// An accelerator invocation that failed and was skipped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub dataset: String,
    pub run: usize,
    pub method: Method,
    pub error: String,
}

/// Everything a benchmark produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct BenchmarkReport {
    pub records: Vec<MeasurementRecord>,
    pub failures: Vec<StrategyFailure>,
}

impl BenchmarkReport {
    /// Datasets whose records disagree on the occurrence count
    pub fn mismatches(&self) -> Vec<String> {
        let mut datasets: Vec<&str> = Vec::new();
        for record in &self.records {
            if !datasets.contains(&record.dataset.as_str()) {
                datasets.push(&record.dataset);
            }
        }
        datasets
            .into_iter()
            .filter(|dataset| {
                let mut counts = self
                    .records
                    .iter()
                    .filter(|r| r.dataset == *dataset)
                    .map(|r| r.occurrences);
                let first = counts.next();
                counts.any(|c| Some(c) != first)
            })
            .map(str::to_string)
            .collect()
    }
}

/// Runs a [`BenchmarkPlan`] over in-memory datasets
#[derive(Debug)]
pub struct BenchmarkRunner {
    plan: BenchmarkPlan,
    platform: Arc<dyn AcceleratorPlatform>,
    cache: Arc<ResourceCache>,
}

impl BenchmarkRunner {
    pub fn new(plan: BenchmarkPlan) -> Self {
        Self::with_platform(plan, default_platform(), ResourceCache::global())
    }

    pub fn with_platform(
        plan: BenchmarkPlan,
        platform: Arc<dyn AcceleratorPlatform>,
        cache: Arc<ResourceCache>,
    ) -> Self {
        Self {
            plan,
            platform,
            cache,
        }
    }

    pub fn plan(&self) -> &BenchmarkPlan {
        &self.plan
    }

    fn counters(&self) -> CountResult<Vec<Box<dyn Counter>>> {
        let mut counters: Vec<Box<dyn Counter>> = Vec::new();
        for method in self.plan.ordered_strategies() {
            match method {
                Method::SerialCpu => counters.push(Box::new(SerialCounter::new())),
                Method::ParallelCpu => {
                    for threads in self.plan.sorted_thread_counts() {
                        counters.push(Box::new(WorkerPoolCounter::new(threads)?));
                    }
                }
                Method::ParallelGpu => counters.push(Box::new(KernelCounter::new(
                    KernelVariant::Naive,
                    self.platform.clone(),
                    self.cache.clone(),
                ))),
                Method::ParallelGpuOpt => counters.push(Box::new(
                    KernelCounter::new(
                        KernelVariant::Reduced,
                        self.platform.clone(),
                        self.cache.clone(),
                    )
                    .with_group_size(self.plan.group_size)?,
                )),
            }
        }
        Ok(counters)
    }

    pub fn run(&self, datasets: &[Dataset]) -> CountResult<BenchmarkReport> {
        self.run_with(datasets, |_| {})
    }

    /// Runs the plan, handing every record to `observer` as it is produced
    pub fn run_with<F>(&self, datasets: &[Dataset], mut observer: F) -> CountResult<BenchmarkReport>
    where
        F: FnMut(&MeasurementRecord),
    {
        self.plan.validate()?;
        let counters = self.counters()?;
        let mut report = BenchmarkReport::default();

        for dataset in datasets {
            info!(
                "Dataset {} ({} bytes), {} runs",
                dataset.name,
                dataset.len(),
                self.plan.runs
            );

            for run in 1..=self.plan.runs {
                debug!("Run {}/{} of {}", run, self.plan.runs, dataset.name);
                for counter in &counters {
                    let method = counter.method();
                    match counter.count(&dataset.name, &dataset.text, &self.plan.target) {
                        Ok(record) => {
                            observer(&record);
                            report.records.push(record);
                        }
                        Err(e) if e.is_accelerator_failure() && self.plan.skip_failed_accelerators => {
                            warn!("{} skipped on {}: {}", method, dataset.name, e);
                            report.failures.push(StrategyFailure {
                                dataset: dataset.name.clone(),
                                run,
                                method,
                                error: e.to_string(),
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        for dataset in report.mismatches() {
            warn!("Strategies disagree on the occurrence count for {}", dataset);
        }
        self.cache.metrics().log_stats();

        Ok(report)
    }
}
