//! Chunked counting on a bounded rayon pool.
//!
//! Every chunk is scanned independently and returns a [`ChunkTally`]. The
//! tallies are then reconciled in chunk order: a chunk whose first owned
//! match begins before the resume position carried over from the previous
//! chunk is rescanned from that position. Only self-overlapping patterns
//! ever trigger a rescan.

use memchr::memmem;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace};

use super::{Counter, Method};
use crate::errors::{CountError, CountResult};
use crate::normalize::normalize;
use crate::partition::{partition, Chunk};
use crate::record::{MeasurementRecord, MeasurementRecorder};

/// Partial result of scanning one chunk from its own start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkTally {
    /// Owned matches found by the independent scan
    pub count: u64,
    /// Absolute offset of the first owned match
    pub first_match: Option<usize>,
    /// Absolute offset just past the last owned match
    pub resume: usize,
}

/// Resume-after-match scan of `text[from..chunk.search_limit]`, keeping
/// only matches that start before `chunk.end`.
pub fn scan_chunk(text: &[u8], pattern: &[u8], chunk: &Chunk, from: usize) -> ChunkTally {
    let mut tally = ChunkTally {
        resume: from,
        ..ChunkTally::default()
    };
    if from >= chunk.end || chunk.search_limit <= from {
        return tally;
    }

    let window = &text[from..chunk.search_limit];
    for offset in memmem::find_iter(window, pattern)
        .map(|rel| from + rel)
        .take_while(|&offset| offset < chunk.end)
    {
        tally.first_match.get_or_insert(offset);
        tally.count += 1;
        tally.resume = offset + pattern.len();
    }
    tally
}

/// Combines per-chunk tallies into the serial count.
///
/// `tallies[i]` must be the result of scanning `chunks[i]` from its start.
pub fn reconcile(text: &[u8], pattern: &[u8], chunks: &[Chunk], tallies: &[ChunkTally]) -> u64 {
    let mut total = 0u64;
    let mut carry = 0usize;

    for (chunk, tally) in chunks.iter().zip(tallies) {
        match tally.first_match {
            None => {}
            Some(first) if first >= carry => {
                total += tally.count;
                carry = tally.resume;
            }
            Some(_) => {
                let from = carry.max(chunk.start);
                let rescan = scan_chunk(text, pattern, chunk, from);
                trace!(
                    "Rescanned chunk [{}, {}) from {}: {} -> {} matches",
                    chunk.start,
                    chunk.end,
                    from,
                    tally.count,
                    rescan.count
                );
                total += rescan.count;
                if rescan.first_match.is_some() {
                    carry = rescan.resume;
                }
            }
        }
    }

    total
}

/// Runs `scan` for every chunk on `pool`, preserving chunk order.
///
/// A panicking task fails the whole batch with `TaskFailure`.
pub fn run_tasks<F>(pool: &ThreadPool, chunks: &[Chunk], scan: F) -> CountResult<Vec<ChunkTally>>
where
    F: Fn(&Chunk) -> ChunkTally + Sync,
{
    pool.install(|| {
        chunks
            .par_iter()
            .map(|chunk| {
                panic::catch_unwind(AssertUnwindSafe(|| scan(chunk))).map_err(|payload| {
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    CountError::task_failure(format!(
                        "chunk [{}, {}) panicked: {}",
                        chunk.start, chunk.end, reason
                    ))
                })
            })
            .collect()
    })
}

/// Thread-pool strategy with a fixed worker count
#[derive(Debug, Clone)]
pub struct WorkerPoolCounter {
    threads: usize,
}

impl WorkerPoolCounter {
    pub fn new(threads: usize) -> CountResult<Self> {
        if threads == 0 {
            return Err(CountError::invalid_argument(
                "thread count must be at least 1",
            ));
        }
        Ok(Self { threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn build_pool(&self) -> CountResult<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("wordbench-worker-{}", i))
            .build()
            .map_err(|e| CountError::task_failure(format!("failed to build thread pool: {}", e)))
    }
}

impl Counter for WorkerPoolCounter {
    fn method(&self) -> Method {
        Method::ParallelCpu
    }

    fn count(&self, dataset: &str, text: &str, pattern: &str) -> CountResult<MeasurementRecord> {
        let input = normalize(text, pattern)?;
        let text = input.text_bytes();
        let pattern = input.pattern_bytes();

        let chunks = partition(text.len(), self.threads, pattern.len())?;
        let pool = self.build_pool()?;
        debug!(
            "Counting {} with {} workers over {} chunks",
            dataset,
            self.threads,
            chunks.len()
        );

        MeasurementRecorder::new(self.method())
            .with_parallelism(self.threads)
            .record(dataset, || {
                let tallies = run_tasks(&pool, &chunks, |chunk| {
                    scan_chunk(text, pattern, chunk, chunk.start)
                })?;
                Ok(reconcile(text, pattern, &chunks, &tallies))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::serial::count_occurrences;

    fn chunked_count(text: &[u8], pattern: &[u8], workers: usize) -> u64 {
        let chunks = partition(text.len(), workers, pattern.len()).unwrap();
        let tallies: Vec<_> = chunks
            .iter()
            .map(|c| scan_chunk(text, pattern, c, c.start))
            .collect();
        reconcile(text, pattern, &chunks, &tallies)
    }

    #[test]
    fn test_scan_chunk_keeps_owned_matches_only() {
        let text = b"xxabxxab";
        let chunk = Chunk {
            start: 0,
            end: 3,
            search_limit: 4,
        };
        let tally = scan_chunk(text, b"ab", &chunk, 0);
        assert_eq!(tally.count, 1);
        assert_eq!(tally.first_match, Some(2));
        assert_eq!(tally.resume, 4);
    }

    #[test]
    fn test_straddling_match_counted_once() {
        // "word" straddles the boundary at offset 4 for two workers
        let text = b"abcwordz";
        for workers in 1..=8 {
            assert_eq!(chunked_count(text, b"word", workers), 1, "{} workers", workers);
        }
    }

    #[test]
    fn test_self_overlapping_pattern_reconciled() {
        for workers in 1..=8 {
            assert_eq!(chunked_count(b"abababab", b"aba", workers), 2);
            assert_eq!(chunked_count(b"aaaaaaa", b"aa", workers), 3);
        }
    }

    #[test]
    fn test_reconcile_matches_serial_on_repetitive_text() {
        let text = "aab".repeat(17) + "aabaa";
        for pattern in ["aa", "aab", "abaa", "aabaab", "b"] {
            let expected = count_occurrences(text.as_bytes(), pattern.as_bytes());
            for workers in 1..=12 {
                assert_eq!(
                    chunked_count(text.as_bytes(), pattern.as_bytes(), workers),
                    expected,
                    "pattern {} with {} workers",
                    pattern,
                    workers
                );
            }
        }
    }

    #[test]
    fn test_rejects_zero_threads() {
        assert!(matches!(
            WorkerPoolCounter::new(0),
            Err(CountError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_panicking_task_is_task_failure() {
        let pool = ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let chunks = partition(16, 4, 2).unwrap();
        let result = run_tasks(&pool, &chunks, |chunk| {
            if chunk.start == 4 {
                panic!("boom");
            }
            ChunkTally::default()
        });
        match result {
            Err(CountError::TaskFailure(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected TaskFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_counter_records_parallelism() {
        let counter = WorkerPoolCounter::new(3).unwrap();
        let record = counter.count("sample", "Word word WORD", "word").unwrap();
        assert_eq!(record.occurrences, 3);
        assert_eq!(record.method, Method::ParallelCpu);
        assert_eq!(record.parallelism, Some(3));
    }

    #[test]
    fn test_text_shorter_than_pattern() {
        let counter = WorkerPoolCounter::new(4).unwrap();
        let record = counter.count("tiny", "ab", "abc").unwrap();
        assert_eq!(record.occurrences, 0);
    }
}
