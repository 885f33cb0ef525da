//! Splitting text into per-worker chunks.
//!
//! Each chunk owns the occurrences whose start offset lies in `[start, end)`
//! but is scanned up to `search_limit`, so an occurrence that starts inside
//! the chunk and runs past `end` is still seen by the chunk that owns it.
//!
//! ```text
//!  0          end0=start1       end1=start2       text_len
//!  |-----------|-----------------|-----------------|
//!  [ chunk 0   ]---+             |                 |
//!              |   search_limit0 = end0 + m - 1    |
//!              [ chunk 1         ]---+             |
//! ```

use tracing::debug;

use crate::errors::{CountError, CountResult};

/// A half-open ownership range plus the exclusive end of its scan window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub search_limit: usize,
}

impl Chunk {
    /// Number of offsets owned by this chunk
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether an occurrence starting at `offset` belongs to this chunk
    pub fn owns(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Computes the per-worker chunk size, never smaller than one byte
pub fn chunk_size(text_len: usize, workers: usize) -> usize {
    text_len.div_ceil(workers.max(1)).max(1)
}

/// Splits `[0, text_len)` into at most `workers` chunks.
///
/// Workers whose start would fall at or past the end of the text are
/// dropped, so short texts yield fewer chunks than requested workers.
pub fn partition(text_len: usize, workers: usize, pattern_len: usize) -> CountResult<Vec<Chunk>> {
    if workers == 0 {
        return Err(CountError::invalid_argument(
            "worker count must be at least 1",
        ));
    }
    if pattern_len == 0 {
        return Err(CountError::invalid_argument(
            "pattern length must be at least 1",
        ));
    }

    let size = chunk_size(text_len, workers);
    let chunks: Vec<Chunk> = (0..workers)
        .map(|i| i * size)
        .take_while(|&start| start < text_len)
        .map(|start| {
            let end = (start + size).min(text_len);
            Chunk {
                start,
                end,
                search_limit: (end + pattern_len - 1).min(text_len),
            }
        })
        .collect();

    debug!(
        "Partitioned {} bytes into {} chunks of up to {} bytes ({} workers requested)",
        text_len,
        chunks.len(),
        size,
        workers
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let chunks = partition(8, 2, 3).unwrap();
        assert_eq!(
            chunks,
            vec![
                Chunk {
                    start: 0,
                    end: 4,
                    search_limit: 6
                },
                Chunk {
                    start: 4,
                    end: 8,
                    search_limit: 8
                },
            ]
        );
    }

    #[test]
    fn test_uneven_split_rounds_up() {
        let chunks = partition(10, 3, 1).unwrap();
        let ranges: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 8), (8, 10)]);
        // Single-byte patterns never need an over-scan
        assert!(chunks.iter().all(|c| c.search_limit == c.end));
    }

    #[test]
    fn test_short_text_drops_idle_workers() {
        let chunks = partition(3, 8, 2).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(partition(0, 4, 3).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_zero_workers_and_empty_pattern() {
        assert!(matches!(
            partition(10, 0, 2),
            Err(CountError::InvalidArgument(_))
        ));
        assert!(matches!(
            partition(10, 2, 0),
            Err(CountError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_search_limit_clamped_to_text() {
        let chunks = partition(5, 1, 10).unwrap();
        assert_eq!(chunks[0].search_limit, 5);
    }

    #[test]
    fn test_ownership() {
        let chunk = Chunk {
            start: 4,
            end: 8,
            search_limit: 10,
        };
        assert!(!chunk.owns(3));
        assert!(chunk.owns(4));
        assert!(chunk.owns(7));
        assert!(!chunk.owns(8));
    }
}
