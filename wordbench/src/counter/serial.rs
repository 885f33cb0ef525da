use memchr::memmem;
use tracing::trace;

use super::{Counter, Method};
use crate::errors::CountResult;
use crate::normalize::normalize;
use crate::record::{MeasurementRecord, MeasurementRecorder};

/// Counts occurrences of `pattern` in `text`, resuming after each match.
///
/// This is the reference rule for every strategy: in `"abababab"` the
/// pattern `"aba"` is found at offsets 0 and 4, and the occurrence at 2 is
/// skipped because it overlaps the first match.
pub fn count_occurrences(text: &[u8], pattern: &[u8]) -> u64 {
    if pattern.is_empty() || text.len() < pattern.len() {
        return 0;
    }
    memmem::find_iter(text, pattern).count() as u64
}

/// Single-threaded baseline
#[derive(Debug, Clone, Default)]
pub struct SerialCounter;

impl SerialCounter {
    pub fn new() -> Self {
        Self
    }
}

impl Counter for SerialCounter {
    fn method(&self) -> Method {
        Method::SerialCpu
    }

    fn count(&self, dataset: &str, text: &str, pattern: &str) -> CountResult<MeasurementRecord> {
        let input = normalize(text, pattern)?;
        trace!("Serial scan of {} ({} bytes)", dataset, input.text.len());

        MeasurementRecorder::new(self.method()).record(dataset, || {
            Ok(count_occurrences(input.text_bytes(), input.pattern_bytes()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CountError;

    #[test]
    fn test_resume_after_match() {
        assert_eq!(count_occurrences(b"abababab", b"aba"), 2);
        assert_eq!(count_occurrences(b"aaaa", b"aa"), 2);
        assert_eq!(count_occurrences(b"aaa", b"aa"), 1);
    }

    #[test]
    fn test_basic_counts() {
        assert_eq!(count_occurrences(b"the cat and the hat", b"the"), 2);
        assert_eq!(count_occurrences(b"no match here", b"xyz"), 0);
        assert_eq!(count_occurrences(b"ab", b"abc"), 0);
        assert_eq!(count_occurrences(b"", b"a"), 0);
    }

    #[test]
    fn test_counter_folds_case() {
        let record = SerialCounter::new()
            .count("mixed", "The THE the tHe", "the")
            .unwrap();
        assert_eq!(record.occurrences, 4);
        assert_eq!(record.method, Method::SerialCpu);
        assert_eq!(record.parallelism, None);
        assert_eq!(record.device_label, None);
    }

    #[test]
    fn test_counter_rejects_blank_pattern() {
        let result = SerialCounter::new().count("d", "text", " ");
        assert!(matches!(result, Err(CountError::InvalidArgument(_))));
    }
}
