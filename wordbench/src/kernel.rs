//! Device kernel sources and launch geometry.
//!
//! A match is counted outright when the pattern cannot overlap itself
//! (smallest period equals its length). Otherwise a launch runs in three
//! phases. The link pass gives every resume offset `t` the offset the
//! greedy scan moves to next (`t + m` past a match, `t + 1` otherwise) and a
//! weight of 1 when a match starts at `t`. Pointer-jumping passes, one per
//! bit of the text length, turn the links into the number of matches the
//! scan selects from each offset onward. An offset is flagged when that
//! remaining count drops from `t` to `t + 1`; the flags sum to the count of
//! a scan from offset 0.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{CountError, CountResult};

/// Default reduced-kernel work-group size
pub const DEFAULT_GROUP_SIZE: usize = 256;

/// Entry point of the link pass
pub const LINK_KERNEL: &str = "link_offsets";

/// Entry point of one pointer-jumping pass
pub const JUMP_KERNEL: &str = "jump_links";

macro_rules! kernel_prelude {
    () => {
        r#"
inline int matches_at(__global const uchar* text, const uint textLen,
                      __global const uchar* pattern, const uint patternLen,
                      const uint pos)
{
    if (pos + patternLen > textLen) {
        return 0;
    }
    for (uint k = 0; k < patternLen; ++k) {
        if (text[pos + k] != pattern[k]) {
            return 0;
        }
    }
    return 1;
}

inline uint owned_flag(__global const uchar* text, const uint textLen,
                       __global const uchar* pattern, const uint patternLen,
                       const uint period, __global const uint* remaining,
                       const uint gid)
{
    if (gid + patternLen > textLen) {
        return 0;
    }
    if (period >= patternLen) {
        return matches_at(text, textLen, pattern, patternLen, gid);
    }
    return remaining[gid] - remaining[gid + 1];
}

__kernel void link_offsets(__global const uchar* text, const uint textLen,
                           __global const uchar* pattern, const uint patternLen,
                           __global uint* next, __global uint* weight)
{
    uint t = get_global_id(0);
    if (t > textLen) {
        return;
    }
    if (t < textLen && matches_at(text, textLen, pattern, patternLen, t)) {
        next[t] = t + patternLen;
        weight[t] = 1;
    } else {
        next[t] = min(t + 1, textLen);
        weight[t] = 0;
    }
}

__kernel void jump_links(__global const uint* nextIn, __global const uint* weightIn,
                         __global uint* nextOut, __global uint* weightOut,
                         const uint textLen)
{
    uint t = get_global_id(0);
    if (t > textLen) {
        return;
    }
    uint hop = nextIn[t];
    weightOut[t] = weightIn[t] + weightIn[hop];
    nextOut[t] = nextIn[hop];
}
"#
    };
}

/// One work-item per offset, one global atomic per flagged offset
pub const NAIVE_KERNEL_SOURCE: &str = concat!(
    kernel_prelude!(),
    r#"
__kernel void count_naive(__global const uchar* text, const uint textLen,
                          __global const uchar* pattern, const uint patternLen,
                          const uint period, __global const uint* remaining,
                          __global uint* counter)
{
    uint gid = get_global_id(0);
    if (gid + patternLen > textLen) {
        return;
    }
    if (owned_flag(text, textLen, pattern, patternLen, period, remaining, gid)) {
        atomic_inc(counter);
    }
}
"#
);

/// Work-group tree reduction, one global atomic per group
pub const REDUCED_KERNEL_SOURCE: &str = concat!(
    kernel_prelude!(),
    r#"
__kernel void count_reduced(__global const uchar* text, const uint textLen,
                            __global const uchar* pattern, const uint patternLen,
                            const uint period, __global const uint* remaining,
                            __global uint* counter, __local uint* scratch)
{
    uint gid = get_global_id(0);
    uint lid = get_local_id(0);
    uint size = get_local_size(0);

    uint flag = 0;
    if (gid < textLen) {
        flag = owned_flag(text, textLen, pattern, patternLen, period, remaining, gid);
    }
    scratch[lid] = flag;
    barrier(CLK_LOCAL_MEM_FENCE);

    for (uint stride = size / 2; stride > 0; stride >>= 1) {
        if (lid < stride) {
            scratch[lid] += scratch[lid + stride];
        }
        barrier(CLK_LOCAL_MEM_FENCE);
    }

    if (lid == 0 && scratch[0] > 0) {
        atomic_add(counter, scratch[0]);
    }
}
"#
);

/// Which device kernel a bundle was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelVariant {
    Naive,
    Reduced,
}

impl KernelVariant {
    pub fn source(&self) -> &'static str {
        match self {
            KernelVariant::Naive => NAIVE_KERNEL_SOURCE,
            KernelVariant::Reduced => REDUCED_KERNEL_SOURCE,
        }
    }

    pub fn entry_point(&self) -> &'static str {
        match self {
            KernelVariant::Naive => "count_naive",
            KernelVariant::Reduced => "count_reduced",
        }
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// Smallest period of `pattern`, from the KMP prefix function.
///
/// Returns 0 for an empty pattern.
pub fn smallest_period(pattern: &[u8]) -> usize {
    let m = pattern.len();
    if m == 0 {
        return 0;
    }
    let mut prefix = vec![0usize; m];
    let mut k = 0;
    for i in 1..m {
        while k > 0 && pattern[i] != pattern[k] {
            k = prefix[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        prefix[i] = k;
    }
    m - prefix[m - 1]
}

/// Whether `pattern` occurs in `text` at `pos`
pub fn matches_at(text: &[u8], pattern: &[u8], pos: usize) -> bool {
    !pattern.is_empty() && text.get(pos..pos + pattern.len()) == Some(pattern)
}

/// Greedy-scan link from resume offset `offset`: the next resume offset and
/// whether a match is selected on the way
pub fn scan_link(text: &[u8], pattern: &[u8], offset: usize) -> (u32, u32) {
    if offset < text.len() && matches_at(text, pattern, offset) {
        ((offset + pattern.len()) as u32, 1)
    } else {
        ((offset + 1).min(text.len()) as u32, 0)
    }
}

/// Pointer-jumping passes needed to resolve every link chain of a text.
///
/// A chain advances at least one offset per link, so after `r` passes with
/// `2^r >= text_len` every pointer has reached the end.
pub fn jump_rounds(text_len: usize) -> u32 {
    usize::BITS - text_len.leading_zeros()
}

/// NDRange shape of one launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub global_size: usize,
    /// Work-group size, `None` lets the runtime choose
    pub local_size: Option<usize>,
}

impl LaunchGeometry {
    /// One work-item per text offset
    pub fn naive(text_len: usize) -> Self {
        Self {
            global_size: text_len,
            local_size: None,
        }
    }

    /// Global size rounded up to a multiple of `group_size`
    pub fn reduced(text_len: usize, group_size: usize) -> Self {
        Self {
            global_size: text_len.div_ceil(group_size) * group_size,
            local_size: Some(group_size),
        }
    }

    pub fn group_count(&self) -> usize {
        match self.local_size {
            Some(local) => self.global_size / local,
            None => 1,
        }
    }
}

/// Validates a requested work-group size and caps it to the device limit.
///
/// The requested size must be a non-zero power of two; the result is the
/// largest power of two not exceeding either bound.
pub fn effective_group_size(requested: usize, device_max: usize) -> CountResult<usize> {
    if requested == 0 || !requested.is_power_of_two() {
        return Err(CountError::invalid_argument(format!(
            "work-group size must be a power of two, got {}",
            requested
        )));
    }
    let cap = match device_max {
        0 => 1,
        max if max.is_power_of_two() => max,
        max => max.next_power_of_two() / 2,
    };
    Ok(requested.min(cap))
}

/// Everything a compiled kernel needs for one launch
#[derive(Debug, Clone, Copy)]
pub struct KernelJob<'a> {
    pub text: &'a [u8],
    pub pattern: &'a [u8],
    pub period: u32,
    pub geometry: LaunchGeometry,
}

impl<'a> KernelJob<'a> {
    /// Prepares a launch, rejecting inputs too large for 32-bit indexing
    pub fn new(
        text: &'a [u8],
        pattern: &'a [u8],
        geometry: LaunchGeometry,
    ) -> CountResult<Self> {
        if text.len() > i32::MAX as usize {
            return Err(CountError::invalid_argument(format!(
                "text of {} bytes exceeds the kernel index range",
                text.len()
            )));
        }
        Ok(Self {
            text,
            pattern,
            period: smallest_period(pattern) as u32,
            geometry,
        })
    }

    pub fn text_len(&self) -> u32 {
        self.text.len() as u32
    }

    pub fn pattern_len(&self) -> u32 {
        self.pattern.len() as u32
    }

    /// Whether two occurrences of the pattern can overlap, which calls for
    /// the link and jump passes
    pub fn self_overlapping(&self) -> bool {
        (self.period as usize) < self.pattern.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::serial::count_occurrences;

    /// Remaining greedy count from every resume offset, right to left
    fn remaining_counts(text: &[u8], pattern: &[u8]) -> Vec<u32> {
        let mut remaining = vec![0u32; text.len() + 1];
        for t in (0..text.len()).rev() {
            let (next, weight) = scan_link(text, pattern, t);
            remaining[t] = weight + remaining[next as usize];
        }
        remaining
    }

    fn flagged_count(text: &[u8], pattern: &[u8]) -> u64 {
        let remaining = remaining_counts(text, pattern);
        remaining
            .windows(2)
            .map(|pair| {
                let drop = pair[0] - pair[1];
                assert!(drop <= 1);
                u64::from(drop)
            })
            .sum()
    }

    #[test]
    fn test_smallest_period() {
        assert_eq!(smallest_period(b"word"), 4);
        assert_eq!(smallest_period(b"aba"), 2);
        assert_eq!(smallest_period(b"aaaa"), 1);
        assert_eq!(smallest_period(b"abcab"), 3);
        assert_eq!(smallest_period(b"aabaa"), 3);
        assert_eq!(smallest_period(b""), 0);
    }

    #[test]
    fn test_scan_links() {
        assert_eq!(scan_link(b"abababab", b"aba", 0), (3, 1));
        assert_eq!(scan_link(b"abababab", b"aba", 1), (2, 0));
        assert_eq!(scan_link(b"abababab", b"aba", 6), (7, 0));
        assert_eq!(scan_link(b"abababab", b"aba", 8), (8, 0));
        assert_eq!(scan_link(b"abc", b"", 0), (1, 0));
    }

    #[test]
    fn test_flags_follow_serial_scan() {
        let remaining = remaining_counts(b"abababab", b"aba");
        assert_eq!(remaining[0], 2);
        assert_eq!(flagged_count(b"abababab", b"aba"), 2);
    }

    #[test]
    fn test_flags_on_periodic_text() {
        let text = "aabaabaa".repeat(5) + "baab" + &"aabaa".repeat(3) + "abaa";
        for pattern in ["aa", "aabaa", "abaab", "baab", "a", "aaba"] {
            assert_eq!(
                flagged_count(text.as_bytes(), pattern.as_bytes()),
                count_occurrences(text.as_bytes(), pattern.as_bytes()),
                "pattern {}",
                pattern
            );
        }
    }

    #[test]
    fn test_jump_rounds_grow_with_bit_length() {
        assert_eq!(jump_rounds(0), 0);
        assert_eq!(jump_rounds(1), 1);
        assert_eq!(jump_rounds(8), 4);
        assert_eq!(jump_rounds(40_000), 16);
        assert_eq!(jump_rounds(i32::MAX as usize), 31);
    }

    #[test]
    fn test_self_overlap_detection() {
        let geometry = LaunchGeometry::naive(8);
        assert!(KernelJob::new(b"abababab", b"aba", geometry)
            .unwrap()
            .self_overlapping());
        assert!(!KernelJob::new(b"abababab", b"ab", geometry)
            .unwrap()
            .self_overlapping());
    }

    #[test]
    fn test_launch_geometry() {
        let geometry = LaunchGeometry::reduced(1000, 256);
        assert_eq!(geometry.global_size, 1024);
        assert_eq!(geometry.group_count(), 4);
        assert_eq!(LaunchGeometry::naive(1000).global_size, 1000);
    }

    #[test]
    fn test_effective_group_size() {
        assert_eq!(effective_group_size(256, 1024).unwrap(), 256);
        assert_eq!(effective_group_size(256, 64).unwrap(), 64);
        assert_eq!(effective_group_size(256, 200).unwrap(), 128);
        assert!(matches!(
            effective_group_size(100, 1024),
            Err(CountError::InvalidArgument(_))
        ));
        assert!(effective_group_size(0, 1024).is_err());
    }

    #[test]
    fn test_sources_name_their_entry_points() {
        for variant in [KernelVariant::Naive, KernelVariant::Reduced] {
            let source = variant.source();
            assert!(source.contains(variant.entry_point()));
            assert!(source.contains(LINK_KERNEL));
            assert!(source.contains(JUMP_KERNEL));
        }
        assert!(REDUCED_KERNEL_SOURCE.contains("barrier(CLK_LOCAL_MEM_FENCE)"));
    }
}
