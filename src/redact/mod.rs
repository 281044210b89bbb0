//! Ad-span normalization and transcript redaction.
//!
//! Span offsets come back from the language model and are untrusted: they may
//! be negative, inverted, out of bounds, duplicated, or overlapping. Nothing
//! in this module returns an error; bad input is filtered and clamped instead.

use serde::{Deserialize, Serialize};

/// Literal token substituted for each redacted span.
///
/// This string is part of the output format contract and is not configurable
/// at runtime.
pub const AD_MARKER: &str = "[AD REMOVED]";

/// Half-open `[start, end)` character-offset range into a transcript snapshot.
///
/// Raw intervals use `i64` because the model occasionally emits negative or
/// past-the-end offsets; normalization maps survivors into `0..=len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

/// Sorted, non-overlapping, in-bounds intervals over a text of known length.
///
/// Constructed only by [`IntervalSet::normalize`]; immutable afterward.
/// Exactly-adjacent input intervals are merged, so consecutive members are
/// always separated by at least one retained character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Reduce an arbitrary list of spans to a minimal normalized set.
    ///
    /// In order: drop empty/inverted ranges, drop ranges entirely outside
    /// `[0, text_len)`, clamp the rest into bounds (re-dropping any range the
    /// clamp collapsed), sort ascending by start, then sweep left to right
    /// merging every interval whose start is `<=` the accumulator's end.
    ///
    /// `text_len` is the **character** count of the text the offsets index
    /// into. Empty input or a zero length yields the empty set.
    pub fn normalize(raw: &[Interval], text_len: usize) -> Self {
        if raw.is_empty() || text_len == 0 {
            return Self::default();
        }

        let len = text_len as i64;
        let mut clamped: Vec<Interval> = raw
            .iter()
            .filter(|iv| iv.start < iv.end)
            .filter(|iv| iv.start < len && iv.end > 0)
            .map(|iv| Interval::new(iv.start.max(0), iv.end.min(len)))
            .filter(|iv| iv.start < iv.end)
            .collect();

        clamped.sort_by_key(|iv| (iv.start, iv.end));

        let mut merged: Vec<Interval> = Vec::with_capacity(clamped.len());
        for iv in clamped {
            match merged.last_mut() {
                // `<=` also merges exactly-adjacent spans, e.g. (10,20)+(20,30)
                Some(last) if iv.start <= last.end => last.end = last.end.max(iv.end),
                _ => merged.push(iv),
            }
        }

        Self { intervals: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }
}

/// Replace each interval of `set` in `text` with `marker`.
///
/// Emits the text before each interval, then the marker exactly once per
/// interval, then the text after the last one. The marker therefore occurs
/// exactly `set.len()` times in the output. An empty set returns the text
/// content unchanged.
///
/// Interval offsets are character offsets; they are translated to byte
/// positions here so multibyte transcripts slice cleanly.
pub fn redact(text: &str, set: &IntervalSet, marker: &str) -> String {
    if set.is_empty() {
        return text.to_owned();
    }

    // byte offset of every char boundary, plus the end-of-text sentinel
    let mut boundaries: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    boundaries.push(text.len());
    let last = boundaries.len() - 1;

    let mut out = String::with_capacity(text.len() + marker.len());
    let mut cursor = 0usize;
    for iv in set.iter() {
        let start = (iv.start.max(0) as usize).min(last);
        let end = (iv.end.max(0) as usize).min(last);
        out.push_str(&text[boundaries[cursor]..boundaries[start]]);
        out.push_str(marker);
        cursor = end;
    }
    out.push_str(&text[boundaries[cursor]..]);
    out
}
