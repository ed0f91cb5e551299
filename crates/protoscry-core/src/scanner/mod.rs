//! Binary scanning module for finding embedded protobuf descriptors.
//!
//! Compiled programs frequently carry their `FileDescriptorProto`s as raw
//! serialized bytes with nothing pointing at them. This module finds them
//! anyway.
//!
//! ## Algorithm Overview
//!
//! 1. Search for the `.proto` byte sequence, which ends nearly every declared
//!    file name
//! 2. Look back for the tag byte `0x0A` (field 1, wire type LEN) whose length
//!    prefix ends exactly at the end of the match, over plausible file name
//!    characters only
//! 3. Estimate the message extent by walking the wire format
//! 4. Try every window size from `estimate + window_slack` down to 1 and keep
//!    the largest one that decodes as a `FileDescriptorProto`
//! 5. Drop byte-identical repeats and hand the rest to the caller
//!
//! Two ways to consume results are offered: [`Scanner::descriptors`] yields
//! them lazily, and [`Scanner::extract`] pushes them into a fallible sink.

mod wire;

use prost::Message;
use prost_types::FileDescriptorProto;
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, trace, warn};

pub use wire::{decode_varint, estimate_message_len, skip_field, WireType, NAME_FIELD_TAG};

/// Pattern to search for in binaries (filename suffix)
pub const PROTO_SUFFIX: &[u8] = b".proto";

/// Extra bytes added past the estimated message length before searching.
///
/// The estimate can fall short on unusual encodings; the margin is empirical.
pub const DEFAULT_WINDOW_SLACK: usize = 1024;

/// How far back from a `.proto` match the name field tag may start
pub const DEFAULT_NAME_LOOKBACK: usize = 64;

/// Bytes allowed inside a declared file name
const FILE_NAME_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_/$,.[]()";

/// A descriptor found in the scanned buffer
#[derive(Debug, Clone)]
pub struct Extracted<'a> {
    /// The raw bytes of the FileDescriptorProto, exactly as they appear in the input
    pub raw: &'a [u8],
    /// Byte range in the original input where this was found
    pub range: Range<usize>,
    /// The decoded descriptor
    pub descriptor: FileDescriptorProto,
}

impl<'a> Extracted<'a> {
    /// Returns the raw bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.raw
    }

    /// Splits into raw bytes and the decoded descriptor
    pub fn into_parts(self) -> (&'a [u8], FileDescriptorProto) {
        (self.raw, self.descriptor)
    }
}

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Bytes added to the estimated length before the window search
    pub window_slack: usize,
    /// Maximum distance between the name tag and the `.proto` match
    pub name_lookback: usize,
    /// Total decode attempts allowed for one scan (0 = unlimited)
    pub max_decode_attempts: usize,
    /// Maximum number of descriptors to yield (0 = unlimited)
    pub max_results: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            window_slack: DEFAULT_WINDOW_SLACK,
            name_lookback: DEFAULT_NAME_LOOKBACK,
            max_decode_attempts: 0,
            max_results: 0,
        }
    }
}

impl ScannerConfig {
    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window slack added to the length estimate
    pub fn window_slack(mut self, slack: usize) -> Self {
        self.window_slack = slack;
        self
    }

    /// Sets how far back to look for the name field tag
    pub fn name_lookback(mut self, lookback: usize) -> Self {
        self.name_lookback = lookback;
        self
    }

    /// Caps the number of decode attempts for the whole scan
    pub fn max_decode_attempts(mut self, max: usize) -> Self {
        self.max_decode_attempts = max;
        self
    }

    /// Sets the maximum number of results to return
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }
}

/// Counters describing one finished (or aborted) scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// `.proto` occurrences inspected
    pub anchors: usize,
    /// Anchors preceded by a plausible name field
    pub candidates: usize,
    /// Speculative decodes performed
    pub decode_attempts: usize,
    /// Unique descriptors yielded
    pub descriptors: usize,
    /// Descriptors skipped because identical bytes were already yielded
    pub duplicates: usize,
    /// The scan stopped because the decode attempt budget ran out
    pub budget_exhausted: bool,
}

/// Primary scanner for finding embedded protobuf descriptors
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Creates a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Lazily yields every unique descriptor in `data`, in buffer order.
    ///
    /// The iterator carries its own copy of the configuration, so it only
    /// borrows `data`.
    pub fn descriptors<'d>(&self, data: &'d [u8]) -> Descriptors<'d> {
        debug!("Starting scan of {} bytes", data.len());
        Descriptors {
            config: self.config.clone(),
            data,
            position: 0,
            seen: HashSet::new(),
            summary: ScanSummary::default(),
            done: false,
        }
    }

    /// Scans `data` and calls `sink` with the raw bytes and decoded tree of
    /// each unique descriptor.
    ///
    /// The first error returned by `sink` stops the scan and is returned as-is.
    /// Descriptors delivered before that stay delivered.
    pub fn extract<F, E>(&self, data: &[u8], mut sink: F) -> std::result::Result<ScanSummary, E>
    where
        F: FnMut(&[u8], FileDescriptorProto) -> std::result::Result<(), E>,
    {
        let mut descriptors = self.descriptors(data);
        for found in descriptors.by_ref() {
            let (raw, descriptor) = found.into_parts();
            sink(raw, descriptor)?;
        }
        Ok(descriptors.into_summary())
    }
}

/// Iterator over the unique descriptors of one buffer.
///
/// Created by [`Scanner::descriptors`]. Once exhausted it stays exhausted.
#[derive(Debug)]
pub struct Descriptors<'d> {
    config: ScannerConfig,
    data: &'d [u8],
    position: usize,
    seen: HashSet<&'d [u8]>,
    summary: ScanSummary,
    done: bool,
}

impl Descriptors<'_> {
    /// Counters for the scan so far
    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }

    /// Consumes the iterator, returning its counters
    pub fn into_summary(self) -> ScanSummary {
        self.summary
    }

    fn budget_left(&self) -> bool {
        self.config.max_decode_attempts == 0
            || self.summary.decode_attempts < self.config.max_decode_attempts
    }

    /// Locate the name field tag for a `.proto` match at `anchor`.
    fn find_record_start(&self, anchor: usize) -> Option<usize> {
        let name_end = anchor + PROTO_SUFFIX.len();

        for distance in 0..self.config.name_lookback {
            let Some(tag_pos) = anchor.checked_sub(distance + 1) else {
                break;
            };
            if self.data[tag_pos] != NAME_FIELD_TAG {
                continue;
            }

            let Ok((length, varint_len)) = decode_varint(&self.data[tag_pos + 1..]) else {
                continue;
            };
            let name_start = tag_pos + 1 + varint_len;
            if name_start > name_end || length != (name_end - name_start) as u64 {
                continue;
            }
            if is_file_name(&self.data[name_start..name_end]) {
                return Some(tag_pos);
            }
        }

        None
    }

    /// Find the largest window at `start` that decodes as a descriptor.
    fn decode_largest(&mut self, start: usize) -> Option<(usize, FileDescriptorProto)> {
        let estimate = estimate_message_len(&self.data[start..]);
        let available = self.data.len() - start;
        let upper = estimate.saturating_add(self.config.window_slack).min(available);

        trace!(
            "Estimated {} bytes at {}, searching windows up to {}",
            estimate,
            start,
            upper
        );

        for size in (1..=upper).rev() {
            if !self.budget_left() {
                self.summary.budget_exhausted = true;
                return None;
            }
            self.summary.decode_attempts += 1;

            if let Ok(descriptor) = FileDescriptorProto::decode(&self.data[start..start + size]) {
                return Some((size, descriptor));
            }
        }

        None
    }
}

impl<'d> Iterator for Descriptors<'d> {
    type Item = Extracted<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while self.position < self.data.len() {
            let Some(relative_pos) = find_subsequence(&self.data[self.position..], PROTO_SUFFIX)
            else {
                break;
            };

            let anchor = self.position + relative_pos;
            let anchor_end = anchor + PROTO_SUFFIX.len();
            self.summary.anchors += 1;
            trace!("Found .proto suffix at position {}", anchor);

            let Some(record_start) = self.find_record_start(anchor) else {
                self.position = anchor_end;
                continue;
            };
            self.summary.candidates += 1;
            trace!("Found record start at position {}", record_start);

            let Some((size, descriptor)) = self.decode_largest(record_start) else {
                if self.summary.budget_exhausted {
                    warn!(
                        "Decode attempt budget of {} exhausted at offset {}",
                        self.config.max_decode_attempts, record_start
                    );
                    break;
                }
                trace!("No window at {} decoded", record_start);
                self.position = anchor_end;
                continue;
            };

            let data = self.data;
            let range = record_start..record_start + size;
            let raw = &data[range.clone()];
            self.position = range.end.max(anchor_end);

            if !self.seen.insert(raw) {
                debug!(
                    "Skipping duplicate descriptor at {}..{}",
                    range.start, range.end
                );
                self.summary.duplicates += 1;
                continue;
            }

            debug!(
                "Found descriptor {:?} at {}..{} ({} bytes)",
                descriptor.name(),
                range.start,
                range.end,
                size
            );
            self.summary.descriptors += 1;
            if self.config.max_results > 0 && self.summary.descriptors >= self.config.max_results {
                self.done = true;
            }

            return Some(Extracted {
                raw,
                range,
                descriptor,
            });
        }

        debug!("Scan complete: found {} descriptors", self.summary.descriptors);
        self.done = true;
        None
    }
}

impl std::iter::FusedIterator for Descriptors<'_> {}

/// Scan `data` with the default configuration, calling `sink` per unique descriptor.
pub fn extract<F, E>(data: &[u8], sink: F) -> std::result::Result<ScanSummary, E>
where
    F: FnMut(&[u8], FileDescriptorProto) -> std::result::Result<(), E>,
{
    Scanner::new().extract(data, sink)
}

/// Whether every byte may appear in a declared file name
fn is_file_name(data: &[u8]) -> bool {
    !data.is_empty() && data.iter().all(|b| FILE_NAME_CHARSET.contains(b))
}

/// Find a subsequence within a byte slice
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{DescriptorProto, EnumDescriptorProto};

    fn descriptor(name: &str, message: &str) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some("some.package".to_string()),
            dependency: vec!["one.proto".to_string(), "two.proto".to_string()],
            message_type: vec![DescriptorProto {
                name: Some(message.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn embed(parts: &[&[u8]]) -> Vec<u8> {
        let mut data = b"\x7fELF\x02\x01\x01\0garbage-before".to_vec();
        for part in parts {
            data.extend_from_slice(part);
            data.extend_from_slice(&[0u8; 48]);
        }
        data
    }

    fn collect(data: &[u8]) -> Vec<(Vec<u8>, FileDescriptorProto)> {
        let mut found = Vec::new();
        extract(data, |raw, fd| {
            found.push((raw.to_vec(), fd));
            Ok::<(), std::convert::Infallible>(())
        })
        .unwrap();
        found
    }

    #[test]
    fn test_find_subsequence() {
        let data = b"hello.proto.world";
        assert_eq!(find_subsequence(data, b".proto"), Some(5));
        assert_eq!(find_subsequence(data, b"world"), Some(12));
        assert_eq!(find_subsequence(data, b"missing"), None);
    }

    #[test]
    fn test_is_file_name() {
        assert!(is_file_name(b"google/protobuf/any.proto"));
        assert!(is_file_name(b"v1/$weird,[name](x).proto"));
        assert!(!is_file_name(b""));
        assert!(!is_file_name(b"bad name.proto"));
        assert!(!is_file_name(b"nul\0.proto"));
    }

    #[test]
    fn test_scanner_config_builder() {
        let config = ScannerConfig::new()
            .window_slack(16)
            .name_lookback(32)
            .max_decode_attempts(1000)
            .max_results(10);

        assert_eq!(config.window_slack, 16);
        assert_eq!(config.name_lookback, 32);
        assert_eq!(config.max_decode_attempts, 1000);
        assert_eq!(config.max_results, 10);
        assert_eq!(ScannerConfig::default().window_slack, DEFAULT_WINDOW_SLACK);
    }

    #[test]
    fn test_empty_input() {
        assert!(collect(&[]).is_empty());
    }

    #[test]
    fn test_no_proto_suffix() {
        let data = b"this is just some random data without any protobuf content";
        let summary = extract(data, |_, _| Err("sink must not be called")).unwrap();
        assert_eq!(summary, ScanSummary::default());
    }

    #[test]
    fn test_implausible_anchor_is_skipped() {
        let data = b"\x0a\x11hello world.proto";
        let summary = Scanner::new()
            .extract(data, |_, _| Err("sink must not be called"))
            .unwrap();
        assert_eq!(summary.anchors, 1);
        assert_eq!(summary.candidates, 0);
    }

    #[test]
    fn test_extracts_embedded_descriptor_verbatim() {
        let fd = descriptor("some.proto", "SomeMsg");
        let encoded = fd.encode_to_vec();
        let data = embed(&[&encoded]);

        let found = collect(&data);
        assert_eq!(found.len(), 1);
        let (raw, decoded) = &found[0];
        assert_eq!(raw, &encoded);
        assert_eq!(decoded, &fd);
        assert_eq!(&FileDescriptorProto::decode(raw.as_slice()).unwrap(), decoded);
    }

    #[test]
    fn test_descriptor_at_end_of_buffer() {
        let fd = descriptor("tail/end.proto", "Tail");
        let encoded = fd.encode_to_vec();
        let mut data = b"prefix".to_vec();
        data.extend_from_slice(&encoded);

        let found = collect(&data);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, encoded);
    }

    #[test]
    fn test_identical_descriptors_yield_once() {
        let encoded = descriptor("some.proto", "SomeMsg").encode_to_vec();
        let data = embed(&[&encoded, &encoded]);

        let mut descriptors = Scanner::new().descriptors(&data);
        assert!(descriptors.next().is_some());
        assert!(descriptors.next().is_none());
        assert_eq!(descriptors.summary().descriptors, 1);
        assert_eq!(descriptors.summary().duplicates, 1);
    }

    #[test]
    fn test_distinct_descriptors_in_order() {
        let first = descriptor("a/first.proto", "First").encode_to_vec();
        let second = FileDescriptorProto {
            name: Some("b/second.proto".to_string()),
            enum_type: vec![EnumDescriptorProto {
                name: Some("Kind".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
        .encode_to_vec();
        let data = embed(&[&first, &second]);

        let names: Vec<String> = Scanner::new()
            .descriptors(&data)
            .map(|found| found.descriptor.name().to_string())
            .collect();
        assert_eq!(names, vec!["a/first.proto", "b/second.proto"]);
    }

    #[test]
    fn test_range_points_into_input() {
        let encoded = descriptor("some.proto", "SomeMsg").encode_to_vec();
        let data = embed(&[&encoded]);

        let found = Scanner::new().descriptors(&data).next().unwrap();
        assert_eq!(&data[found.range.clone()], found.as_bytes());
    }

    #[test]
    fn test_results_outlive_scanner() {
        let encoded = descriptor("some.proto", "SomeMsg").encode_to_vec();
        let data = embed(&[&encoded]);

        let found: Vec<Extracted<'_>> = {
            let scanner = Scanner::with_config(ScannerConfig::new().window_slack(64));
            scanner.descriptors(&data).collect()
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_bytes(), encoded.as_slice());
    }

    #[test]
    fn test_sink_error_aborts_scan() {
        let first = descriptor("a/first.proto", "First").encode_to_vec();
        let second = descriptor("b/second.proto", "Second").encode_to_vec();
        let data = embed(&[&first, &second]);

        let mut calls = 0;
        let result = extract(&data, |_, _| {
            calls += 1;
            Err("stop")
        });
        assert_eq!(result.unwrap_err(), "stop");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_max_results() {
        let first = descriptor("a/first.proto", "First").encode_to_vec();
        let second = descriptor("b/second.proto", "Second").encode_to_vec();
        let data = embed(&[&first, &second]);

        let scanner = Scanner::with_config(ScannerConfig::new().max_results(1));
        assert_eq!(scanner.descriptors(&data).count(), 1);
    }

    #[test]
    fn test_decode_budget_cuts_scan_short() {
        let encoded = descriptor("some.proto", "SomeMsg").encode_to_vec();
        let data = embed(&[&encoded]);

        let scanner = Scanner::with_config(ScannerConfig::new().max_decode_attempts(3));
        let summary = scanner
            .extract(&data, |_, _| Err("sink must not be called"))
            .unwrap();
        assert!(summary.budget_exhausted);
        assert_eq!(summary.decode_attempts, 3);
        assert_eq!(summary.descriptors, 0);
    }
}
