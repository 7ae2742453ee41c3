//! Incremental access-log record parser
//!
//! Consumes a byte stream chunk by chunk and yields structured records.
//! Lines split across chunk boundaries are reassembled through a carry-over
//! buffer, so the record sequence is invariant to how the stream is chunked.
//! The first complete line establishes the header-name to column-index
//! mapping; a missing column degrades to an empty field value.

use std::collections::HashMap;

use crate::models::Record;

/// One consumed data line, in stream order
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Record(Record),
    /// Blank or malformed line, consumed but yielding no record
    Skipped,
}

/// Output of feeding one chunk to the parser
#[derive(Debug, Default)]
pub struct ParsedChunk {
    /// Complete data lines in stream order, skipped ones included. The
    /// header line is not counted.
    pub lines: Vec<ParsedLine>,
}

impl ParsedChunk {
    /// Records only, skipped lines filtered out
    pub fn into_records(self) -> Vec<Record> {
        self.lines
            .into_iter()
            .filter_map(|line| match line {
                ParsedLine::Record(record) => Some(record),
                ParsedLine::Skipped => None,
            })
            .collect()
    }
}

/// Stateful chunked parser, scoped to one parse session
pub struct RecordParser {
    carry: Vec<u8>,
    header: Option<HashMap<String, usize>>,
}

impl RecordParser {
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            header: None,
        }
    }

    /// Whether the header row has been captured yet
    pub fn header_seen(&self) -> bool {
        self.header.is_some()
    }

    /// Feed the next chunk of bytes, returning all records completed by it
    pub fn push_chunk(&mut self, chunk: &[u8]) -> ParsedChunk {
        self.carry.extend_from_slice(chunk);

        let mut out = ParsedChunk::default();
        let mut start = 0;

        while let Some(pos) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let line = &self.carry[start..end];
            start = end + 1;

            let line = match line.last() {
                Some(b'\r') => &line[..line.len() - 1],
                _ => line,
            };
            let text = String::from_utf8_lossy(line);

            match &self.header {
                None => {
                    // First complete line is the header row
                    let index = text
                        .split(',')
                        .enumerate()
                        .map(|(i, name)| (name.trim().to_string(), i))
                        .collect();
                    self.header = Some(index);
                }
                Some(header) => {
                    let values: Vec<&str> = text.split(',').collect();
                    // A line splitting into <=1 field is blank or malformed
                    if values.len() > 1 {
                        out.lines.push(ParsedLine::Record(build_record(header, &values)));
                    } else {
                        out.lines.push(ParsedLine::Skipped);
                    }
                }
            }
        }

        self.carry.drain(..start);
        out
    }

    /// End of stream. Any carry-over lacking a trailing line terminator is
    /// dropped; returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.carry.len();
        self.carry.clear();
        discarded
    }
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new()
    }
}

fn column<'a>(header: &HashMap<String, usize>, values: &[&'a str], name: &str) -> &'a str {
    header
        .get(name)
        .and_then(|&i| values.get(i))
        .copied()
        .unwrap_or("")
}

fn build_record(header: &HashMap<String, usize>, values: &[&str]) -> Record {
    Record {
        ip: column(header, values, "ClientIP").to_string(),
        port: column(header, values, "ClientSrcPort").parse().ok(),
        method: column(header, values, "ClientRequestMethod").to_string(),
        uri: column(header, values, "ClientRequestURI").to_string(),
        referer: column(header, values, "ClientRequestReferer").to_string(),
        user_agent: column(header, values, "ClientRequestUserAgent").to_string(),
        country: column(header, values, "ClientCountry").to_string(),
        asn: column(header, values, "ClientASN").to_string(),
        device: column(header, values, "ClientDeviceType").to_string(),
        scheme: column(header, values, "ClientRequestScheme").to_string(),
    }
}
