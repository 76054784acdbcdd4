//! Ledger records and their routing details.
//!
//! Records travel as raw text:
//!
//! ```text
//! <Dummy TX: {payload}, Userset: {origin}, Input Shard: [a b], Input Valid: [1 1], Output Shard: c, Output Valid: v >
//! ```
//!
//! Routing details are parsed on demand; a record that does not parse is
//! malformed and never routed.

use crate::{NodeId, ShardId};
use bincode::{Decode, Encode};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

const DETAILS_PATTERN: &str = r"Input Shard: \[([0-9 ]+)\], Input Valid: \[([0-9 ]+)\], Output Shard: ([0-9]+), Output Valid: ([0-9]+)";

fn details_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DETAILS_PATTERN).expect("record pattern is valid"))
}

/// A raw ledger record.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct Record(String);

/// Routing details parsed out of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDetails {
    pub input_shards: Vec<ShardId>,
    pub input_valid: Vec<u32>,
    pub output_shard: ShardId,
    pub output_valid: u32,
}

/// Where a record is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Every input shard is the output shard.
    Internal,
    /// At least one input shard differs from the output shard.
    CrossShard { output_shard: ShardId },
}

/// Record parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record does not carry routing details")]
    MissingDetails,

    #[error("invalid number {0:?} in record")]
    InvalidNumber(String),

    #[error("record has no input shards")]
    NoInputShards,
}

impl Record {
    /// Wrap raw record text.
    pub fn new(raw: impl Into<String>) -> Self {
        Record(raw.into())
    }

    /// A record whose only input shard is its output shard.
    pub fn internal(payload: &str, origin: NodeId, shard: ShardId) -> Self {
        Record(format!(
            "<Dummy TX: {payload}, Userset: {}, Input Shard: [{}], Input Valid: [1], Output Shard: {}, Output Valid: 2 >",
            origin.0, shard.0, shard.0
        ))
    }

    /// A record consuming inputs on `input_shards` and committing on
    /// `output_shard`.
    pub fn cross_shard(
        payload: &str,
        origin: NodeId,
        input_shards: &[ShardId],
        output_shard: ShardId,
    ) -> Self {
        let shards: Vec<String> = input_shards.iter().map(|s| s.0.to_string()).collect();
        let valid: Vec<&str> = input_shards.iter().map(|_| "1").collect();
        Record(format!(
            "<Dummy TX: {payload}, Userset: {}, Input Shard: [{}], Input Valid: [{}], Output Shard: {}, Output Valid: 0 >",
            origin.0,
            shards.join(" "),
            valid.join(" "),
            output_shard.0
        ))
    }

    /// The raw text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size of the raw text in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the raw text is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse routing details.
    pub fn details(&self) -> Result<RecordDetails, RecordError> {
        let caps = details_regex()
            .captures(&self.0)
            .ok_or(RecordError::MissingDetails)?;

        let input_shards: Vec<ShardId> = parse_list(&caps[1])?.into_iter().map(ShardId).collect();
        if input_shards.is_empty() {
            return Err(RecordError::NoInputShards);
        }

        Ok(RecordDetails {
            input_shards,
            input_valid: parse_list(&caps[2])?,
            output_shard: ShardId(parse_number(&caps[3])?),
            output_valid: parse_number(&caps[4])?,
        })
    }

    /// Classify as internal or cross-shard.
    pub fn classify(&self) -> Result<Classification, RecordError> {
        Ok(self.details()?.classification())
    }
}

impl RecordDetails {
    /// Internal iff every input shard equals the output shard.
    pub fn classification(&self) -> Classification {
        if self.input_shards.iter().all(|s| *s == self.output_shard) {
            Classification::Internal
        } else {
            Classification::CrossShard {
                output_shard: self.output_shard,
            }
        }
    }

    /// Distinct input shards.
    pub fn distinct_input_shards(&self) -> BTreeSet<ShardId> {
        self.input_shards.iter().copied().collect()
    }
}

fn parse_number(s: &str) -> Result<u32, RecordError> {
    s.parse()
        .map_err(|_| RecordError::InvalidNumber(s.to_string()))
}

fn parse_list(s: &str) -> Result<Vec<u32>, RecordError> {
    s.split_whitespace().map(parse_number).collect()
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({:?})", self.0)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Record {
    fn from(raw: String) -> Self {
        Record(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_record() {
        let record = Record::internal("abc", NodeId(5), ShardId(1));

        assert_eq!(
            record.as_str(),
            "<Dummy TX: abc, Userset: 5, Input Shard: [1], Input Valid: [1], Output Shard: 1, Output Valid: 2 >"
        );
        assert_eq!(record.classify(), Ok(Classification::Internal));
    }

    #[test]
    fn test_cross_shard_record() {
        let record = Record::cross_shard("abc", NodeId(0), &[ShardId(0), ShardId(2)], ShardId(1));
        let details = record.details().unwrap();

        assert_eq!(details.input_shards, vec![ShardId(0), ShardId(2)]);
        assert_eq!(details.input_valid, vec![1, 1]);
        assert_eq!(details.output_shard, ShardId(1));
        assert_eq!(details.output_valid, 0);
        assert_eq!(
            record.classify(),
            Ok(Classification::CrossShard {
                output_shard: ShardId(1)
            })
        );
    }

    #[test]
    fn test_multi_input_same_shard_is_internal() {
        let record = Record::new(
            "<Dummy TX: x, Userset: 0, Input Shard: [2 2], Input Valid: [1 1], Output Shard: 2, Output Valid: 0 >",
        );
        assert_eq!(record.classify(), Ok(Classification::Internal));

        let mixed = Record::new(
            "<Dummy TX: x, Userset: 0, Input Shard: [2 3], Input Valid: [1 1], Output Shard: 2, Output Valid: 0 >",
        );
        assert_eq!(
            mixed.classify(),
            Ok(Classification::CrossShard {
                output_shard: ShardId(2)
            })
        );
    }

    #[test]
    fn test_malformed_records() {
        assert_eq!(
            Record::new("<NL Shard 0 Height 1 Claim 2>").details(),
            Err(RecordError::MissingDetails)
        );
        assert_eq!(
            Record::new("Input Shard: [ ], Input Valid: [1], Output Shard: 1, Output Valid: 0").details(),
            Err(RecordError::NoInputShards)
        );
        assert!(matches!(
            Record::new("Input Shard: [1], Input Valid: [1], Output Shard: 99999999999, Output Valid: 0")
                .details(),
            Err(RecordError::InvalidNumber(_))
        ));
    }
}
