//! Operation identifiers.
//!
//! An [`OpId`] names one atomic edit and doubles as the tie-break key that
//! orders concurrent sibling branches. Ids compare by sequence number first,
//! so an id issued with a Lamport sequence (one more than the largest sequence
//! in its causal past) always sorts after the ids of its ancestors.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier of an edit operation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OpId {
    /// Logical clock value at the issuing replica.
    pub seq: u64,
    /// The replica (agent) that issued the operation.
    pub agent: String,
}

impl OpId {
    pub fn new(seq: u64, agent: impl Into<String>) -> Self {
        Self {
            seq,
            agent: agent.into(),
        }
    }

    /// The conventional base id that settled operations are folded into.
    pub fn genesis() -> Self {
        Self {
            seq: 0,
            agent: String::new(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.seq == 0 && self.agent.is_empty()
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.agent.cmp(&other.agent))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.seq, self.agent)
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({}@{})", self.seq, self.agent)
    }
}

/// Failure to parse an [`OpId`] from its `seq@agent` form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid operation id {0:?}, expected `seq@agent`")]
pub struct ParseOpIdError(String);

impl FromStr for OpId {
    type Err = ParseOpIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (seq, agent) = s
            .split_once('@')
            .ok_or_else(|| ParseOpIdError(s.to_string()))?;
        let seq = seq.parse().map_err(|_| ParseOpIdError(s.to_string()))?;
        Ok(OpId::new(seq, agent))
    }
}

// Serialized as the `seq@agent` string so ids can key JSON maps.
impl Serialize for OpId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OpId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
