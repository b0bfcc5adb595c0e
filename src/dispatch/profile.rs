//! Randomised delay profiles, one per kind of outbound action.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Kind of outbound action, used to pick its delay range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Forwarding a request to a destination.
    Forward,
    /// Delivering a document to a requester.
    Document,
    /// Posting a reaction.
    React,
    /// Broadcast notice to requesters.
    Notice,
    /// Quoted reply.
    Reply,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Document => "document",
            Self::React => "react",
            Self::Notice => "notice",
            Self::Reply => "reply",
        }
    }
}

/// Inclusive millisecond range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Draw a delay uniformly from the range.
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if hi == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// Per-action-type delay ranges plus the settle delay between tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayProfile {
    pub forward: DelayRange,
    pub document: DelayRange,
    pub react: DelayRange,
    pub notice: DelayRange,
    pub reply: DelayRange,
    /// Waited after every task, success or not.
    pub settle: DelayRange,
}

impl Default for DelayProfile {
    fn default() -> Self {
        Self {
            forward: DelayRange::new(100, 500),
            document: DelayRange::new(100, 500),
            react: DelayRange::new(50, 150),
            notice: DelayRange::new(300, 600),
            reply: DelayRange::new(100, 300),
            settle: DelayRange::new(10, 50),
        }
    }
}

impl DelayProfile {
    /// All delays zero.
    pub fn immediate() -> Self {
        let zero = DelayRange::new(0, 0);
        Self {
            forward: zero,
            document: zero,
            react: zero,
            notice: zero,
            reply: zero,
            settle: zero,
        }
    }

    pub fn range_for(&self, kind: ActionKind) -> DelayRange {
        match kind {
            ActionKind::Forward => self.forward,
            ActionKind::Document => self.document,
            ActionKind::React => self.react,
            ActionKind::Notice => self.notice,
            ActionKind::Reply => self.reply,
        }
    }
}
