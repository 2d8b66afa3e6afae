use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// How long a poll accepts votes after it is created.
///
/// Persisted and serialized as its human-readable label ("30 minutes", ...),
/// which is what the poll setup screen offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PollDuration {
    ThirtyMinutes,
    TwoHours,
    SixHours,
    TwentyFourHours,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown poll duration: {0:?}")]
pub struct UnknownDuration(pub String);

impl PollDuration {
    pub const ALL: [PollDuration; 4] = [
        PollDuration::ThirtyMinutes,
        PollDuration::TwoHours,
        PollDuration::SixHours,
        PollDuration::TwentyFourHours,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PollDuration::ThirtyMinutes => "30 minutes",
            PollDuration::TwoHours => "2 hours",
            PollDuration::SixHours => "6 hours",
            PollDuration::TwentyFourHours => "24 hours",
        }
    }

    pub fn as_millis(self) -> i64 {
        match self {
            PollDuration::ThirtyMinutes => 30 * MINUTE_MS,
            PollDuration::TwoHours => 2 * HOUR_MS,
            PollDuration::SixHours => 6 * HOUR_MS,
            PollDuration::TwentyFourHours => 24 * HOUR_MS,
        }
    }
}

impl fmt::Display for PollDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PollDuration {
    type Err = UnknownDuration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PollDuration::ALL
            .into_iter()
            .find(|d| d.label() == s)
            .ok_or_else(|| UnknownDuration(s.to_string()))
    }
}

impl TryFrom<String> for PollDuration {
    type Error = UnknownDuration;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PollDuration> for String {
    fn from(value: PollDuration) -> Self {
        value.label().to_string()
    }
}
