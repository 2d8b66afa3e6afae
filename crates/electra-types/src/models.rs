use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PollDuration;

macro_rules! row_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(UserId);
row_id!(PollId);
row_id!(CandidateId);
row_id!(VoteId);

/// A registered account. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// `None` for accounts created before creation times were recorded.
    pub created_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub voting_code: String,
    pub duration: PollDuration,
    pub end_time_ms: i64,
    pub created_at_ms: Option<i64>,
}

impl Poll {
    /// Active strictly before the end time; expired from the end time onward.
    pub fn status_at(&self, now_ms: i64) -> PollStatus {
        if now_ms < self.end_time_ms {
            PollStatus::Active
        } else {
            PollStatus::Expired
        }
    }

    pub fn remaining_ms_at(&self, now_ms: i64) -> i64 {
        (self.end_time_ms - now_ms).max(0)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.end_time_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Active,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub position: String,
    pub manifesto: String,
    pub poll_id: PollId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub poll_id: PollId,
    pub candidate_id: CandidateId,
    pub voter_id: UserId,
    pub cast_at_ms: i64,
}

/// One line of a poll's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    pub candidate_id: CandidateId,
    pub name: String,
    pub position: String,
    pub votes: u64,
}
