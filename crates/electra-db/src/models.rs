//! Row mapping between SQLite and the electra-types models.
//! The password hash only ever lives in `UserRow`.

use electra_types::PollDuration;
use electra_types::models::{Candidate, CandidateId, Poll, PollId, User, UserId, Vote, VoteId};
use rusqlite::Row;
use rusqlite::types::Type;

pub(crate) const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, created_at_ms";
pub(crate) const POLL_COLUMNS: &str =
    "poll_id, voting_code, duration_label, end_time_ms, created_at_ms";
pub(crate) const CANDIDATE_COLUMNS: &str = "id, name, position, manifesto, poll_id";
pub(crate) const VOTE_COLUMNS: &str = "id, poll_id, candidate_id, voter_id, cast_at_ms";

pub(crate) struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at_ms: Option<i64>,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            password_hash: row.get(4)?,
            created_at_ms: row.get(5)?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            created_at_ms: row.created_at_ms,
        }
    }
}

pub(crate) fn poll_from_row(row: &Row<'_>) -> rusqlite::Result<Poll> {
    let label: String = row.get(2)?;
    let duration: PollDuration = label
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Poll {
        id: PollId(row.get(0)?),
        voting_code: row.get(1)?,
        duration,
        end_time_ms: row.get(3)?,
        created_at_ms: row.get(4)?,
    })
}

pub(crate) fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        id: CandidateId(row.get(0)?),
        name: row.get(1)?,
        position: row.get(2)?,
        manifesto: row.get(3)?,
        poll_id: PollId(row.get(4)?),
    })
}

pub(crate) fn vote_from_row(row: &Row<'_>) -> rusqlite::Result<Vote> {
    Ok(Vote {
        id: VoteId(row.get(0)?),
        poll_id: PollId(row.get(1)?),
        candidate_id: CandidateId(row.get(2)?),
        voter_id: UserId(row.get(3)?),
        cast_at_ms: row.get(4)?,
    })
}
