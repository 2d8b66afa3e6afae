use electra_crypto::CryptoError;
use electra_types::UnknownDuration;
use electra_types::models::{CandidateId, PollId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage medium failed. Not retried.
    #[error("storage unavailable: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("email is already registered")]
    DuplicateEmail,

    #[error("poll {0} not found")]
    PollNotFound(PollId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("candidate {candidate} does not stand in poll {poll}")]
    CandidateNotInPoll { poll: PollId, candidate: CandidateId },

    #[error("poll {0} has closed")]
    PollClosed(PollId),

    #[error("user {voter} has already voted in poll {poll}")]
    AlreadyVoted { poll: PollId, voter: UserId },

    #[error(transparent)]
    InvalidDuration(#[from] UnknownDuration),

    #[error("voting code must be a non-empty string of digits, got {0:?}")]
    InvalidVotingCode(String),

    #[error("schema downgrade from v{from} to v{to} is not supported")]
    Downgrade { from: u32, to: u32 },

    #[error("schema is at v{found}, expected v{expected}")]
    SchemaVersionMismatch { expected: u32, found: u32 },

    #[error("unknown schema version v{0}")]
    UnknownSchemaVersion(u32),

    #[error(transparent)]
    Password(#[from] CryptoError),

    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
