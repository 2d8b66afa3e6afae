use electra_types::PollDuration;
use electra_types::models::{
    Candidate, CandidateId, Poll, PollId, PollStatus, TallyEntry, User, UserId, Vote, VoteId,
};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::Database;
use crate::error::{Result, StoreError, is_unique_violation};
use crate::models::{
    CANDIDATE_COLUMNS, POLL_COLUMNS, USER_COLUMNS, UserRow, VOTE_COLUMNS, candidate_from_row,
    poll_from_row, vote_from_row,
};

impl Database {
    // -- Users --

    /// Register a user. The password is hashed before the lock is taken.
    pub fn insert_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserId> {
        let password_hash = electra_crypto::hash_password(password)?;
        let now = self.now_ms();

        let id = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO users (first_name, last_name, email, password_hash, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![first_name, last_name, email, password_hash, now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Err(StoreError::DuplicateEmail),
                Err(e) => return Err(e.into()),
            }
            let id = UserId(tx.last_insert_rowid());
            tx.commit()?;
            Ok(id)
        });

        match &id {
            Ok(id) => info!("User {} registered", id),
            Err(StoreError::DuplicateEmail) => warn!("Signup rejected: email already registered"),
            Err(_) => {}
        }
        id
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = self.with_conn(|conn| query_user_row(conn, email))?;
        Ok(row.map(User::from))
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    [id.0],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row.map(User::from))
        })
    }

    /// True only if `email` exists and `password` matches its stored hash.
    pub fn get_user_by_email_and_password(&self, email: &str, password: &str) -> Result<bool> {
        Ok(self.authenticate(email, password)?.is_some())
    }

    /// Login: the matching user, or `None` for an unknown email or wrong password.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        // Verify outside the lock; argon2 is deliberately slow
        let Some(row) = self.with_conn(|conn| query_user_row(conn, email))? else {
            debug!("Login failed: unknown email");
            return Ok(None);
        };

        if electra_crypto::verify_password(password, &row.password_hash)? {
            debug!("User {} authenticated", row.id);
            Ok(Some(row.into()))
        } else {
            debug!("Login failed: wrong password for user {}", row.id);
            Ok(None)
        }
    }

    // -- Polls --

    /// Create a poll ending `duration` from now. The end time is never recomputed.
    pub fn insert_poll(&self, voting_code: &str, duration: PollDuration) -> Result<PollId> {
        if voting_code.is_empty() || !voting_code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StoreError::InvalidVotingCode(voting_code.to_string()));
        }

        let now = self.now_ms();
        let end_time_ms = now + duration.as_millis();

        let id = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO polls (voting_code, duration_label, end_time_ms, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![voting_code, duration.label(), end_time_ms, now],
            )?;
            let id = PollId(tx.last_insert_rowid());
            tx.commit()?;
            Ok(id)
        })?;

        info!("Poll {} created ({}, ends at {})", id, duration, end_time_ms);
        Ok(id)
    }

    /// Same as [`Database::insert_poll`], taking the duration as its label.
    /// Unknown labels are rejected rather than treated as zero length.
    pub fn insert_poll_with_label(
        &self,
        voting_code: &str,
        duration_label: &str,
    ) -> Result<PollId> {
        let duration: PollDuration = duration_label.parse()?;
        self.insert_poll(voting_code, duration)
    }

    pub fn get_poll(&self, poll_id: PollId) -> Result<Option<Poll>> {
        self.with_conn(|conn| query_poll(conn, poll_id))
    }

    /// The most recently created poll carrying `voting_code`, if any.
    pub fn find_poll_by_code(&self, voting_code: &str) -> Result<Option<Poll>> {
        self.with_conn(|conn| {
            let poll = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM polls WHERE voting_code = ?1 ORDER BY poll_id DESC LIMIT 1",
                        POLL_COLUMNS
                    ),
                    [voting_code],
                    poll_from_row,
                )
                .optional()?;
            Ok(poll)
        })
    }

    /// Newest first.
    pub fn list_polls(&self) -> Result<Vec<Poll>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM polls ORDER BY poll_id DESC", POLL_COLUMNS))?;
            let polls = stmt
                .query_map([], poll_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(polls)
        })
    }

    pub fn get_poll_end_time(&self, poll_id: PollId) -> Result<Option<i64>> {
        self.with_conn(|conn| query_end_time(conn, poll_id))
    }

    // Expiry checks read the clock under the connection lock.

    /// `false` for unknown polls.
    pub fn is_poll_active(&self, poll_id: PollId) -> Result<bool> {
        self.with_conn(|conn| {
            let now = self.now_ms();
            let end_time = query_end_time(conn, poll_id)?;
            Ok(end_time.is_some_and(|end| now < end))
        })
    }

    pub fn poll_status(&self, poll_id: PollId) -> Result<Option<PollStatus>> {
        self.with_conn(|conn| {
            let now = self.now_ms();
            Ok(query_poll(conn, poll_id)?.map(|p| p.status_at(now)))
        })
    }

    /// Milliseconds left before the poll closes, zero once expired.
    pub fn remaining_millis(&self, poll_id: PollId) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let now = self.now_ms();
            Ok(query_poll(conn, poll_id)?.map(|p| p.remaining_ms_at(now)))
        })
    }

    // -- Candidates --

    /// Add a candidate to an existing poll.
    pub fn insert_candidate(
        &self,
        name: &str,
        position: &str,
        manifesto: &str,
        poll_id: PollId,
    ) -> Result<CandidateId> {
        let id = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_end_time(&tx, poll_id)?.is_none() {
                return Err(StoreError::PollNotFound(poll_id));
            }

            tx.execute(
                "INSERT INTO candidates (name, position, manifesto, poll_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, position, manifesto, poll_id.0],
            )?;
            let id = CandidateId(tx.last_insert_rowid());
            tx.commit()?;
            Ok(id)
        });

        match &id {
            Ok(id) => info!("Candidate {} added to poll {}", id, poll_id),
            Err(e) => warn!("Candidate insert rejected: {}", e),
        }
        id
    }

    /// Ordered by insertion.
    pub fn list_candidates(&self, poll_id: PollId) -> Result<Vec<Candidate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM candidates WHERE poll_id = ?1 ORDER BY id",
                CANDIDATE_COLUMNS
            ))?;
            let candidates = stmt
                .query_map([poll_id.0], candidate_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(candidates)
        })
    }

    // -- Votes --

    /// Record `voter_id`'s ballot for `candidate_id` while the poll is open.
    pub fn cast_vote(
        &self,
        poll_id: PollId,
        candidate_id: CandidateId,
        voter_id: UserId,
    ) -> Result<VoteId> {
        let id = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = self.now_ms();

            let end_time = query_end_time(&tx, poll_id)?
                .ok_or(StoreError::PollNotFound(poll_id))?;
            if now >= end_time {
                return Err(StoreError::PollClosed(poll_id));
            }

            let owner: Option<i64> = tx
                .query_row(
                    "SELECT poll_id FROM candidates WHERE id = ?1",
                    [candidate_id.0],
                    |r| r.get(0),
                )
                .optional()?;
            if owner != Some(poll_id.0) {
                return Err(StoreError::CandidateNotInPoll {
                    poll: poll_id,
                    candidate: candidate_id,
                });
            }

            let voter_exists = tx
                .query_row("SELECT 1 FROM users WHERE id = ?1", [voter_id.0], |_| Ok(()))
                .optional()?
                .is_some();
            if !voter_exists {
                return Err(StoreError::UserNotFound(voter_id));
            }

            let inserted = tx.execute(
                "INSERT INTO votes (poll_id, candidate_id, voter_id, cast_at_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![poll_id.0, candidate_id.0, voter_id.0, now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(StoreError::AlreadyVoted {
                        poll: poll_id,
                        voter: voter_id,
                    });
                }
                Err(e) => return Err(e.into()),
            }
            let id = VoteId(tx.last_insert_rowid());
            tx.commit()?;
            Ok(id)
        });

        match &id {
            Ok(id) => info!("Vote {} cast in poll {}", id, poll_id),
            Err(e) => warn!("Vote rejected: {}", e),
        }
        id
    }

    pub fn has_voted(&self, poll_id: PollId, voter_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM votes WHERE poll_id = ?1 AND voter_id = ?2",
                    [poll_id.0, voter_id.0],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn list_votes(&self, poll_id: PollId) -> Result<Vec<Vote>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM votes WHERE poll_id = ?1 ORDER BY id",
                VOTE_COLUMNS
            ))?;
            let votes = stmt
                .query_map([poll_id.0], vote_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(votes)
        })
    }

    /// Votes per candidate, most first. Candidates with no votes are included.
    pub fn tally(&self, poll_id: PollId) -> Result<Vec<TallyEntry>> {
        self.with_conn(|conn| {
            // LEFT JOIN keeps zero-vote candidates in the results
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.position, COUNT(v.id) AS votes
                 FROM candidates c
                 LEFT JOIN votes v ON v.candidate_id = c.id
                 WHERE c.poll_id = ?1
                 GROUP BY c.id
                 ORDER BY votes DESC, c.id",
            )?;

            let entries = stmt
                .query_map([poll_id.0], |row| {
                    Ok(TallyEntry {
                        candidate_id: CandidateId(row.get(0)?),
                        name: row.get(1)?,
                        position: row.get(2)?,
                        votes: row.get::<_, i64>(3)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(entries)
        })
    }
}

fn query_user_row(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            [email],
            UserRow::from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_poll(conn: &Connection, poll_id: PollId) -> Result<Option<Poll>> {
    let poll = conn
        .query_row(
            &format!("SELECT {} FROM polls WHERE poll_id = ?1", POLL_COLUMNS),
            [poll_id.0],
            poll_from_row,
        )
        .optional()?;
    Ok(poll)
}

fn query_end_time(conn: &Connection, poll_id: PollId) -> Result<Option<i64>> {
    let end_time = conn
        .query_row(
            "SELECT end_time_ms FROM polls WHERE poll_id = ?1",
            [poll_id.0],
            |r| r.get(0),
        )
        .optional()?;
    Ok(end_time)
}
