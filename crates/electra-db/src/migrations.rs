use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

/// Schema version this build reads and writes.
pub const CURRENT_VERSION: u32 = 3;

/// Base tables: users, polls, candidates.
const V1_BASE: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name      TEXT NOT NULL,
        last_name       TEXT NOT NULL,
        email           TEXT NOT NULL UNIQUE,
        password_hash   TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS polls (
        poll_id         INTEGER PRIMARY KEY AUTOINCREMENT,
        voting_code     TEXT NOT NULL,
        duration_label  TEXT NOT NULL,
        end_time_ms     INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS candidates (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        position        TEXT NOT NULL,
        manifesto       TEXT NOT NULL,
        poll_id         INTEGER NOT NULL REFERENCES polls(poll_id)
    );

    CREATE INDEX IF NOT EXISTS idx_candidates_poll
        ON candidates(poll_id);
";

/// Creation times, and code lookup for poll verification.
const V2_CREATED_AT: &str = "
    ALTER TABLE users ADD COLUMN created_at_ms INTEGER;
    ALTER TABLE polls ADD COLUMN created_at_ms INTEGER;

    CREATE INDEX IF NOT EXISTS idx_polls_voting_code
        ON polls(voting_code);
";

/// Ballots: one per voter per poll.
const V3_VOTES: &str = "
    CREATE TABLE IF NOT EXISTS votes (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        poll_id         INTEGER NOT NULL REFERENCES polls(poll_id),
        candidate_id    INTEGER NOT NULL REFERENCES candidates(id),
        voter_id        INTEGER NOT NULL REFERENCES users(id),
        cast_at_ms      INTEGER NOT NULL,
        UNIQUE(poll_id, voter_id)
    );

    CREATE INDEX IF NOT EXISTS idx_votes_candidate
        ON votes(candidate_id);
";

/// Ordered, append-only. Never edit a shipped step; add a new one.
const STEPS: [(u32, &str); 3] = [(1, V1_BASE), (2, V2_CREATED_AT), (3, V3_VOTES)];

/// Bring a connection's schema up to `CURRENT_VERSION`.
pub fn run(conn: &mut Connection) -> Result<()> {
    create_schema(conn)?;

    let version = current_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(StoreError::Downgrade {
            from: version,
            to: CURRENT_VERSION,
        });
    }
    upgrade_schema(conn, version, CURRENT_VERSION)?;

    info!("Database migrations complete (schema v{})", CURRENT_VERSION);
    Ok(())
}

/// Create the version table and the base tables. Idempotent.
pub fn create_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;
    apply_step(conn, 1, V1_BASE)
}

/// Apply every step in `(old_version, new_version]`.
///
/// Forward-only: a lower target is refused, and a step already recorded in
/// `schema_version` is skipped, so each transition runs at most once.
/// `old_version` may trail the on-disk version but never lead it; steps are
/// never skipped over.
pub fn upgrade_schema(conn: &mut Connection, old_version: u32, new_version: u32) -> Result<()> {
    if new_version < old_version {
        return Err(StoreError::Downgrade {
            from: old_version,
            to: new_version,
        });
    }
    if new_version > CURRENT_VERSION {
        return Err(StoreError::UnknownSchemaVersion(new_version));
    }

    let on_disk = current_version(conn)?;
    if on_disk < old_version {
        return Err(StoreError::SchemaVersionMismatch {
            expected: old_version,
            found: on_disk,
        });
    }

    for (version, sql) in STEPS {
        if version > old_version && version <= new_version {
            apply_step(conn, version, sql)?;
        }
    }
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

fn apply_step(conn: &mut Connection, version: u32, sql: &str) -> Result<()> {
    let tx = conn.transaction()?;

    let on_disk = current_version(&tx)?;
    if on_disk >= version {
        return Ok(());
    }
    if on_disk + 1 != version {
        return Err(StoreError::SchemaVersionMismatch {
            expected: version - 1,
            found: on_disk,
        });
    }

    info!("Running migration v{}", version);
    tx.execute_batch(sql)?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tx.commit()?;
    Ok(())
}
