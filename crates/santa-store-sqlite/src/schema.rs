//! SQL schema for the Santa SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sessions (
    session_id            TEXT PRIMARY KEY,
    invite_code           TEXT NOT NULL UNIQUE,
    name                  TEXT NOT NULL,
    creator_id            TEXT NOT NULL,
    plan                  TEXT NOT NULL,   -- 'FREE' | 'GROUP' | 'BUSINESS'
    status                TEXT NOT NULL,   -- 'pending_payment' | 'open' | 'locked' | 'completed' | 'archived'
    registration_deadline TEXT NOT NULL,   -- local wall-clock time in `timezone`
    gift_exchange_date    TEXT NOT NULL,   -- local wall-clock time in `timezone`
    timezone              TEXT NOT NULL,   -- IANA name
    budget                REAL,
    payment_reference     TEXT,
    assigned_at           TEXT,            -- RFC 3339 UTC; set once by the draw
    completed_at          TEXT,
    created_at            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sessions_by_creator ON sessions (creator_id);
CREATE INDEX IF NOT EXISTS sessions_by_status  ON sessions (status);

CREATE TABLE IF NOT EXISTS participants (
    participant_id TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    name           TEXT NOT NULL,
    email          TEXT NOT NULL,   -- trimmed, lowercased
    preferences    TEXT,            -- JSON or NULL
    assigned_to    TEXT,            -- participant_id in the same session
    joined_at      TEXT NOT NULL,
    UNIQUE (session_id, email)
);

CREATE INDEX IF NOT EXISTS participants_by_session ON participants (session_id);
";
