//! SQL schema for the Kratia SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS` / `OR IGNORE`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS members (
    member_id         TEXT PRIMARY KEY,
    username          TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    karma             INTEGER NOT NULL DEFAULT 0 CHECK (karma >= 0),
    status            TEXT NOT NULL,
    can_vote          INTEGER NOT NULL DEFAULT 0,
    sanction_end_date TEXT,
    role              TEXT NOT NULL,
    is_quarantined    INTEGER NOT NULL DEFAULT 0,
    total_posts       INTEGER NOT NULL DEFAULT 0,
    total_threads     INTEGER NOT NULL DEFAULT 0,
    CHECK (status != 'sanctioned' OR sanction_end_date IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS categories (
    category_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS forums (
    forum_id     TEXT PRIMARY KEY,
    category_id  TEXT NOT NULL REFERENCES categories(category_id),
    name         TEXT NOT NULL,
    description  TEXT NOT NULL,
    is_public    INTEGER NOT NULL,
    thread_count INTEGER NOT NULL DEFAULT 0,
    post_count   INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS threads (
    thread_id           TEXT PRIMARY KEY,
    forum_id            TEXT NOT NULL REFERENCES forums(forum_id),
    author_id           TEXT NOT NULL,
    title               TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    last_reply_at       TEXT NOT NULL,
    reply_count         INTEGER NOT NULL DEFAULT 0,
    is_locked           INTEGER NOT NULL DEFAULT 0,
    is_sticky           INTEGER NOT NULL DEFAULT 0,
    related_votation_id TEXT
);

CREATE TABLE IF NOT EXISTS posts (
    post_id    TEXT PRIMARY KEY,
    thread_id  TEXT NOT NULL REFERENCES threads(thread_id),
    author_id  TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Tally columns are only written by vote transactions; status and outcome
-- only by closure, and only while status is still 'active'.
CREATE TABLE IF NOT EXISTS votations (
    votation_id       TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    description       TEXT NOT NULL,
    proposer_id       TEXT NOT NULL,
    proposer_username TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    deadline          TEXT NOT NULL,   -- fixed-width RFC 3339, sortable
    status            TEXT NOT NULL,
    votation_type     TEXT NOT NULL,   -- discriminant of Proposal variant
    payload_json      TEXT NOT NULL,   -- JSON payload (inner data only)
    votes_for         INTEGER NOT NULL DEFAULT 0,
    votes_against     INTEGER NOT NULL DEFAULT 0,
    votes_abstain     INTEGER NOT NULL DEFAULT 0,
    total_votes_cast  INTEGER NOT NULL DEFAULT 0,
    quorum_required   INTEGER NOT NULL CHECK (quorum_required > 0),
    related_thread_id TEXT NOT NULL,
    outcome           TEXT,
    CHECK (total_votes_cast = votes_for + votes_against + votes_abstain)
);

-- One row per (votation, member): the primary key is the one-vote rule.
CREATE TABLE IF NOT EXISTS votes (
    votation_id TEXT NOT NULL REFERENCES votations(votation_id),
    member_id   TEXT NOT NULL,
    choice      TEXT NOT NULL,   -- 'for' | 'against' | 'abstain'
    PRIMARY KEY (votation_id, member_id)
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id TEXT PRIMARY KEY,
    recipient_id    TEXT NOT NULL,
    kind            TEXT NOT NULL,
    payload_json    TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    is_read         INTEGER NOT NULL DEFAULT 0
);

-- Singleton row holding the constitution.
CREATE TABLE IF NOT EXISTS site_settings (
    settings_id       INTEGER PRIMARY KEY CHECK (settings_id = 1),
    constitution_text TEXT NOT NULL,
    last_updated      TEXT
);

INSERT OR IGNORE INTO site_settings (settings_id, constitution_text, last_updated)
VALUES (1, '', NULL);

CREATE INDEX IF NOT EXISTS votations_status_deadline_idx ON votations(status, deadline);
CREATE INDEX IF NOT EXISTS posts_thread_idx              ON posts(thread_id, created_at);
CREATE INDEX IF NOT EXISTS notifications_recipient_idx   ON notifications(recipient_id, created_at);

PRAGMA user_version = 1;
";
