//! SQLite schema.
//!
//! The uniqueness constraints here are the real idempotence guards:
//! - `call_sessions(tenant_id, recording_id)`: a recording is processed once
//! - `wrapup_drafts(call_id)`: one review item per call
//! - `tickets(draft_id)`: one ticket per draft
//! - `retry_queue(idempotency_key)`: one retry entry per failed request

pub const SCHEMA: &str = r#"
-- ============================================
-- POLLER STATE
-- ============================================

CREATE TABLE IF NOT EXISTS poll_cursors (
    tenant_id TEXT PRIMARY KEY,
    last_recording_id INTEGER NOT NULL DEFAULT 0,
    last_poll_at TEXT,
    consecutive_errors INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    processing_started_at TEXT                -- NULL = unlocked
);

-- ============================================
-- DIRECTORY
-- ============================================

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    extension TEXT
);

CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    crm_id TEXT NOT NULL,
    name TEXT,
    phone TEXT,
    phone_digits TEXT,                        -- last 10 digits
    email TEXT,
    UNIQUE(tenant_id, crm_id)
);

-- ============================================
-- CALLS
-- ============================================

CREATE TABLE IF NOT EXISTS call_sessions (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    direction TEXT NOT NULL,                  -- 'inbound' | 'outbound'
    from_number TEXT NOT NULL,
    to_number TEXT NOT NULL,
    from_digits TEXT NOT NULL,
    to_digits TEXT NOT NULL,
    extension TEXT,
    agent_id TEXT,
    customer_id TEXT,                         -- CRM customer id
    recording_id INTEGER,
    status TEXT NOT NULL,                     -- 'ringing' | 'in_progress' | 'completed' | 'missed'
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_secs INTEGER,
    transcript TEXT,
    summary TEXT,
    sentiment TEXT,
    entities TEXT,                            -- JSON
    crm_note_id TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(tenant_id, recording_id)
);

-- ============================================
-- REVIEW QUEUE
-- ============================================

CREATE TABLE IF NOT EXISTS wrapup_drafts (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    call_id TEXT NOT NULL UNIQUE,
    direction TEXT NOT NULL,
    status TEXT NOT NULL,                     -- 'pending_review' | 'completed'
    match_status TEXT NOT NULL,               -- 'matched' | 'multiple_matches' | 'unmatched'
    auto_voided INTEGER NOT NULL DEFAULT 0,
    void_reason TEXT,
    customer_name TEXT,
    customer_phone TEXT,
    customer_email TEXT,
    summary TEXT,
    request_type TEXT,
    crm_customer_id TEXT,
    completion_action TEXT,                   -- 'ticket' | 'note' | 'skipped'
    completion_reason TEXT,
    crm_ticket_id TEXT,
    crm_note_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    FOREIGN KEY(call_id) REFERENCES call_sessions(id)
);

CREATE TABLE IF NOT EXISTS match_suggestions (
    id INTEGER PRIMARY KEY,
    draft_id TEXT NOT NULL,
    crm_customer_id TEXT NOT NULL,
    name TEXT,
    phone TEXT,
    confidence REAL NOT NULL,
    UNIQUE(draft_id, crm_customer_id),
    FOREIGN KEY(draft_id) REFERENCES wrapup_drafts(id) ON DELETE CASCADE
);

-- ============================================
-- DOWNSTREAM
-- ============================================

CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    draft_id TEXT NOT NULL UNIQUE,
    call_id TEXT NOT NULL,
    crm_customer_id TEXT NOT NULL,
    crm_ticket_id TEXT NOT NULL,
    subject TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY(draft_id) REFERENCES wrapup_drafts(id)
);

CREATE TABLE IF NOT EXISTS retry_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    operation TEXT NOT NULL,                  -- 'create_ticket' | 'add_note'
    target_service TEXT NOT NULL,
    payload TEXT NOT NULL,                    -- JSON
    draft_id TEXT,
    call_id TEXT,
    last_error TEXT NOT NULL,
    idempotency_key TEXT NOT NULL UNIQUE,
    attempts INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ============================================
-- AFTER-HOURS MERGES
-- ============================================

CREATE TABLE IF NOT EXISTS pending_merges (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    phone_digits TEXT NOT NULL,
    source TEXT NOT NULL,                     -- 'email' | 'voicemail'
    payload TEXT NOT NULL,                    -- JSON
    status TEXT NOT NULL,                     -- 'awaiting_pair' | 'matched' | 'expired'
    matched_with TEXT,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_agents_extension ON agents(tenant_id, extension);
CREATE INDEX IF NOT EXISTS idx_customers_phone ON customers(tenant_id, phone_digits);
CREATE INDEX IF NOT EXISTS idx_calls_from ON call_sessions(tenant_id, from_digits, started_at);
CREATE INDEX IF NOT EXISTS idx_calls_to ON call_sessions(tenant_id, to_digits, started_at);
CREATE INDEX IF NOT EXISTS idx_calls_extension ON call_sessions(tenant_id, extension, started_at);
CREATE INDEX IF NOT EXISTS idx_calls_active ON call_sessions(status, started_at) WHERE duration_secs IS NULL;
CREATE INDEX IF NOT EXISTS idx_drafts_status ON wrapup_drafts(tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_tickets_customer ON tickets(tenant_id, crm_customer_id, created_at);
CREATE INDEX IF NOT EXISTS idx_retry_status ON retry_queue(tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_merges_awaiting ON pending_merges(tenant_id, phone_digits, status);
"#;
