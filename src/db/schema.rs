pub const SCHEMA: &str = r#"
-- settings table (key/value, value tagged as plain text or JSON)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT 'text' CHECK (kind IN ('text', 'json')),
    value TEXT
);

-- items table
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    source_id TEXT,
    source_url TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL,
    description TEXT,
    blurb TEXT,
    image_url TEXT,
    embed_html TEXT,
    tags TEXT,
    published_at TEXT,
    featured INTEGER NOT NULL DEFAULT 0,
    visible INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_items_type ON items(type, visible, featured);
CREATE INDEX IF NOT EXISTS idx_items_published_at ON items(published_at DESC);
CREATE UNIQUE INDEX IF NOT EXISTS idx_items_synced_source
    ON items(type, source_url) WHERE type IN ('github', 'youtube', 'substack');

-- subscribers table
CREATE TABLE IF NOT EXISTS subscribers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name TEXT,
    source TEXT,
    tags TEXT NOT NULL DEFAULT '',
    utm_source TEXT,
    utm_medium TEXT,
    utm_campaign TEXT,
    utm_content TEXT,
    utm_term TEXT,
    referer_at_signup TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    last_seen_at TEXT,
    verified_at TEXT,
    unsubscribed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_subscribers_created_at ON subscribers(created_at DESC);

-- campaigns table
CREATE TABLE IF NOT EXISTS campaigns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    subject TEXT NOT NULL,
    html_body TEXT NOT NULL,
    text_body TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    scheduled_for TEXT,
    sent_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- campaign_recipients table
CREATE TABLE IF NOT EXISTS campaign_recipients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id INTEGER NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    subscriber_id INTEGER NOT NULL REFERENCES subscribers(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'queued',
    message_id TEXT,
    error TEXT,
    opened_at TEXT,
    clicked_at TEXT,
    bounced_at TEXT,
    complained_at TEXT,
    unsubscribed_at TEXT,
    last_event_at TEXT,
    UNIQUE(campaign_id, subscriber_id)
);

CREATE INDEX IF NOT EXISTS idx_campaign_recipients_message_id ON campaign_recipients(message_id);

-- giveaways table
CREATE TABLE IF NOT EXISTS giveaways (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    start_date TEXT,
    end_date TEXT,
    rules TEXT,
    winner_subscriber_id INTEGER REFERENCES subscribers(id) ON DELETE SET NULL,
    fulfilled_at TEXT,
    fulfillment_notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- giveaway_entries table
CREATE TABLE IF NOT EXISTS giveaway_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    giveaway_id INTEGER NOT NULL REFERENCES giveaways(id) ON DELETE CASCADE,
    subscriber_id INTEGER NOT NULL REFERENCES subscribers(id) ON DELETE CASCADE,
    source TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(giveaway_id, subscriber_id)
);

-- events table (append-only analytics, IP stored only as an HMAC)
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    path TEXT NOT NULL,
    referer TEXT,
    utm_source TEXT,
    utm_medium TEXT,
    utm_campaign TEXT,
    utm_content TEXT,
    utm_term TEXT,
    fp_id TEXT,
    ip_hash TEXT,
    ua TEXT,
    ts TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts, event);

-- mail_events table (raw provider webhooks)
CREATE TABLE IF NOT EXISTS mail_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT NOT NULL,
    event_type TEXT,
    message_id TEXT,
    email TEXT,
    campaign_id TEXT,
    payload_json TEXT NOT NULL DEFAULT '{}',
    happened_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- summarization_log table (cache in front of the summarizer API)
CREATE TABLE IF NOT EXISTS summarization_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL,
    model TEXT NOT NULL,
    source_hash TEXT NOT NULL,
    summary TEXT NOT NULL,
    prompt_version TEXT NOT NULL,
    tokens_in INTEGER NOT NULL DEFAULT 0,
    tokens_out INTEGER NOT NULL DEFAULT 0,
    cost_cents INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_summarization_log_key ON summarization_log(item_id, model, source_hash);

-- admin_audit table
CREATE TABLE IF NOT EXISTS admin_audit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action TEXT NOT NULL,
    meta_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
