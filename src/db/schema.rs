pub const SCHEMA: &str = r#"
-- articles table (one row per canonical link)
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL UNIQUE,
    pub_date TEXT NOT NULL,
    source TEXT NOT NULL,
    category TEXT NOT NULL,
    image_url TEXT,
    content TEXT,
    is_featured INTEGER NOT NULL DEFAULT 0,
    severity TEXT NOT NULL DEFAULT 'medium',
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_articles_link ON articles(link);
CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category);
CREATE INDEX IF NOT EXISTS idx_articles_pub_date ON articles(pub_date DESC);
CREATE INDEX IF NOT EXISTS idx_articles_is_featured ON articles(is_featured);

-- feed_health table (one row per feed URL, updated on every fetch attempt)
CREATE TABLE IF NOT EXISTS feed_health (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_url TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    last_fetched TEXT NOT NULL,
    last_success TEXT,
    last_error TEXT,
    error_count INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1
);

-- image_cache table (resolved image per article fingerprint)
CREATE TABLE IF NOT EXISTS image_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_hash TEXT NOT NULL UNIQUE,
    image_url TEXT NOT NULL,
    source TEXT NOT NULL,
    last_validated TEXT NOT NULL,
    usage_count INTEGER NOT NULL DEFAULT 1
);

-- execution_log table (append-only, one row per job run)
CREATE TABLE IF NOT EXISTS execution_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_name TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    items_processed INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_execution_log_job_name ON execution_log(job_name);

-- category_stats table (hourly aggregate refresh)
CREATE TABLE IF NOT EXISTS category_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL UNIQUE,
    daily_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL
);
"#;
