pub const SCHEMA: &str = r#"
-- Persons: face identities and scene folders, one storage folder each
CREATE TABLE IF NOT EXISTS persons (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    folder_key TEXT NOT NULL,
    embedding BLOB,               -- float32 array stored as bytes; NULL for scene/manual folders
    embedding_dim INTEGER,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(owner, folder_key)
);

CREATE INDEX IF NOT EXISTS idx_persons_owner ON persons(owner);

-- Photos: one row per uploaded image
CREATE TABLE IF NOT EXISTS photos (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    filename TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_photos_owner ON photos(owner);
CREATE INDEX IF NOT EXISTS idx_photos_owner_filename ON photos(owner, filename);

-- Photo to person membership links
CREATE TABLE IF NOT EXISTS photo_persons (
    photo_id TEXT NOT NULL,
    person_id TEXT NOT NULL,
    PRIMARY KEY (photo_id, person_id),
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
    FOREIGN KEY (person_id) REFERENCES persons(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_photo_persons_person ON photo_persons(person_id);

-- Delivery history: append-only, never updated
CREATE TABLE IF NOT EXISTS delivery_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    person_id TEXT NOT NULL,
    recipient TEXT NOT NULL,
    photo_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,         -- 'sent' or 'failed'
    message TEXT,
    delivered_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_delivery_owner ON delivery_history(owner);
"#;

/// Migrations applied on every startup; failures are ignored because the
/// statements error once the column/index already exists.
pub const MIGRATIONS: &[&str] = &[];
