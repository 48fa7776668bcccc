pub const SCHEMA: &str = r#"
-- Clinical sites receiving kits
CREATE TABLE IF NOT EXISTS site (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_code TEXT NOT NULL UNIQUE,
    site_name TEXT NOT NULL,
    address_line1 TEXT,
    address_line2 TEXT,
    city TEXT,
    state TEXT,
    postal_code TEXT,
    country TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS site_contact (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES site(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    role TEXT,
    email TEXT,
    phone TEXT,
    room_number TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS kit_type (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    default_expiry_days INTEGER,

    -- Expected packed weight and tolerated deviation, for intake checks
    standard_weight REAL,
    weight_variance REAL,

    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS shipment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER REFERENCES site(id),  -- NULL until a destination is set
    shipped_at TEXT,
    expected_arrival TEXT,
    carrier TEXT,
    tracking_number TEXT,
    status TEXT
);

CREATE TABLE IF NOT EXISTS labkit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    barcode TEXT NOT NULL UNIQUE,
    kit_type_id INTEGER NOT NULL REFERENCES kit_type(id),
    site_id INTEGER REFERENCES site(id),          -- NULL = central depot
    shipment_id INTEGER REFERENCES shipment(id),  -- NULL = unassigned
    lot_number TEXT,
    measured_weight REAL,
    expiry_date TEXT,
    status TEXT NOT NULL DEFAULT 'planned',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Append-only status transition trail
CREATE TABLE IF NOT EXISTS labkit_status_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    labkit_id INTEGER NOT NULL REFERENCES labkit(id),
    old_status TEXT,
    new_status TEXT NOT NULL,
    event_time TEXT NOT NULL
);

-- Append-only free-form event trail (created/note/shipment changes/...)
CREATE TABLE IF NOT EXISTS labkit_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    labkit_id INTEGER NOT NULL REFERENCES labkit(id),
    event_type TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    created_by TEXT
);

-- Cross-entity change log. entity_id is a weak reference: rows survive the
-- deletion of the entity they describe and are never edited or deleted.
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    user TEXT,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    field_name TEXT,
    old_value TEXT,
    new_value TEXT,
    description TEXT
);

CREATE TABLE IF NOT EXISTS app_user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL
);

-- Bearer tokens; admin tokens have no user binding
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,
    token_lookup TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    user_id INTEGER REFERENCES app_user(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,
    last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_site_contact_site ON site_contact(site_id);
CREATE INDEX IF NOT EXISTS idx_labkit_type ON labkit(kit_type_id);
CREATE INDEX IF NOT EXISTS idx_labkit_site ON labkit(site_id);
CREATE INDEX IF NOT EXISTS idx_labkit_shipment ON labkit(shipment_id);
CREATE INDEX IF NOT EXISTS idx_status_event_labkit ON labkit_status_event(labkit_id);
CREATE INDEX IF NOT EXISTS idx_labkit_event_labkit ON labkit_event(labkit_id);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
"#;
