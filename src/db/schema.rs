//! Database schema definitions

pub const TABLE_NAME: &str = "locations";

// created_at uses millisecond UTC text so it sorts lexically and compares
// against cutoffs formatted with CREATED_AT_FORMAT.
pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    altitude REAL NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL,
    machine_name TEXT NOT NULL,
    user_name TEXT,
    location_source TEXT NOT NULL DEFAULT 'Unknown',
    public_ip TEXT,
    city TEXT,
    country TEXT,
    accuracy REAL,
    speed REAL,
    received_at TEXT NOT NULL,
    server_ip TEXT NOT NULL,
    user_agent TEXT NOT NULL DEFAULT 'Unknown',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
)
"#;

/// chrono format matching the `created_at` column default
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// By-machine lookups
pub const CREATE_INDEX_MACHINE: &str =
    "CREATE INDEX IF NOT EXISTS idx_locations_machine ON locations(machine_name)";

// Date-equality filter on observation time
pub const CREATE_INDEX_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_locations_timestamp ON locations(timestamp)";

// Every "most recent" query orders by this
pub const CREATE_INDEX_CREATED_AT: &str =
    "CREATE INDEX IF NOT EXISTS idx_locations_created_at ON locations(created_at)";

pub const MIGRATIONS: &[&str] = &[
    CREATE_TABLE,
    CREATE_INDEX_MACHINE,
    CREATE_INDEX_TIMESTAMP,
    CREATE_INDEX_CREATED_AT,
];
