//! Database module

mod schema;
mod stats;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::DatabaseConfig;

pub use schema::TABLE_NAME;

/// One stored location report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationRecord {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timestamp: String,
    pub machine_name: String,
    pub user_name: Option<String>,
    pub location_source: String,
    pub public_ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub received_at: String,
    pub server_ip: String,
    pub user_agent: String,
    pub created_at: String,
}

/// A validated report ready to insert; `id` and `created_at` come from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timestamp: String,
    pub machine_name: String,
    pub user_name: Option<String>,
    pub location_source: String,
    pub public_ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub received_at: String,
    pub server_ip: String,
    pub user_agent: String,
}

/// Which read path a `/api/locations` request takes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationFilter {
    Machine(String),
    Date(String),
    All { offset: i64 },
}

impl LocationFilter {
    /// Machine beats date, date beats plain pagination. Empty values count as absent.
    pub fn select(machine: Option<&str>, date: Option<&str>, offset: i64) -> Self {
        match (
            machine.filter(|m| !m.is_empty()),
            date.filter(|d| !d.is_empty()),
        ) {
            (Some(machine), _) => Self::Machine(machine.to_string()),
            (None, Some(date)) => Self::Date(date.to_string()),
            (None, None) => Self::All { offset },
        }
    }
}

/// Per-machine roster entry
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MachineEntry {
    pub name: String,
    pub count: i64,
    pub first_seen: String,
    pub last_seen: String,
}

const SELECT_LOCATION: &str = r#"
    SELECT id, latitude, longitude, altitude, timestamp, machine_name, user_name,
           location_source, public_ip, city, country, accuracy, speed,
           received_at, server_ip, user_agent, created_at
    FROM locations
"#;

/// Lower bound on `created_at` for "the last `hours` hours", formatted like the column.
pub fn created_since(hours: i64) -> String {
    Duration::try_hours(hours.max(0))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .map(|cutoff| cutoff.format(schema::CREATED_AT_FORMAT).to_string())
        // Window reaches past the representable range: no lower bound
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        Self::open(Path::new(&config.path), config.max_connections).await
    }

    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        for statement in schema::MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Close every pooled connection, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database closed");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn insert_location(&self, location: &NewLocation) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO locations (latitude, longitude, altitude, timestamp, machine_name, user_name,
                                   location_source, public_ip, city, country, accuracy, speed,
                                   received_at, server_ip, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.altitude)
        .bind(&location.timestamp)
        .bind(&location.machine_name)
        .bind(&location.user_name)
        .bind(&location.location_source)
        .bind(&location.public_ip)
        .bind(&location.city)
        .bind(&location.country)
        .bind(location.accuracy)
        .bind(location.speed)
        .bind(&location.received_at)
        .bind(&location.server_ip)
        .bind(&location.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Newest-first records for one of the three `/api/locations` read paths.
    pub async fn find_locations(&self, filter: &LocationFilter, limit: i64) -> Result<Vec<LocationRecord>> {
        let rows = match filter {
            LocationFilter::Machine(machine) => {
                sqlx::query_as::<_, LocationRecord>(&format!(
                    "{SELECT_LOCATION} WHERE machine_name = ? ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(machine)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            LocationFilter::Date(date) => {
                sqlx::query_as::<_, LocationRecord>(&format!(
                    "{SELECT_LOCATION} WHERE DATE(timestamp) = ? ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(date)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            LocationFilter::All { offset } => {
                sqlx::query_as::<_, LocationRecord>(&format!(
                    "{SELECT_LOCATION} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Newest-first records for `machine` created within the last `hours` hours.
    pub async fn get_recent_for_machine(
        &self,
        machine: &str,
        hours: i64,
        limit: i64,
    ) -> Result<Vec<LocationRecord>> {
        let since = created_since(hours);
        let rows = sqlx::query_as::<_, LocationRecord>(&format!(
            "{SELECT_LOCATION} WHERE machine_name = ? AND created_at > ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(machine)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_machines(&self) -> Result<Vec<MachineEntry>> {
        let rows = sqlx::query_as::<_, MachineEntry>(
            r#"
            SELECT machine_name AS name,
                   COUNT(*) AS count,
                   MIN(created_at) AS first_seen,
                   MAX(created_at) AS last_seen
            FROM locations
            GROUP BY machine_name
            ORDER BY last_seen DESC, MAX(id) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_total_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM locations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Delete every record and restart ids at 1. Returns the number of rows removed.
    pub async fn clear_all(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM locations")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
            .bind(TABLE_NAME)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    /// Delete one machine's records. The id counter is left alone.
    pub async fn clear_machine(&self, machine: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM locations WHERE machine_name = ?")
            .bind(machine)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// Row-level lookups used to check writes from tests
#[cfg(test)]
impl Database {
    pub async fn get_location(&self, id: i64) -> Result<Option<LocationRecord>> {
        let record = sqlx::query_as::<_, LocationRecord>(&format!("{SELECT_LOCATION} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn count_for_machine(&self, machine: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM locations WHERE machine_name = ?")
            .bind(machine)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Fresh database in its own temp directory. Keep the `TempDir` alive for the test.
    pub(crate) async fn test_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db"), 2).await.unwrap();
        db.run_migrations().await.unwrap();
        (db, dir)
    }

    pub(crate) fn sample(machine: &str) -> NewLocation {
        NewLocation {
            latitude: 52.52,
            longitude: 13.405,
            altitude: 34.0,
            timestamp: "2026-10-18T09:30:00.000Z".to_string(),
            machine_name: machine.to_string(),
            user_name: Some("alice".to_string()),
            location_source: "GPS".to_string(),
            public_ip: Some("203.0.113.7".to_string()),
            city: Some("Berlin".to_string()),
            country: Some("DE".to_string()),
            accuracy: Some(12.5),
            speed: None,
            received_at: "2026-10-18T09:30:01.000Z".to_string(),
            server_ip: "198.51.100.1".to_string(),
            user_agent: "tracker/1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let (db, _dir) = test_db().await;
        let new = sample("laptop-01");

        let id = db.insert_location(&new).await.unwrap();
        let record = db.get_location(id).await.unwrap().unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.latitude, new.latitude);
        assert_eq!(record.longitude, new.longitude);
        assert_eq!(record.altitude, new.altitude);
        assert_eq!(record.timestamp, new.timestamp);
        assert_eq!(record.machine_name, new.machine_name);
        assert_eq!(record.user_name, new.user_name);
        assert_eq!(record.city, new.city);
        assert_eq!(record.accuracy, new.accuracy);
        assert_eq!(record.speed, None);
        assert_eq!(record.user_agent, "tracker/1.0");
        assert!(!record.created_at.is_empty());
    }

    #[tokio::test]
    async fn ids_increase_in_insertion_order() {
        let (db, _dir) = test_db().await;
        let first = db.insert_location(&sample("a")).await.unwrap();
        let second = db.insert_location(&sample("b")).await.unwrap();
        let third = db.insert_location(&sample("a")).await.unwrap();
        assert!(first < second && second < third);
    }

    #[tokio::test]
    async fn machine_filter_returns_newest_first() {
        let (db, _dir) = test_db().await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(db.insert_location(&sample("phone")).await.unwrap());
        }
        db.insert_location(&sample("other")).await.unwrap();

        let rows = db
            .find_locations(&LocationFilter::Machine("phone".to_string()), 5)
            .await
            .unwrap();

        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.machine_name == "phone"));
        assert!(rows.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        ids.reverse();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn machine_filter_respects_limit() {
        let (db, _dir) = test_db().await;
        for _ in 0..4 {
            db.insert_location(&sample("phone")).await.unwrap();
        }
        let rows = db
            .find_locations(&LocationFilter::Machine("phone".to_string()), 2)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn date_filter_matches_date_portion_of_timestamp() {
        let (db, _dir) = test_db().await;
        let mut on_day = sample("a");
        on_day.timestamp = "2026-01-15T23:59:59.000Z".to_string();
        let mut other_day = sample("a");
        other_day.timestamp = "2026-01-16T00:00:01.000Z".to_string();
        let mut malformed = sample("a");
        malformed.timestamp = "yesterday-ish".to_string();

        let id = db.insert_location(&on_day).await.unwrap();
        db.insert_location(&other_day).await.unwrap();
        db.insert_location(&malformed).await.unwrap();

        let rows = db
            .find_locations(&LocationFilter::Date("2026-01-15".to_string()), 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
    }

    #[tokio::test]
    async fn pagination_skips_offset_newest_first() {
        let (db, _dir) = test_db().await;
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(db.insert_location(&sample(&format!("m{i}"))).await.unwrap());
        }
        ids.reverse();

        let page = db
            .find_locations(&LocationFilter::All { offset: 2 }, 3)
            .await
            .unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), ids[2..5].to_vec());
    }

    #[test]
    fn filter_precedence() {
        assert_eq!(
            LocationFilter::select(Some("m"), Some("2026-01-01"), 5),
            LocationFilter::Machine("m".to_string())
        );
        assert_eq!(
            LocationFilter::select(None, Some("2026-01-01"), 5),
            LocationFilter::Date("2026-01-01".to_string())
        );
        assert_eq!(
            LocationFilter::select(Some(""), None, 5),
            LocationFilter::All { offset: 5 }
        );
    }

    #[tokio::test]
    async fn recent_window_excludes_older_records() {
        let (db, _dir) = test_db().await;
        db.insert_location(&sample("tablet")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let within_day = db.get_recent_for_machine("tablet", 24, 100).await.unwrap();
        assert_eq!(within_day.len(), 1);

        let zero_window = db.get_recent_for_machine("tablet", 0, 100).await.unwrap();
        assert!(zero_window.is_empty());
    }

    #[test]
    fn created_since_handles_huge_windows() {
        assert_eq!(created_since(i64::MAX), "");
        assert_eq!(created_since(1).len(), "2026-10-18 09:30:00.000".len());
    }

    #[tokio::test]
    async fn roster_groups_by_machine() {
        let (db, _dir) = test_db().await;
        db.insert_location(&sample("a")).await.unwrap();
        db.insert_location(&sample("b")).await.unwrap();
        db.insert_location(&sample("a")).await.unwrap();

        let machines = db.get_machines().await.unwrap();
        assert_eq!(machines.len(), 2);
        // "a" was reported last
        assert_eq!(machines[0].name, "a");
        assert_eq!(machines[0].count, 2);
        assert!(machines[0].first_seen <= machines[0].last_seen);
        assert_eq!(machines[1].name, "b");
        assert_eq!(machines[1].count, 1);
    }

    #[tokio::test]
    async fn clear_all_resets_ids() {
        let (db, _dir) = test_db().await;
        db.insert_location(&sample("a")).await.unwrap();
        db.insert_location(&sample("b")).await.unwrap();

        assert_eq!(db.clear_all().await.unwrap(), 2);
        assert_eq!(db.get_total_count().await.unwrap(), 0);
        assert_eq!(db.insert_location(&sample("c")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_machine_keeps_other_machines_and_counter() {
        let (db, _dir) = test_db().await;
        db.insert_location(&sample("a")).await.unwrap();
        db.insert_location(&sample("a")).await.unwrap();
        db.insert_location(&sample("b")).await.unwrap();

        assert_eq!(db.clear_machine("a").await.unwrap(), 2);
        assert_eq!(db.count_for_machine("a").await.unwrap(), 0);
        assert_eq!(db.count_for_machine("b").await.unwrap(), 1);
        assert_eq!(db.insert_location(&sample("a")).await.unwrap(), 4);
    }
}
