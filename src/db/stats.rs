//! Aggregate views over the locations table: statistics, size and schema introspection

use anyhow::{Context, Result};
use serde::Serialize;

use super::{created_since, Database, MachineEntry};
use crate::units::format_file_size;

/// Days covered by the activity histogram in [`DatabaseInfo`]
pub const ACTIVITY_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct StatsMachine {
    pub machine_name: String,
    pub record_count: i64,
    pub first_seen: String,
    pub last_seen: String,
}

impl From<MachineEntry> for StatsMachine {
    fn from(entry: MachineEntry) -> Self {
        Self {
            machine_name: entry.name,
            record_count: entry.count,
            first_seen: entry.first_seen,
            last_seen: entry.last_seen,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_records: i64,
    pub unique_machines: i64,
    pub unique_users: i64,
    pub oldest_record: Option<String>,
    pub newest_record: Option<String>,
    pub machines: Vec<StatsMachine>,
    pub database_size: i64,
    pub database_size_formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSize {
    pub file_size: i64,
    pub file_size_formatted: String,
    pub page_count: i64,
    pub page_size: i64,
    pub calculated_size: i64,
    pub calculated_size_formatted: String,
    pub total_records: i64,
    pub avg_bytes_per_record: i64,
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ColumnInfo {
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub column_type: String,
    #[sqlx(rename = "notnull")]
    pub not_null: bool,
    pub default_value: Option<String>,
    #[sqlx(rename = "pk")]
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IndexInfo {
    pub name: String,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyActivity {
    pub date: String,
    pub records: i64,
    pub machines: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MachineSummary {
    pub machine_name: String,
    pub total_records: i64,
    pub first_location: String,
    pub last_location: String,
    pub avg_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    #[serde(flatten)]
    pub size: DatabaseSize,
    pub table_name: &'static str,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub daily_activity: Vec<DailyActivity>,
    pub machine_summary: Vec<MachineSummary>,
}

impl Database {
    /// Byte length of the database file on disk
    pub async fn file_size(&self) -> Result<i64> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("failed to stat {}", self.path.display()))?;
        Ok(metadata.len() as i64)
    }

    async fn page_metrics(&self) -> Result<(i64, i64)> {
        let (page_count,): (i64,) = sqlx::query_as("SELECT page_count FROM pragma_page_count()")
            .fetch_one(&self.pool)
            .await?;
        let (page_size,): (i64,) = sqlx::query_as("SELECT page_size FROM pragma_page_size()")
            .fetch_one(&self.pool)
            .await?;
        Ok((page_count, page_size))
    }

    pub async fn get_stats(&self) -> Result<Stats> {
        let (total_records, unique_machines, unique_users, oldest_record, newest_record): (
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(DISTINCT machine_name),
                   COUNT(DISTINCT user_name),
                   MIN(created_at),
                   MAX(created_at)
            FROM locations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let machines = self
            .get_machines()
            .await?
            .into_iter()
            .map(StatsMachine::from)
            .collect();
        let database_size = self.file_size().await?;

        Ok(Stats {
            total_records,
            unique_machines,
            unique_users,
            oldest_record,
            newest_record,
            machines,
            database_size,
            database_size_formatted: format_file_size(database_size),
        })
    }

    /// Cheap size report: file metadata, page pragmas and a row count, no grouping.
    pub async fn get_database_size(&self) -> Result<DatabaseSize> {
        let file_size = self.file_size().await?;
        let (page_count, page_size) = self.page_metrics().await?;
        let total_records = self.get_total_count().await?;

        let calculated_size = page_count * page_size;
        let avg_bytes_per_record = if total_records > 0 {
            file_size / total_records
        } else {
            0
        };

        Ok(DatabaseSize {
            file_size,
            file_size_formatted: format_file_size(file_size),
            page_count,
            page_size,
            calculated_size,
            calculated_size_formatted: format_file_size(calculated_size),
            total_records,
            avg_bytes_per_record,
            database_path: self.path.display().to_string(),
        })
    }

    pub async fn get_database_info(&self) -> Result<DatabaseInfo> {
        let size = self.get_database_size().await?;

        let columns = sqlx::query_as::<_, ColumnInfo>(
            r#"
            SELECT name, type, "notnull", dflt_value AS default_value, pk
            FROM pragma_table_info('locations')
            ORDER BY cid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let indexes = sqlx::query_as::<_, IndexInfo>(
            "SELECT name, sql FROM sqlite_master WHERE type = 'index' AND tbl_name = ? ORDER BY name",
        )
        .bind(super::TABLE_NAME)
        .fetch_all(&self.pool)
        .await?;

        let daily_activity = sqlx::query_as::<_, DailyActivity>(
            r#"
            SELECT DATE(created_at) AS date,
                   COUNT(*) AS records,
                   COUNT(DISTINCT machine_name) AS machines
            FROM locations
            WHERE created_at >= ?
            GROUP BY DATE(created_at)
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(created_since(ACTIVITY_DAYS * 24))
        .bind(ACTIVITY_DAYS)
        .fetch_all(&self.pool)
        .await?;

        let machine_summary = sqlx::query_as::<_, MachineSummary>(
            r#"
            SELECT machine_name,
                   COUNT(*) AS total_records,
                   MIN(created_at) AS first_location,
                   MAX(created_at) AS last_location,
                   ROUND(AVG(accuracy), 2) AS avg_accuracy
            FROM locations
            GROUP BY machine_name
            ORDER BY total_records DESC, machine_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(DatabaseInfo {
            size,
            table_name: super::TABLE_NAME,
            columns,
            indexes,
            daily_activity,
            machine_summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{sample, test_db};

    #[tokio::test]
    async fn stats_on_empty_table() {
        let (db, _dir) = test_db().await;
        let stats = db.get_stats().await.unwrap();
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.unique_machines, 0);
        assert_eq!(stats.unique_users, 0);
        assert!(stats.oldest_record.is_none());
        assert!(stats.newest_record.is_none());
        assert!(stats.machines.is_empty());
    }

    #[tokio::test]
    async fn unique_machines_matches_roster() {
        let (db, _dir) = test_db().await;
        let mut anonymous = sample("c");
        anonymous.user_name = None;

        db.insert_location(&sample("a")).await.unwrap();
        db.insert_location(&sample("b")).await.unwrap();
        db.insert_location(&sample("a")).await.unwrap();
        db.insert_location(&anonymous).await.unwrap();

        let stats = db.get_stats().await.unwrap();
        let roster = db.get_machines().await.unwrap();
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.unique_machines, 3);
        assert_eq!(stats.unique_machines as usize, roster.len());
        assert_eq!(stats.machines.len(), roster.len());
        // NULL user names are not counted
        assert_eq!(stats.unique_users, 1);
        assert!(stats.oldest_record <= stats.newest_record);
    }

    #[tokio::test]
    async fn size_reports_pages_and_average() {
        let (db, _dir) = test_db().await;
        let empty = db.get_database_size().await.unwrap();
        assert_eq!(empty.total_records, 0);
        assert_eq!(empty.avg_bytes_per_record, 0);
        assert!(empty.page_size > 0);
        assert_eq!(empty.calculated_size, empty.page_count * empty.page_size);

        db.insert_location(&sample("a")).await.unwrap();
        db.insert_location(&sample("a")).await.unwrap();
        let size = db.get_database_size().await.unwrap();
        assert_eq!(size.total_records, 2);
        assert_eq!(size.avg_bytes_per_record, size.file_size / 2);
    }

    #[tokio::test]
    async fn info_includes_schema_activity_and_summary() {
        let (db, _dir) = test_db().await;
        let mut precise = sample("a");
        precise.accuracy = Some(10.0);
        let mut rough = sample("a");
        rough.accuracy = Some(15.556);
        let mut unknown = sample("b");
        unknown.accuracy = None;

        db.insert_location(&precise).await.unwrap();
        db.insert_location(&rough).await.unwrap();
        db.insert_location(&unknown).await.unwrap();

        let info = db.get_database_info().await.unwrap();

        assert_eq!(info.table_name, "locations");
        let id_column = info.columns.iter().find(|c| c.name == "id").unwrap();
        assert!(id_column.primary_key);
        let machine_column = info.columns.iter().find(|c| c.name == "machine_name").unwrap();
        assert!(machine_column.not_null);
        assert_eq!(info.columns.len(), 17);

        let index_names: Vec<_> = info.indexes.iter().map(|i| i.name.as_str()).collect();
        assert!(index_names.contains(&"idx_locations_machine"));
        assert!(index_names.contains(&"idx_locations_timestamp"));
        assert!(index_names.contains(&"idx_locations_created_at"));

        assert_eq!(info.daily_activity.len(), 1);
        assert_eq!(info.daily_activity[0].records, 3);
        assert_eq!(info.daily_activity[0].machines, 2);

        assert_eq!(info.machine_summary.len(), 2);
        assert_eq!(info.machine_summary[0].machine_name, "a");
        assert_eq!(info.machine_summary[0].total_records, 2);
        assert_eq!(info.machine_summary[0].avg_accuracy, Some(12.78));
        assert_eq!(info.machine_summary[1].avg_accuracy, None);
    }
}
