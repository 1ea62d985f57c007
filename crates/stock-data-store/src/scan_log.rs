use scan_core::{ScanError, ScanLog, ScanStatus};
use sqlx::SqlitePool;

fn store_err(e: sqlx::Error) -> ScanError {
    ScanError::StoreError(e.to_string())
}

fn status_str(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Running => "Running",
        ScanStatus::Succeeded => "Succeeded",
        ScanStatus::Failed => "Failed",
    }
}

fn status_from_str(s: &str) -> ScanStatus {
    match s {
        "Succeeded" => ScanStatus::Succeeded,
        "Failed" => ScanStatus::Failed,
        _ => ScanStatus::Running,
    }
}

#[derive(sqlx::FromRow)]
struct ScanLogRow {
    id: String,
    started_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    symbols_scanned: i64,
    recommendations_generated: i64,
    status: String,
    error_message: Option<String>,
}

impl ScanLogRow {
    fn into_scan_log(self) -> Result<ScanLog, ScanError> {
        Ok(ScanLog {
            id: uuid::Uuid::parse_str(&self.id).map_err(|e| ScanError::StoreError(e.to_string()))?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            symbols_scanned: self.symbols_scanned,
            recommendations_generated: self.recommendations_generated,
            status: status_from_str(&self.status),
            error_message: self.error_message,
        })
    }
}

/// Open a new append-only scan attempt record (spec §3 `ScanLog`,
/// §4.1 step 1).
pub async fn insert(pool: &SqlitePool, log: &ScanLog) -> Result<(), ScanError> {
    sqlx::query(
        "INSERT INTO scan_log (id, started_at, completed_at, symbols_scanned, \
         recommendations_generated, status, error_message) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(log.id.to_string())
    .bind(log.started_at)
    .bind(log.completed_at)
    .bind(log.symbols_scanned)
    .bind(log.recommendations_generated)
    .bind(status_str(log.status))
    .bind(&log.error_message)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

/// Close the scan attempt record exactly once, at scan end (spec §3
/// lifecycle, §4.1 steps 5/7).
pub async fn update(pool: &SqlitePool, log: &ScanLog) -> Result<(), ScanError> {
    sqlx::query(
        "UPDATE scan_log SET completed_at = ?, symbols_scanned = ?, \
         recommendations_generated = ?, status = ?, error_message = ? WHERE id = ?",
    )
    .bind(log.completed_at)
    .bind(log.symbols_scanned)
    .bind(log.recommendations_generated)
    .bind(status_str(log.status))
    .bind(&log.error_message)
    .bind(log.id.to_string())
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: uuid::Uuid) -> Result<Option<ScanLog>, ScanError> {
    let row: Option<ScanLogRow> = sqlx::query_as(
        "SELECT id, started_at, completed_at, symbols_scanned, recommendations_generated, \
         status, error_message FROM scan_log WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;

    row.map(ScanLogRow::into_scan_log).transpose()
}
