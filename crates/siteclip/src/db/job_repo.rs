//! Job repository: CRUD operations for the `clip_jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct ClipJobRow {
    pub id: String,
    pub status: String,
    pub entity_label: String,
    pub created_by: Option<String>,
    pub total_content: i64,
    pub processed_content: i64,
    pub progress_message: Option<String>,
    /// JSON-encoded list of clipped version results.
    pub payload: Option<String>,
    pub error_status: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl ClipJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            entity_label: row.get("entity_label")?,
            created_by: row.get("created_by")?,
            total_content: row.get("total_content")?,
            processed_content: row.get("processed_content")?,
            progress_message: row.get("progress_message")?,
            payload: row.get("payload")?,
            error_status: row.get("error_status")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<String>,
    pub created_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &ClipJobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO clip_jobs (id, status, entity_label, created_by, total_content,
             processed_content, progress_message, payload, error_status, error_message,
             created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.id,
                job.status,
                job.entity_label,
                job.created_by,
                job.total_content,
                job.processed_content,
                job.progress_message,
                job.payload,
                job.error_status,
                job.error_message,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Updates an existing job row. All fields except `id`, `created_by` and
/// `created_at` are overwritten.
pub fn update(db: &Database, job: &ClipJobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE clip_jobs SET status=?2, entity_label=?3, total_content=?4,
             processed_content=?5, progress_message=?6, payload=?7, error_status=?8,
             error_message=?9, updated_at=?10, completed_at=?11
             WHERE id=?1",
            params![
                job.id,
                job.status,
                job.entity_label,
                job.total_content,
                job.processed_content,
                job.progress_message,
                job.payload,
                job.error_status,
                job.error_message,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ClipJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM clip_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ClipJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries jobs with filters, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<ClipJobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }
        if let Some(ref created_by) = filter.created_by {
            conditions.push(format!("created_by = ?{}", param_values.len() + 1));
            param_values.push(Box::new(created_by.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM clip_jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM clip_jobs {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<ClipJobRow> = stmt
            .query_map(params_ref.as_slice(), ClipJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Deletes finished jobs completed before `cutoff`. Returns the number removed.
pub fn delete_completed_before(db: &Database, cutoff: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM clip_jobs WHERE completed_at IS NOT NULL AND completed_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    })
}
