use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{error::ApiError, models::WorkLogRow};

/// Opens an attendance session for the staff member. One open session at
/// a time.
pub async fn check_in(pool: &SqlitePool, staff_id: i64) -> Result<i64, ApiError> {
    let open: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM work_logs WHERE staff_id = ? AND check_out IS NULL LIMIT 1",
    )
    .bind(staff_id)
    .fetch_optional(pool)
    .await?;

    if open.is_some() {
        return Err(ApiError::Conflict("already checked in".to_string()));
    }

    let result = sqlx::query("INSERT INTO work_logs (staff_id, check_in) VALUES (?, ?)")
        .bind(staff_id)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Closes the open session and records its duration in minutes.
pub async fn check_out(pool: &SqlitePool, staff_id: i64) -> Result<i64, ApiError> {
    let open: Option<(i64, String)> = sqlx::query_as(
        r#"SELECT id, check_in FROM work_logs
           WHERE staff_id = ? AND check_out IS NULL
           ORDER BY id DESC
           LIMIT 1"#,
    )
    .bind(staff_id)
    .fetch_optional(pool)
    .await?;

    let (log_id, check_in) =
        open.ok_or_else(|| ApiError::NotFound("no open work session".to_string()))?;

    let started = DateTime::parse_from_rfc3339(&check_in)
        .map_err(|_| ApiError::Invalid("stored check-in timestamp is malformed".to_string()))?;
    let now = Utc::now();
    let duration_minutes = (now - started.with_timezone(&Utc)).num_minutes().max(0);

    sqlx::query("UPDATE work_logs SET check_out = ?, duration_minutes = ? WHERE id = ?")
        .bind(now.to_rfc3339())
        .bind(duration_minutes)
        .bind(log_id)
        .execute(pool)
        .await?;

    Ok(duration_minutes)
}

pub async fn recent(pool: &SqlitePool, staff_id: i64) -> Result<Vec<WorkLogRow>, sqlx::Error> {
    sqlx::query_as::<_, WorkLogRow>(
        r#"SELECT id, check_in, check_out, duration_minutes
           FROM work_logs
           WHERE staff_id = ?
           ORDER BY id DESC
           LIMIT 10"#,
    )
    .bind(staff_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_pool() -> SqlitePool {
        let test_id = uuid::Uuid::new_v4().simple().to_string();
        let url = format!("sqlite:file:memdb_worklog_{test_id}?mode=memory&cache=shared");
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");

        sqlx::query(
            r#"INSERT INTO users (username, display_name, role, password_hash, active, created_at)
               VALUES ('stylist', 'stylist', 'staff', 'x', 1, ?)"#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert staff");
        pool
    }

    #[tokio::test]
    async fn check_in_then_out_closes_the_session() {
        let pool = test_pool().await;

        check_in(&pool, 1).await.expect("check in");
        let minutes = check_out(&pool, 1).await.expect("check out");
        assert!(minutes >= 0);

        let logs = recent(&pool, 1).await.expect("recent");
        assert_eq!(logs.len(), 1);
        assert!(logs[0].check_out.is_some());
        assert_eq!(logs[0].duration_minutes, Some(minutes));
    }

    #[tokio::test]
    async fn double_check_in_is_rejected() {
        let pool = test_pool().await;

        check_in(&pool, 1).await.expect("check in");
        let err = check_in(&pool, 1).await.expect_err("still checked in");
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn check_out_without_session_is_not_found() {
        let pool = test_pool().await;

        let err = check_out(&pool, 1).await.expect_err("nothing open");
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
