use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{NotificationRow, ROLE_ADMIN};

/// Each user keeps at most this many notifications; older ones are
/// pruned on every send.
pub const INBOX_CAP: i64 = 100;

/// Fire-and-forget: a failed send is logged and never surfaces to the
/// operation that triggered it.
pub async fn notify_user(pool: &SqlitePool, user_id: i64, title: &str, message: &str) {
    if let Err(err) = insert_and_prune(pool, user_id, title, message).await {
        log::warn!("notification for user {user_id} dropped: {err}");
    }
}

pub async fn notify_all_admins(pool: &SqlitePool, title: &str, message: &str) {
    let admin_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE role = ? AND active = 1")
            .bind(ROLE_ADMIN)
            .fetch_all(pool)
            .await
            .unwrap_or_default();

    for admin_id in admin_ids {
        notify_user(pool, admin_id, title, message).await;
    }
}

pub async fn fetch_inbox(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<NotificationRow>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(
        r#"SELECT id, title, message, is_read, created_at
           FROM notifications
           WHERE user_id = ?
           ORDER BY id DESC
           LIMIT ? OFFSET ?"#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

async fn insert_and_prune(
    pool: &SqlitePool,
    user_id: i64,
    title: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO notifications (user_id, title, message, is_read, created_at)
           VALUES (?, ?, ?, 0, ?)"#,
    )
    .bind(user_id)
    .bind(title)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    sqlx::query(
        r#"DELETE FROM notifications
           WHERE user_id = ?
             AND id NOT IN (
                 SELECT id FROM notifications
                 WHERE user_id = ?
                 ORDER BY id DESC
                 LIMIT ?
             )"#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(INBOX_CAP)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_pool() -> SqlitePool {
        let test_id = uuid::Uuid::new_v4().simple().to_string();
        let url = format!("sqlite:file:memdb_notify_{test_id}?mode=memory&cache=shared");
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool, username: &str, role: &str) -> i64 {
        sqlx::query(
            r#"INSERT INTO users (username, display_name, role, password_hash, active, created_at)
               VALUES (?, ?, ?, 'x', 1, ?)"#,
        )
        .bind(username)
        .bind(username)
        .bind(role)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("insert user")
        .last_insert_rowid()
    }

    async fn inbox_count(pool: &SqlitePool, user_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .expect("count")
    }

    #[tokio::test]
    async fn inbox_is_pruned_to_cap() {
        let pool = test_pool().await;
        let user_id = insert_user(&pool, "client1", "client").await;

        for n in 0..(INBOX_CAP + 5) {
            notify_user(&pool, user_id, "Update", &format!("message {n}")).await;
        }

        assert_eq!(inbox_count(&pool, user_id).await, INBOX_CAP);

        // The newest message survives, the oldest was pruned.
        let newest = fetch_inbox(&pool, user_id, 1, 0).await.expect("inbox");
        assert_eq!(newest[0].message, format!("message {}", INBOX_CAP + 4));
        let survivors: Vec<NotificationRow> = fetch_inbox(&pool, user_id, INBOX_CAP, 0)
            .await
            .expect("inbox");
        assert!(survivors.iter().all(|n| n.message != "message 0"));
    }

    #[tokio::test]
    async fn admin_broadcast_reaches_every_active_admin() {
        let pool = test_pool().await;
        let first = insert_user(&pool, "admin1", ROLE_ADMIN).await;
        let second = insert_user(&pool, "admin2", ROLE_ADMIN).await;
        let client = insert_user(&pool, "client1", "client").await;

        let inactive = insert_user(&pool, "admin3", ROLE_ADMIN).await;
        sqlx::query("UPDATE users SET active = 0 WHERE id = ?")
            .bind(inactive)
            .execute(&pool)
            .await
            .expect("deactivate");

        notify_all_admins(&pool, "New booking", "A client booked a Facial.").await;

        assert_eq!(inbox_count(&pool, first).await, 1);
        assert_eq!(inbox_count(&pool, second).await, 1);
        assert_eq!(inbox_count(&pool, client).await, 0);
        assert_eq!(inbox_count(&pool, inactive).await, 0);
    }
}
