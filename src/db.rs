use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::hash_password,
    models::{AppointmentDetailRow, ROLE_ADMIN},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_services(pool).await?;
    Ok(())
}

/// Best-effort audit feed; failures are swallowed so they never affect
/// the operation being logged.
pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<i64>,
    appointment_id: Option<i64>,
) {
    let _ = sqlx::query(
        r#"INSERT INTO activities (kind, message, created_at, user_id, appointment_id)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(appointment_id)
    .execute(pool)
    .await;
}

pub async fn fetch_appointment_detail(
    pool: &SqlitePool,
    appointment_id: i64,
) -> Option<AppointmentDetailRow> {
    sqlx::query_as::<_, AppointmentDetailRow>(
        r#"SELECT a.id, a.client_id, a.staff_id, a.service_id, a.date, a.time,
                  a.price, a.status, a.notes, a.created_at,
                  c.display_name AS client_name,
                  u.display_name AS staff_name,
                  s.name AS service_name
           FROM appointments a
           JOIN users c ON a.client_id = c.id
           LEFT JOIN users u ON a.staff_id = u.id
           JOIN services s ON a.service_id = s.id
           WHERE a.id = ?
           LIMIT 1"#,
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await
    .unwrap_or(None)
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (i64,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_ADMIN)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name =
        env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Salon Admin".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, 1, ?)"#,
    )
    .bind(username)
    .bind(display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_services(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (i64,)>("SELECT id FROM services LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let services: Vec<(&str, f64, i64)> = vec![
        ("Classic Haircut", 45.0, 45),
        ("Hair Coloring", 150.0, 120),
        ("Facial", 120.0, 60),
        ("Manicure", 35.0, 40),
        ("Scalp Massage", 60.0, 30),
    ];

    for (name, price, duration_minutes) in services {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO services (name, price, duration_minutes, active, created_at)
               VALUES (?, ?, ?, 1, ?)"#,
        )
        .bind(name)
        .bind(price)
        .bind(duration_minutes)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}
