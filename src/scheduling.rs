use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use sqlx::SqliteConnection;

use crate::{
    auth::AuthUser,
    db,
    error::ApiError,
    models::{AppointmentRow, AppointmentStatus, ServiceRow, ROLE_STAFF},
    notify,
    state::{AppState, ServerEvent},
};

pub const PER_PAGE: i64 = 10;

pub fn page_offset(page: i64) -> i64 {
    (page.max(1) - 1) * PER_PAGE
}

#[derive(Debug, Deserialize)]
pub struct NewAppointment {
    pub service_id: i64,
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentEdit {
    pub service_id: Option<i64>,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StaffAssignment {
    pub staff_id: i64,
    pub date: String,
    pub time: String,
}

/// Books a new appointment for `client_id`. Returns the appointment id.
///
/// The slot conflict check and the insert share one transaction, and the
/// unique slot indexes catch whatever a concurrent request slips past
/// the pre-check.
pub async fn create_appointment(
    state: &AppState,
    client_id: i64,
    input: NewAppointment,
) -> Result<i64, ApiError> {
    let (date, date_text, time_text) = parse_slot(&input.date, &input.time)?;
    ensure_not_past(date)?;

    let mut tx = state.db.begin().await?;

    if service_slot_taken(&mut tx, input.service_id, &date_text, &time_text, None).await? {
        return Err(ApiError::Conflict(
            "that time slot is already taken".to_string(),
        ));
    }

    let service = fetch_active_service(&mut tx, input.service_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("service not found".to_string()))?;

    // Display name is best-effort; a missing row never blocks booking.
    let client_name: Option<String> =
        sqlx::query_scalar("SELECT display_name FROM users WHERE id = ?")
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await?;
    let client_name = client_name.unwrap_or_else(|| "A client".to_string());

    let notes = input.notes.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    });

    let result = sqlx::query(
        r#"INSERT INTO appointments
           (client_id, staff_id, service_id, date, time, price, status, notes, created_at)
           VALUES (?, NULL, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(client_id)
    .bind(service.id)
    .bind(&date_text)
    .bind(&time_text)
    .bind(service.price)
    .bind(AppointmentStatus::Pending.as_str())
    .bind(notes)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    let appointment_id = result.last_insert_rowid();
    tx.commit().await?;

    notify::notify_user(
        &state.db,
        client_id,
        "Booking received",
        &format!(
            "Your {} appointment on {} at {} is awaiting confirmation.",
            service.name, date_text, time_text
        ),
    )
    .await;
    notify::notify_all_admins(
        &state.db,
        "New booking",
        &format!(
            "{} booked {} for {} at {}.",
            client_name, service.name, date_text, time_text
        ),
    )
    .await;
    db::log_activity(
        &state.db,
        "appointment_created",
        &format!("{} requested {}.", client_name, service.name),
        Some(client_id),
        Some(appointment_id),
    )
    .await;
    publish_event(state, "appointment_created", appointment_id).await;

    Ok(appointment_id)
}

/// Partial update of the client's own appointment. Omitted fields fall
/// back to the stored values.
pub async fn edit_appointment(
    state: &AppState,
    client_id: i64,
    appointment_id: i64,
    edit: AppointmentEdit,
) -> Result<(), ApiError> {
    let mut tx = state.db.begin().await?;

    let current = sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, client_id, staff_id, service_id, date, time, price, status, notes, created_at
           FROM appointments
           WHERE id = ? AND client_id = ? AND status != ?
           LIMIT 1"#,
    )
    .bind(appointment_id)
    .bind(client_id)
    .bind(AppointmentStatus::Completed.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("appointment not found".to_string()))?;

    let service_id = edit.service_id.unwrap_or(current.service_id);
    let date_input = edit.date.unwrap_or_else(|| current.date.clone());
    let time_input = edit.time.unwrap_or_else(|| current.time.clone());

    let (date, date_text, time_text) = parse_slot(&date_input, &time_input)?;
    ensure_not_past(date)?;

    if service_slot_taken(&mut tx, service_id, &date_text, &time_text, Some(appointment_id))
        .await?
    {
        return Err(ApiError::Conflict(
            "that time slot is already taken".to_string(),
        ));
    }
    if let Some(staff_id) = current.staff_id {
        if staff_slot_taken(&mut tx, staff_id, &date_text, &time_text, Some(appointment_id))
            .await?
        {
            return Err(ApiError::Conflict(
                "your staff member is already booked at that time".to_string(),
            ));
        }
    }

    // Switching services re-snapshots the price; the price of the kept
    // service never moves after booking.
    let price = if service_id != current.service_id {
        let service = fetch_active_service(&mut tx, service_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("service not found".to_string()))?;
        service.price
    } else {
        current.price
    };

    sqlx::query(
        r#"UPDATE appointments
           SET service_id = ?, date = ?, time = ?, price = ?
           WHERE id = ?"#,
    )
    .bind(service_id)
    .bind(&date_text)
    .bind(&time_text)
    .bind(price)
    .bind(appointment_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let detail = format!(
        "from {} at {} to {} at {}",
        current.date, current.time, date_text, time_text
    );
    notify::notify_user(
        &state.db,
        client_id,
        "Booking updated",
        &format!("Your appointment moved {detail}."),
    )
    .await;
    notify::notify_all_admins(
        &state.db,
        "Booking updated",
        &format!("Appointment {appointment_id} moved {detail}."),
    )
    .await;
    db::log_activity(
        &state.db,
        "appointment_updated",
        &format!("Appointment {appointment_id} moved {detail}."),
        Some(client_id),
        Some(appointment_id),
    )
    .await;
    publish_event(state, "appointment_updated", appointment_id).await;

    Ok(())
}

/// Client-side cancellation: a hard delete of the client's own
/// non-completed appointment.
pub async fn cancel_appointment(
    state: &AppState,
    client_id: i64,
    appointment_id: i64,
) -> Result<(), ApiError> {
    // Captured up front so the notification payload survives the delete.
    let detail = db::fetch_appointment_detail(&state.db, appointment_id).await;

    let result = sqlx::query(
        "DELETE FROM appointments WHERE id = ? AND client_id = ? AND status != ?",
    )
    .bind(appointment_id)
    .bind(client_id)
    .bind(AppointmentStatus::Completed.as_str())
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("appointment not found".to_string()));
    }

    if let Some(detail) = detail {
        // Cancellations notify the client only; admins learn about
        // creations and edits but not cancellations.
        notify::notify_user(
            &state.db,
            client_id,
            "Booking cancelled",
            &format!(
                "Your {} on {} at {} has been cancelled.",
                detail.service_name, detail.date, detail.time
            ),
        )
        .await;
        db::log_activity(
            &state.db,
            "appointment_cancelled",
            &format!("{} cancelled {}.", detail.client_name, detail.service_name),
            Some(client_id),
            Some(appointment_id),
        )
        .await;
        let _ = state
            .events
            .send(ServerEvent::from_detail("appointment_cancelled", detail));
    }

    Ok(())
}

/// Admin-side removal; same affected-rows discipline as the client
/// cancel but without the ownership match.
pub async fn admin_delete_appointment(
    state: &AppState,
    admin: &AuthUser,
    appointment_id: i64,
) -> Result<(), ApiError> {
    let detail = db::fetch_appointment_detail(&state.db, appointment_id).await;

    let result = sqlx::query("DELETE FROM appointments WHERE id = ? AND status != ?")
        .bind(appointment_id)
        .bind(AppointmentStatus::Completed.as_str())
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("appointment not found".to_string()));
    }

    if let Some(detail) = detail {
        notify::notify_user(
            &state.db,
            detail.client_id,
            "Booking cancelled",
            &format!(
                "Your {} on {} at {} has been cancelled by the salon.",
                detail.service_name, detail.date, detail.time
            ),
        )
        .await;
        db::log_activity(
            &state.db,
            "appointment_deleted",
            &format!("{} removed appointment {}.", admin.display_name, appointment_id),
            Some(admin.id),
            Some(appointment_id),
        )
        .await;
        let _ = state
            .events
            .send(ServerEvent::from_detail("appointment_cancelled", detail));
    }

    Ok(())
}

/// Assigns a staff member to an appointment. The passed slot must still
/// match the stored one, and the staff member must be free at that slot.
pub async fn assign_staff(
    state: &AppState,
    admin: &AuthUser,
    appointment_id: i64,
    input: StaffAssignment,
) -> Result<(), ApiError> {
    let (_, date_text, time_text) = parse_slot(&input.date, &input.time)?;

    let mut tx = state.db.begin().await?;

    let staff: Option<(i64, String)> = sqlx::query_as(
        "SELECT id, display_name FROM users WHERE id = ? AND role = ? AND active = 1",
    )
    .bind(input.staff_id)
    .bind(ROLE_STAFF)
    .fetch_optional(&mut *tx)
    .await?;
    let (staff_id, staff_name) =
        staff.ok_or_else(|| ApiError::NotFound("staff member not found".to_string()))?;

    let appointment = sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, client_id, staff_id, service_id, date, time, price, status, notes, created_at
           FROM appointments
           WHERE id = ? AND status != ?
           LIMIT 1"#,
    )
    .bind(appointment_id)
    .bind(AppointmentStatus::Completed.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("appointment not found".to_string()))?;

    if appointment.date != date_text || appointment.time != time_text {
        return Err(ApiError::Conflict(
            "the appointment slot has changed, reload and try again".to_string(),
        ));
    }

    if staff_slot_taken(&mut tx, staff_id, &date_text, &time_text, Some(appointment_id)).await? {
        return Err(ApiError::Conflict(format!(
            "{staff_name} is already booked at that time"
        )));
    }

    sqlx::query("UPDATE appointments SET staff_id = ? WHERE id = ?")
        .bind(staff_id)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    notify::notify_user(
        &state.db,
        staff_id,
        "New assignment",
        &format!("You have an appointment on {date_text} at {time_text}."),
    )
    .await;
    db::log_activity(
        &state.db,
        "staff_assigned",
        &format!(
            "{} assigned {} to appointment {}.",
            admin.display_name, staff_name, appointment_id
        ),
        Some(admin.id),
        Some(appointment_id),
    )
    .await;
    publish_event(state, "staff_assigned", appointment_id).await;

    Ok(())
}

/// Moves an appointment along the status graph. Staff may only touch
/// appointments assigned to them; admins may touch any.
pub async fn update_status(
    state: &AppState,
    actor: &AuthUser,
    appointment_id: i64,
    new_status: &str,
) -> Result<(), ApiError> {
    let next = AppointmentStatus::parse(new_status.trim())
        .ok_or_else(|| ApiError::Invalid(format!("unknown status '{new_status}'")))?;

    let mut tx = state.db.begin().await?;

    let appointment = sqlx::query_as::<_, (i64, Option<i64>, String)>(
        "SELECT client_id, staff_id, status FROM appointments WHERE id = ?",
    )
    .bind(appointment_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("appointment not found".to_string()))?;
    let (client_id, staff_id, status_text) = appointment;

    if actor.role == ROLE_STAFF && staff_id != Some(actor.id) {
        return Err(ApiError::Forbidden(
            "appointment is not assigned to you".to_string(),
        ));
    }

    let current = AppointmentStatus::parse(&status_text).ok_or_else(|| {
        ApiError::Invalid(format!("appointment has unrecognized status '{status_text}'"))
    })?;
    if !current.can_transition_to(next) {
        return Err(ApiError::Conflict(format!(
            "cannot move appointment from {current} to {next}"
        )));
    }

    // The current status is part of the predicate so a concurrent
    // transition shows up as zero affected rows.
    let result = sqlx::query("UPDATE appointments SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_str())
        .bind(appointment_id)
        .bind(current.as_str())
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("appointment not found".to_string()));
    }

    tx.commit().await?;

    if let Some(detail) = db::fetch_appointment_detail(&state.db, appointment_id).await {
        notify::notify_user(
            &state.db,
            client_id,
            "Appointment update",
            &format!(
                "Your {} on {} at {} {}.",
                detail.service_name,
                detail.date,
                detail.time,
                next.client_message()
            ),
        )
        .await;
    }
    db::log_activity(
        &state.db,
        "status_updated",
        &format!(
            "{} moved appointment {} to {}.",
            actor.display_name, appointment_id, next
        ),
        Some(actor.id),
        Some(appointment_id),
    )
    .await;
    publish_event(state, "status_updated", appointment_id).await;

    Ok(())
}

fn parse_slot(date: &str, time: &str) -> Result<(NaiveDate, String, String), ApiError> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::Invalid("date must be formatted as YYYY-MM-DD".to_string()))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| ApiError::Invalid("time must be formatted as HH:MM".to_string()))?;
    Ok((
        date,
        date.format("%Y-%m-%d").to_string(),
        time.format("%H:%M").to_string(),
    ))
}

fn ensure_not_past(date: NaiveDate) -> Result<(), ApiError> {
    if date < Utc::now().date_naive() {
        return Err(ApiError::Invalid(
            "date must not be in the past".to_string(),
        ));
    }
    Ok(())
}

async fn fetch_active_service(
    conn: &mut SqliteConnection,
    service_id: i64,
) -> Result<Option<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, price, duration_minutes, active FROM services WHERE id = ? AND active = 1",
    )
    .bind(service_id)
    .fetch_optional(&mut *conn)
    .await
}

// Slot checks match on exact (date, time) equality; stored durations are
// not consulted, so overlapping-but-not-identical ranges pass.
async fn service_slot_taken(
    conn: &mut SqliteConnection,
    service_id: i64,
    date: &str,
    time: &str,
    exclude_id: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments WHERE service_id = ? AND date = ? AND time = ? AND id != ?",
    )
    .bind(service_id)
    .bind(date)
    .bind(time)
    .bind(exclude_id.unwrap_or(0))
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

async fn staff_slot_taken(
    conn: &mut SqliteConnection,
    staff_id: i64,
    date: &str,
    time: &str,
    exclude_id: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments WHERE staff_id = ? AND date = ? AND time = ? AND id != ?",
    )
    .bind(staff_id)
    .bind(date)
    .bind(time)
    .bind(exclude_id.unwrap_or(0))
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

async fn publish_event(state: &AppState, kind: &str, appointment_id: i64) {
    if let Some(row) = db::fetch_appointment_detail(&state.db, appointment_id).await {
        let _ = state.events.send(ServerEvent::from_detail(kind, row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::SqlitePool;
    use tokio::sync::broadcast;

    use crate::models::{ROLE_ADMIN, ROLE_CLIENT};

    const FACIAL: i64 = 3;
    const HAIRCUT: i64 = 1;

    struct Fixture {
        state: AppState,
        client: i64,
        other_client: i64,
        admin: AuthUser,
        staff: i64,
    }

    async fn setup() -> Fixture {
        let test_id = uuid::Uuid::new_v4().simple().to_string();
        let url = format!("sqlite:file:memdb_sched_{test_id}?mode=memory&cache=shared");
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");

        let now = Utc::now().to_rfc3339();
        for (id, name, price, duration) in [
            (HAIRCUT, "Classic Haircut", 45.0, 45),
            (2, "Hair Coloring", 150.0, 120),
            (FACIAL, "Facial", 120.0, 60),
        ] {
            sqlx::query(
                r#"INSERT INTO services (id, name, price, duration_minutes, active, created_at)
                   VALUES (?, ?, ?, ?, 1, ?)"#,
            )
            .bind(id)
            .bind(name)
            .bind(price)
            .bind(duration)
            .bind(&now)
            .execute(&pool)
            .await
            .expect("insert service");
        }

        let client = insert_user(&pool, "amelia", ROLE_CLIENT).await;
        let other_client = insert_user(&pool, "bruno", ROLE_CLIENT).await;
        let admin_id = insert_user(&pool, "boss", ROLE_ADMIN).await;
        let staff = insert_user(&pool, "stylist", ROLE_STAFF).await;

        let (events, _) = broadcast::channel(32);
        Fixture {
            state: AppState { db: pool, events },
            client,
            other_client,
            admin: AuthUser {
                id: admin_id,
                display_name: "boss".to_string(),
                role: ROLE_ADMIN.to_string(),
            },
            staff,
        }
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

    fn staff_actor(id: i64) -> AuthUser {
        AuthUser {
            id,
            display_name: "stylist".to_string(),
            role: ROLE_STAFF.to_string(),
        }
    }

    fn tomorrow() -> String {
        (Utc::now().date_naive() + Duration::days(1))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn yesterday() -> String {
        (Utc::now().date_naive() - Duration::days(1))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn booking(service_id: i64, date: &str, time: &str) -> NewAppointment {
        NewAppointment {
            service_id,
            date: date.to_string(),
            time: time.to_string(),
            notes: None,
        }
    }

    async fn fetch_appointment(pool: &SqlitePool, id: i64) -> AppointmentRow {
        sqlx::query_as::<_, AppointmentRow>(
            r#"SELECT id, client_id, staff_id, service_id, date, time, price, status, notes, created_at
               FROM appointments WHERE id = ?"#,
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("appointment row")
    }

    async fn appointment_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments")
            .fetch_one(pool)
            .await
            .expect("count")
    }

    async fn force_status(pool: &SqlitePool, id: i64, status: AppointmentStatus) {
        sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(pool)
            .await
            .expect("force status");
    }

    async fn notification_count(pool: &SqlitePool, user_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .expect("notification count")
    }

    #[tokio::test]
    async fn booking_happy_path() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking succeeds");

        let row = fetch_appointment(&fx.state.db, id).await;
        assert_eq!(row.status, "pending");
        assert_eq!(row.staff_id, None);
        assert_eq!(row.price, 120.0);
        assert_eq!(row.time, "14:00");

        // Client and the admin both got a notification.
        assert_eq!(notification_count(&fx.state.db, fx.client).await, 1);
        assert_eq!(notification_count(&fx.state.db, fx.admin.id).await, 1);
    }

    #[tokio::test]
    async fn booking_rejects_taken_slot() {
        let fx = setup().await;
        let date = tomorrow();

        create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "14:00"))
            .await
            .expect("first booking");

        let err = create_appointment(&fx.state, fx.other_client, booking(FACIAL, &date, "14:00"))
            .await
            .expect_err("second booking must fail");
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(appointment_count(&fx.state.db).await, 1);
    }

    #[tokio::test]
    async fn same_slot_for_another_service_is_fine() {
        let fx = setup().await;
        let date = tomorrow();

        create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "14:00"))
            .await
            .expect("first booking");
        create_appointment(&fx.state, fx.other_client, booking(HAIRCUT, &date, "14:00"))
            .await
            .expect("different service shares the instant");
    }

    #[tokio::test]
    async fn booking_rejects_past_date() {
        let fx = setup().await;

        let err = create_appointment(&fx.state, fx.client, booking(FACIAL, &yesterday(), "14:00"))
            .await
            .expect_err("past date must fail");
        assert!(matches!(err, ApiError::Invalid(_)));
        assert_eq!(appointment_count(&fx.state.db).await, 0);
    }

    #[tokio::test]
    async fn booking_rejects_malformed_slot() {
        let fx = setup().await;

        let err = create_appointment(&fx.state, fx.client, booking(FACIAL, "not-a-date", "14:00"))
            .await
            .expect_err("garbage date");
        assert!(matches!(err, ApiError::Invalid(_)));

        let err = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), ""))
            .await
            .expect_err("empty time");
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[tokio::test]
    async fn booking_rejects_unknown_service() {
        let fx = setup().await;

        let err = create_appointment(&fx.state, fx.client, booking(999, &tomorrow(), "14:00"))
            .await
            .expect_err("unknown service");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn price_is_snapshotted_at_booking_time() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");

        sqlx::query("UPDATE services SET price = 999.0 WHERE id = ?")
            .bind(FACIAL)
            .execute(&fx.state.db)
            .await
            .expect("reprice");

        let row = fetch_appointment(&fx.state.db, id).await;
        assert_eq!(row.price, 120.0);
    }

    #[tokio::test]
    async fn edit_falls_back_to_stored_fields() {
        let fx = setup().await;
        let date = tomorrow();

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "14:00"))
            .await
            .expect("booking");

        edit_appointment(
            &fx.state,
            fx.client,
            id,
            AppointmentEdit {
                time: Some("16:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("edit succeeds");

        let row = fetch_appointment(&fx.state.db, id).await;
        assert_eq!(row.date, date);
        assert_eq!(row.time, "16:00");
        assert_eq!(row.service_id, FACIAL);
        assert_eq!(row.price, 120.0);
    }

    #[tokio::test]
    async fn edit_rejects_slot_held_by_other_appointment() {
        let fx = setup().await;
        let date = tomorrow();

        create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "14:00"))
            .await
            .expect("first booking");
        let second =
            create_appointment(&fx.state, fx.other_client, booking(FACIAL, &date, "16:00"))
                .await
                .expect("second booking");

        let err = edit_appointment(
            &fx.state,
            fx.other_client,
            second,
            AppointmentEdit {
                time: Some("14:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("slot is held");
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn edit_to_its_own_slot_is_not_a_conflict() {
        let fx = setup().await;
        let date = tomorrow();

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "14:00"))
            .await
            .expect("booking");

        edit_appointment(
            &fx.state,
            fx.client,
            id,
            AppointmentEdit {
                date: Some(date.clone()),
                time: Some("14:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("no-op edit keeps its own slot");
    }

    #[tokio::test]
    async fn edit_rejects_past_date() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");

        let err = edit_appointment(
            &fx.state,
            fx.client,
            id,
            AppointmentEdit {
                date: Some(yesterday()),
                ..Default::default()
            },
        )
        .await
        .expect_err("past date");
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[tokio::test]
    async fn edit_reprices_when_service_changes() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");

        edit_appointment(
            &fx.state,
            fx.client,
            id,
            AppointmentEdit {
                service_id: Some(HAIRCUT),
                ..Default::default()
            },
        )
        .await
        .expect("service switch");

        let row = fetch_appointment(&fx.state.db, id).await;
        assert_eq!(row.service_id, HAIRCUT);
        assert_eq!(row.price, 45.0);
    }

    #[tokio::test]
    async fn edit_refuses_completed_appointment() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");
        force_status(&fx.state.db, id, AppointmentStatus::Completed).await;

        let err = edit_appointment(
            &fx.state,
            fx.client,
            id,
            AppointmentEdit {
                time: Some("16:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("completed is immutable");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_refuses_foreign_appointment() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");

        let err = edit_appointment(
            &fx.state,
            fx.other_client,
            id,
            AppointmentEdit {
                time: Some("16:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("not the owner");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_deletes_the_row_once() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");

        cancel_appointment(&fx.state, fx.client, id)
            .await
            .expect("cancel succeeds");
        assert_eq!(appointment_count(&fx.state.db).await, 0);

        let err = cancel_appointment(&fx.state, fx.client, id)
            .await
            .expect_err("second cancel finds nothing");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_blocked_on_completed() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");
        force_status(&fx.state.db, id, AppointmentStatus::Completed).await;

        let err = cancel_appointment(&fx.state, fx.client, id)
            .await
            .expect_err("completed cannot be cancelled");
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(appointment_count(&fx.state.db).await, 1);
    }

    #[tokio::test]
    async fn admin_delete_ignores_ownership() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "14:00"))
            .await
            .expect("booking");

        admin_delete_appointment(&fx.state, &fx.admin, id)
            .await
            .expect("admin removes it");
        assert_eq!(appointment_count(&fx.state.db).await, 0);
    }

    #[tokio::test]
    async fn assign_staff_happy_path() {
        let fx = setup().await;
        let date = tomorrow();

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "10:00"))
            .await
            .expect("booking");

        assign_staff(
            &fx.state,
            &fx.admin,
            id,
            StaffAssignment {
                staff_id: fx.staff,
                date: date.clone(),
                time: "10:00".to_string(),
            },
        )
        .await
        .expect("assignment succeeds");

        let row = fetch_appointment(&fx.state.db, id).await;
        assert_eq!(row.staff_id, Some(fx.staff));
        assert_eq!(notification_count(&fx.state.db, fx.staff).await, 1);
    }

    #[tokio::test]
    async fn assign_staff_rejects_double_booking() {
        let fx = setup().await;
        let date = tomorrow();

        let first = create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "10:00"))
            .await
            .expect("first booking");
        let second =
            create_appointment(&fx.state, fx.other_client, booking(HAIRCUT, &date, "10:00"))
                .await
                .expect("second booking");

        assign_staff(
            &fx.state,
            &fx.admin,
            first,
            StaffAssignment {
                staff_id: fx.staff,
                date: date.clone(),
                time: "10:00".to_string(),
            },
        )
        .await
        .expect("first assignment");

        let err = assign_staff(
            &fx.state,
            &fx.admin,
            second,
            StaffAssignment {
                staff_id: fx.staff,
                date: date.clone(),
                time: "10:00".to_string(),
            },
        )
        .await
        .expect_err("staff is already booked");
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn assign_staff_rejects_stale_slot() {
        let fx = setup().await;
        let date = tomorrow();

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "10:00"))
            .await
            .expect("booking");

        let err = assign_staff(
            &fx.state,
            &fx.admin,
            id,
            StaffAssignment {
                staff_id: fx.staff,
                date,
                time: "11:00".to_string(),
            },
        )
        .await
        .expect_err("slot does not match");
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn assign_staff_rejects_non_staff_target() {
        let fx = setup().await;
        let date = tomorrow();

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "10:00"))
            .await
            .expect("booking");

        let err = assign_staff(
            &fx.state,
            &fx.admin,
            id,
            StaffAssignment {
                staff_id: fx.other_client,
                date,
                time: "10:00".to_string(),
            },
        )
        .await
        .expect_err("client is not staff");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_walks_forward_through_the_graph() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "10:00"))
            .await
            .expect("booking");

        for next in ["confirmed", "in_progress", "completed"] {
            update_status(&fx.state, &fx.admin, id, next)
                .await
                .expect("forward transition");
        }
        let row = fetch_appointment(&fx.state.db, id).await;
        assert_eq!(row.status, "completed");

        let err = update_status(&fx.state, &fx.admin, id, "pending")
            .await
            .expect_err("completed is terminal");
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn status_rejects_backward_and_skipping_moves() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "10:00"))
            .await
            .expect("booking");

        let err = update_status(&fx.state, &fx.admin, id, "completed")
            .await
            .expect_err("pending cannot jump to completed");
        assert!(matches!(err, ApiError::Conflict(_)));

        update_status(&fx.state, &fx.admin, id, "confirmed")
            .await
            .expect("confirm");
        let err = update_status(&fx.state, &fx.admin, id, "pending")
            .await
            .expect_err("no backward moves");
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn status_rejects_unknown_value() {
        let fx = setup().await;

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &tomorrow(), "10:00"))
            .await
            .expect("booking");

        let err = update_status(&fx.state, &fx.admin, id, "updated")
            .await
            .expect_err("not a status");
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[tokio::test]
    async fn staff_can_only_touch_assigned_appointments() {
        let fx = setup().await;
        let date = tomorrow();

        let id = create_appointment(&fx.state, fx.client, booking(FACIAL, &date, "10:00"))
            .await
            .expect("booking");

        let err = update_status(&fx.state, &staff_actor(fx.staff), id, "confirmed")
            .await
            .expect_err("unassigned staff");
        assert!(matches!(err, ApiError::Forbidden(_)));

        assign_staff(
            &fx.state,
            &fx.admin,
            id,
            StaffAssignment {
                staff_id: fx.staff,
                date,
                time: "10:00".to_string(),
            },
        )
        .await
        .expect("assignment");

        update_status(&fx.state, &staff_actor(fx.staff), id, "confirmed")
            .await
            .expect("assigned staff may transition");

        // The client heard about the confirmation: booking + confirmation.
        assert_eq!(notification_count(&fx.state.db, fx.client).await, 2);
    }

    #[tokio::test]
    async fn status_update_missing_appointment_is_not_found() {
        let fx = setup().await;

        let err = update_status(&fx.state, &fx.admin, 42, "confirmed")
            .await
            .expect_err("nothing to update");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn pagination_is_one_based_with_fixed_page_size() {
        assert_eq!(page_offset(1), 0);
        assert_eq!(page_offset(2), 10);
        assert_eq!(page_offset(5), 40);
        // Page 0 or negatives clamp to the first page.
        assert_eq!(page_offset(0), 0);
        assert_eq!(page_offset(-3), 0);
    }
}
