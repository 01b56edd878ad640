use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{admin_validator, create_user, AuthUser},
    db,
    error::ApiError,
    models::{
        ActivityRow, AppointmentDetailRow, AppointmentStatus, UserRow, ROLE_STAFF,
    },
    respond,
    scheduling::{self, StaffAssignment},
    state::AppState,
};

#[derive(Serialize)]
struct StatCard {
    label: String,
    value: i64,
}

#[derive(Serialize)]
struct AppointmentView {
    id: i64,
    client_id: i64,
    client_name: String,
    service_id: i64,
    service: String,
    date: String,
    time: String,
    price: f64,
    status: String,
    staff_id: Option<i64>,
    staff_name: Option<String>,
    notes: Option<String>,
    created_at: String,
}

#[derive(Serialize)]
struct ActivityView {
    message: String,
    created_at: String,
}

#[derive(Serialize)]
struct StaffView {
    id: i64,
    username: String,
    display_name: String,
    active: bool,
}

#[derive(Deserialize)]
struct AppointmentFilter {
    page: Option<i64>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

#[derive(Deserialize)]
struct StaffCreateForm {
    username: String,
    display_name: String,
    password: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/appointments").route(web::get().to(list_appointments)))
            .service(
                web::resource("/appointments/{id}/assign").route(web::post().to(assign_staff)),
            )
            .service(
                web::resource("/appointments/{id}/status").route(web::post().to(update_status)),
            )
            .service(
                web::resource("/appointments/{id}/delete")
                    .route(web::post().to(delete_appointment)),
            )
            .service(
                web::resource("/staff")
                    .route(web::get().to(list_staff))
                    .route(web::post().to(create_staff)),
            ),
    );
}

async fn dashboard(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let total = count("SELECT COUNT(*) FROM appointments", &state).run().await;
    let pending = count(
        "SELECT COUNT(*) FROM appointments WHERE status = 'pending'",
        &state,
    )
    .run()
    .await;
    let confirmed = count(
        "SELECT COUNT(*) FROM appointments WHERE status = 'confirmed'",
        &state,
    )
    .run()
    .await;
    let completed = count(
        "SELECT COUNT(*) FROM appointments WHERE status = 'completed'",
        &state,
    )
    .run()
    .await;
    let staff = count(
        "SELECT COUNT(*) FROM users WHERE role = 'staff' AND active = 1",
        &state,
    )
    .run()
    .await;

    let stats = vec![
        StatCard {
            label: "Total appointments".to_string(),
            value: total,
        },
        StatCard {
            label: "Pending review".to_string(),
            value: pending,
        },
        StatCard {
            label: "Confirmed".to_string(),
            value: confirmed,
        },
        StatCard {
            label: "Completed".to_string(),
            value: completed,
        },
        StatCard {
            label: "Active staff".to_string(),
            value: staff,
        },
    ];

    let activity_rows = sqlx::query_as::<_, ActivityRow>(
        "SELECT message, created_at FROM activities ORDER BY id DESC LIMIT 10",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let recent_activity: Vec<ActivityView> = activity_rows
        .into_iter()
        .map(|row| ActivityView {
            message: row.message,
            created_at: row.created_at,
        })
        .collect();

    Ok(respond::success_with(
        "dashboard",
        json!({ "stats": stats, "recent_activity": recent_activity }),
    ))
}

async fn list_appointments(
    state: web::Data<AppState>,
    query: web::Query<AppointmentFilter>,
) -> Result<HttpResponse, ApiError> {
    let offset = scheduling::page_offset(query.page.unwrap_or(1));
    let status_filter = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            AppointmentStatus::parse(raw)
                .ok_or_else(|| ApiError::Invalid(format!("unknown status '{raw}'")))?,
        ),
        None => None,
    };

    let rows = if let Some(status) = status_filter {
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
               WHERE a.status = ?
               ORDER BY a.created_at DESC
               LIMIT ? OFFSET ?"#,
        )
        .bind(status.as_str())
        .bind(scheduling::PER_PAGE)
        .bind(offset)
        .fetch_all(&state.db)
        .await?
    } else {
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
               ORDER BY a.created_at DESC
               LIMIT ? OFFSET ?"#,
        )
        .bind(scheduling::PER_PAGE)
        .bind(offset)
        .fetch_all(&state.db)
        .await?
    };

    let appointments: Vec<AppointmentView> = rows.into_iter().map(to_view).collect();
    Ok(respond::success_with("appointments", appointments))
}

async fn assign_staff(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<StaffAssignment>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = parse_id(&path.into_inner())?;
    scheduling::assign_staff(&state, &auth, appointment_id, payload.into_inner()).await?;
    Ok(respond::success("staff assigned"))
}

async fn update_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<StatusForm>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = parse_id(&path.into_inner())?;
    scheduling::update_status(&state, &auth, appointment_id, &payload.status).await?;
    Ok(respond::success("status updated"))
}

async fn delete_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = parse_id(&path.into_inner())?;
    scheduling::admin_delete_appointment(&state, &auth, appointment_id).await?;
    Ok(respond::success("appointment removed"))
}

async fn list_staff(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, role, password_hash, active, created_at
           FROM users
           WHERE role = ?
           ORDER BY display_name"#,
    )
    .bind(ROLE_STAFF)
    .fetch_all(&state.db)
    .await?;

    let staff: Vec<StaffView> = rows
        .into_iter()
        .map(|user| StaffView {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            active: user.active == 1,
        })
        .collect();
    Ok(respond::success_with("staff", staff))
}

async fn create_staff(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<StaffCreateForm>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let mut errors = Vec::new();
    if payload.username.trim().is_empty() {
        errors.push("Username is required.");
    }
    if payload.display_name.trim().is_empty() {
        errors.push("Display name is required.");
    }
    if payload.password.trim().len() < 6 {
        errors.push("Password must be at least 6 characters.");
    }
    if !errors.is_empty() {
        return Err(ApiError::Invalid(errors.join(" ")));
    }

    let staff_id = create_user(
        &state.db,
        payload.username.trim(),
        payload.display_name.trim(),
        &payload.password,
        ROLE_STAFF,
    )
    .await?;

    db::log_activity(
        &state.db,
        "staff_created",
        &format!("{} created a staff profile.", auth.display_name),
        Some(auth.id),
        None,
    )
    .await;

    Ok(respond::success_with(
        "staff account created",
        json!({ "staff_id": staff_id }),
    ))
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::Invalid("appointment id must be numeric".to_string()))
}

fn to_view(row: AppointmentDetailRow) -> AppointmentView {
    AppointmentView {
        id: row.id,
        client_id: row.client_id,
        client_name: row.client_name,
        service_id: row.service_id,
        service: row.service_name,
        date: row.date,
        time: row.time,
        price: row.price,
        status: row.status,
        staff_id: row.staff_id,
        staff_name: row.staff_name,
        notes: row.notes,
        created_at: row.created_at,
    }
}

fn count(query: &str, state: &web::Data<AppState>) -> CountQuery {
    CountQuery {
        query: query.to_string(),
        state: state.clone(),
    }
}

struct CountQuery {
    query: String,
    state: web::Data<AppState>,
}

impl CountQuery {
    async fn run(self) -> i64 {
        sqlx::query_scalar::<_, i64>(&self.query)
            .fetch_one(&self.state.db)
            .await
            .unwrap_or(0)
    }
}
