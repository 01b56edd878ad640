use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{staff_validator, AuthUser},
    error::ApiError,
    models::{AppointmentDetailRow, WorkLogRow},
    respond, scheduling,
    state::AppState,
    worklog,
};

#[derive(Deserialize)]
struct PageQuery {
    page: Option<i64>,
}

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

#[derive(Serialize)]
struct AppointmentView {
    id: i64,
    client_name: String,
    service: String,
    date: String,
    time: String,
    price: f64,
    status: String,
    notes: Option<String>,
}

#[derive(Serialize)]
struct WorkLogView {
    id: i64,
    check_in: String,
    check_out: Option<String>,
    duration_minutes: Option<i64>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/staff")
            .wrap(HttpAuthentication::basic(staff_validator))
            .service(web::resource("/appointments").route(web::get().to(list_appointments)))
            .service(
                web::resource("/appointments/{id}/status").route(web::post().to(update_status)),
            )
            .service(web::resource("/worklog").route(web::get().to(list_worklog)))
            .service(web::resource("/worklog/check-in").route(web::post().to(check_in)))
            .service(web::resource("/worklog/check-out").route(web::post().to(check_out))),
    );
}

async fn list_appointments(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let offset = scheduling::page_offset(query.page.unwrap_or(1));
    let rows = sqlx::query_as::<_, AppointmentDetailRow>(
        r#"SELECT a.id, a.client_id, a.staff_id, a.service_id, a.date, a.time,
                  a.price, a.status, a.notes, a.created_at,
                  c.display_name AS client_name,
                  u.display_name AS staff_name,
                  s.name AS service_name
           FROM appointments a
           JOIN users c ON a.client_id = c.id
           LEFT JOIN users u ON a.staff_id = u.id
           JOIN services s ON a.service_id = s.id
           WHERE a.staff_id = ?
           ORDER BY a.date, a.time
           LIMIT ? OFFSET ?"#,
    )
    .bind(auth.id)
    .bind(scheduling::PER_PAGE)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let appointments: Vec<AppointmentView> = rows
        .into_iter()
        .map(|row| AppointmentView {
            id: row.id,
            client_name: row.client_name,
            service: row.service_name,
            date: row.date,
            time: row.time,
            price: row.price,
            status: row.status,
            notes: row.notes,
        })
        .collect();
    Ok(respond::success_with("appointments", appointments))
}

async fn update_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<StatusForm>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = path
        .into_inner()
        .parse::<i64>()
        .map_err(|_| ApiError::Invalid("appointment id must be numeric".to_string()))?;
    scheduling::update_status(&state, &auth, appointment_id, &payload.status).await?;
    Ok(respond::success("status updated"))
}

async fn check_in(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    worklog::check_in(&state.db, auth.id).await?;
    Ok(respond::success("checked in"))
}

async fn check_out(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let duration_minutes = worklog::check_out(&state.db, auth.id).await?;
    Ok(respond::success_with(
        "checked out",
        json!({ "duration_minutes": duration_minutes }),
    ))
}

async fn list_worklog(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let rows: Vec<WorkLogRow> = worklog::recent(&state.db, auth.id).await?;
    let sessions: Vec<WorkLogView> = rows
        .into_iter()
        .map(|row| WorkLogView {
            id: row.id,
            check_in: row.check_in,
            check_out: row.check_out,
            duration_minutes: row.duration_minutes,
        })
        .collect();
    Ok(respond::success_with("work log", sessions))
}
