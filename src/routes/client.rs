use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{client_validator, AuthUser},
    error::ApiError,
    models::AppointmentDetailRow,
    notify, respond,
    scheduling::{self, AppointmentEdit, NewAppointment},
    state::AppState,
};

#[derive(Deserialize)]
struct PageQuery {
    page: Option<i64>,
}

#[derive(Serialize)]
struct AppointmentView {
    id: i64,
    service: String,
    date: String,
    time: String,
    price: f64,
    status: String,
    staff_name: Option<String>,
    notes: Option<String>,
}

#[derive(Serialize)]
struct NotificationView {
    id: i64,
    title: String,
    message: String,
    is_read: bool,
    created_at: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(HttpAuthentication::basic(client_validator))
            .service(
                web::resource("/appointments")
                    .route(web::get().to(list_appointments))
                    .route(web::post().to(create_appointment)),
            )
            .service(web::resource("/appointments/{id}").route(web::post().to(edit_appointment)))
            .service(
                web::resource("/appointments/{id}/cancel")
                    .route(web::post().to(cancel_appointment)),
            )
            .service(web::resource("/notifications").route(web::get().to(list_notifications))),
    );
}

async fn create_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<NewAppointment>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id =
        scheduling::create_appointment(&state, auth.id, payload.into_inner()).await?;
    Ok(respond::success_with(
        "booking created",
        json!({ "appointment_id": appointment_id }),
    ))
}

async fn edit_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<AppointmentEdit>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = parse_id(&path.into_inner())?;
    scheduling::edit_appointment(&state, auth.id, appointment_id, payload.into_inner()).await?;
    Ok(respond::success("booking updated"))
}

async fn cancel_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = parse_id(&path.into_inner())?;
    scheduling::cancel_appointment(&state, auth.id, appointment_id).await?;
    Ok(respond::success("booking cancelled"))
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
           WHERE a.client_id = ?
           ORDER BY a.created_at DESC
           LIMIT ? OFFSET ?"#,
    )
    .bind(auth.id)
    .bind(scheduling::PER_PAGE)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let appointments: Vec<AppointmentView> = rows.into_iter().map(to_view).collect();
    Ok(respond::success_with("appointments", appointments))
}

async fn list_notifications(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let offset = scheduling::page_offset(query.page.unwrap_or(1));
    let rows = notify::fetch_inbox(&state.db, auth.id, scheduling::PER_PAGE, offset).await?;

    let notifications: Vec<NotificationView> = rows
        .into_iter()
        .map(|row| NotificationView {
            id: row.id,
            title: row.title,
            message: row.message,
            is_read: row.is_read != 0,
            created_at: row.created_at,
        })
        .collect();
    Ok(respond::success_with("notifications", notifications))
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::Invalid("appointment id must be numeric".to_string()))
}

fn to_view(row: AppointmentDetailRow) -> AppointmentView {
    AppointmentView {
        id: row.id,
        service: row.service_name,
        date: row.date,
        time: row.time,
        price: row.price,
        status: row.status,
        staff_name: row.staff_name,
        notes: row.notes,
    }
}
