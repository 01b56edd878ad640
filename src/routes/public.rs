use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{authenticate_credentials, create_user, AUTH_REALM},
    error::ApiError,
    models::{ServiceRow, ROLE_CLIENT},
    respond,
    state::AppState,
};

#[derive(Deserialize)]
struct RegisterPayload {
    username: String,
    display_name: String,
    password: String,
}

#[derive(Serialize)]
struct ServiceView {
    id: i64,
    name: String,
    price: f64,
    duration_minutes: i64,
}

#[derive(Serialize)]
struct IdentityView {
    user_id: i64,
    display_name: String,
    role: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/api/login").route(web::get().to(login)))
        .service(web::resource("/api/register").route(web::post().to(register)))
        .service(web::resource("/api/services").route(web::get().to(list_services)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

/// Credential check for the frontend: echoes the authenticated identity
/// or challenges. Role always comes from the user row, never the caller.
async fn login(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    let user = match authenticate_credentials(&state, username, password).await {
        Some(user) => user,
        None => return auth_challenge(),
    };

    respond::success_with(
        "logged in",
        IdentityView {
            user_id: user.id,
            display_name: user.display_name,
            role: user.role,
        },
    )
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((
            header::WWW_AUTHENTICATE,
            format!("Basic realm=\"{}\"", AUTH_REALM),
        ))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(json!({ "status": "error", "message": "Unauthorized" }))
}

async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterPayload>,
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

    let user_id = create_user(
        &state.db,
        payload.username.trim(),
        payload.display_name.trim(),
        &payload.password,
        ROLE_CLIENT,
    )
    .await?;

    log::info!("registered client account {user_id}");
    Ok(respond::success_with(
        "account created",
        json!({ "user_id": user_id }),
    ))
}

async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, price, duration_minutes, active FROM services WHERE active = 1 ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;

    let services: Vec<ServiceView> = rows
        .into_iter()
        .map(|row| ServiceView {
            id: row.id,
            name: row.name,
            price: row.price,
            duration_minutes: row.duration_minutes,
        })
        .collect();

    Ok(respond::success_with("services", services))
}
