use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::json;

pub fn success(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "success", "message": message }))
}

pub fn success_with<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "success",
        "message": message,
        "data": data,
    }))
}
