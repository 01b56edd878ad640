use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::models::AppointmentDetailRow;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
}

/// Broadcast after a scheduling transaction commits; consumed by the
/// dashboard event stream.
#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub appointment_id: Option<i64>,
    pub status: Option<String>,
    pub client_name: Option<String>,
    pub staff_name: Option<String>,
    pub service: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

impl ServerEvent {
    pub fn from_detail(kind: &str, row: AppointmentDetailRow) -> Self {
        Self {
            kind: kind.to_string(),
            appointment_id: Some(row.id),
            status: Some(row.status),
            client_name: Some(row.client_name),
            staff_name: row.staff_name,
            service: Some(row.service_name),
            date: Some(row.date),
            time: Some(row.time),
        }
    }
}
