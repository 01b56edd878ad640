use std::fmt;

use serde::Serialize;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";
pub const ROLE_CLIENT: &str = "client";

/// Appointment lifecycle. Transitions move forward only: pending ->
/// confirmed -> in_progress -> completed, with cancelled and no_show
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "in_progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
        )
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (AppointmentStatus::Pending, AppointmentStatus::Confirmed) => true,
            (AppointmentStatus::Confirmed, AppointmentStatus::InProgress) => true,
            (AppointmentStatus::InProgress, AppointmentStatus::Completed) => true,
            (from, AppointmentStatus::Cancelled) | (from, AppointmentStatus::NoShow) => {
                !from.is_terminal()
            }
            _ => false,
        }
    }

    /// Client-facing phrasing used in status notifications.
    pub fn client_message(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "is awaiting confirmation",
            AppointmentStatus::Confirmed => "has been confirmed",
            AppointmentStatus::InProgress => "is now in progress",
            AppointmentStatus::Completed => "has been completed",
            AppointmentStatus::Cancelled => "has been cancelled",
            AppointmentStatus::NoShow => "was marked as a no-show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub duration_minutes: i64,
    pub active: i64,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub client_id: i64,
    pub staff_id: Option<i64>,
    pub service_id: i64,
    pub date: String,
    pub time: String,
    pub price: f64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Appointment joined with client, staff and service display data.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentDetailRow {
    pub id: i64,
    pub client_id: i64,
    pub staff_id: Option<i64>,
    pub service_id: i64,
    pub date: String,
    pub time: String,
    pub price: f64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub client_name: String,
    pub staff_name: Option<String>,
    pub service_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub is_read: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkLogRow {
    pub id: i64,
    pub check_in: String,
    pub check_out: Option<String>,
    pub duration_minutes: Option<i64>,
}
