//! crates/attendance_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database; serde derives are present
//! because the HTTP layer returns them unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A student known to the system. `id` is assigned by the caller (e.g. a
/// school's own student number), not generated here.
#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_trained: bool,
    pub created_at: DateTime<Utc>,
}

/// One reference face embedding captured during training.
///
/// The vector length is fixed by the external face-recognition model
/// (128 for the reference model). Rows are immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct FaceEmbedding {
    pub id: Uuid,
    pub student_id: String,
    pub vector: Vec<f32>,
    pub photo_number: i32,
    pub created_at: DateTime<Utc>,
}

/// A face embedding joined with its owning student, as returned by the
/// descriptor listing used to seed the browser-side matcher.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingWithStudent {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub vector: Vec<f32>,
    pub photo_number: i32,
}

/// One append-only attendance event. `student_name` is denormalized at
/// write time so the ledger stays readable even if students change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub room_id: String,
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// The values for a ledger append, produced by the confirmation service
/// after validation and the cooldown check.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub student_id: String,
    pub student_name: String,
    pub room_id: String,
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Filter for the attendance listing. All fields optional; `day` expands to
/// the inclusive UTC-day timestamp range.
#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub student_id: Option<String>,
    pub room_id: Option<String>,
    pub day: Option<NaiveDate>,
}
