//! crates/attendance_core/src/ports.rs
//!
//! Defines the storage contract (trait) for the application's core logic.
//! This trait forms the boundary of the hexagonal architecture, allowing the
//! core to be independent of the specific database behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AttendanceFilter, AttendanceRecord, EmbeddingWithStudent, FaceEmbedding, NewAttendance,
    Student,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the storage engine.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port (Trait)
//=========================================================================================

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    // --- Students ---
    async fn create_student(&self, id: &str, name: &str, email: &str) -> PortResult<Student>;

    async fn list_students(&self) -> PortResult<Vec<Student>>;

    async fn list_untrained_students(&self) -> PortResult<Vec<Student>>;

    /// Flips `is_trained` to true. Returns `None` when no row matches the id;
    /// the caller treats that as success with an empty payload.
    async fn set_student_trained(&self, student_id: &str) -> PortResult<Option<Student>>;

    // --- Face embeddings ---
    async fn insert_embedding(
        &self,
        student_id: &str,
        vector: &[f32],
        photo_number: i32,
    ) -> PortResult<FaceEmbedding>;

    async fn list_embeddings_with_students(&self) -> PortResult<Vec<EmbeddingWithStudent>>;

    // --- Attendance ledger ---
    /// The most recent ledger entry for `(student_id, room_id)` recorded
    /// after `since` (strictly), if any. Entries exactly the cooldown apart
    /// do not conflict.
    async fn latest_attendance_since(
        &self,
        student_id: &str,
        room_id: &str,
        since: DateTime<Utc>,
    ) -> PortResult<Option<AttendanceRecord>>;

    async fn insert_attendance(&self, new: NewAttendance) -> PortResult<AttendanceRecord>;

    /// Ledger entries matching the filter, newest first.
    async fn list_attendance(&self, filter: AttendanceFilter) -> PortResult<Vec<AttendanceRecord>>;
}
