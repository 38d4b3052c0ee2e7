//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `AttendanceStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use attendance_core::domain::{
    AttendanceFilter, AttendanceRecord, EmbeddingWithStudent, FaceEmbedding, NewAttendance,
    Student,
};
use attendance_core::ports::{AttendanceStore, PortError, PortResult};
use attendance_core::service::day_bounds;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `AttendanceStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn storage(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct StudentRecord {
    id: String,
    name: String,
    email: String,
    is_trained: bool,
    created_at: DateTime<Utc>,
}
impl StudentRecord {
    fn to_domain(self) -> Student {
        Student {
            id: self.id,
            name: self.name,
            email: self.email,
            is_trained: self.is_trained,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct EmbeddingRecord {
    id: Uuid,
    student_id: String,
    vector: Vec<f32>,
    photo_number: i32,
    created_at: DateTime<Utc>,
}
impl EmbeddingRecord {
    fn to_domain(self) -> FaceEmbedding {
        FaceEmbedding {
            id: self.id,
            student_id: self.student_id,
            vector: self.vector,
            photo_number: self.photo_number,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct EmbeddingJoinRecord {
    id: Uuid,
    student_id: String,
    student_name: String,
    student_email: String,
    vector: Vec<f32>,
    photo_number: i32,
}
impl EmbeddingJoinRecord {
    fn to_domain(self) -> EmbeddingWithStudent {
        EmbeddingWithStudent {
            id: self.id,
            student_id: self.student_id,
            student_name: self.student_name,
            student_email: self.student_email,
            vector: self.vector,
            photo_number: self.photo_number,
        }
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    id: Uuid,
    student_id: String,
    student_name: String,
    room_id: String,
    confidence: Option<f64>,
    timestamp: DateTime<Utc>,
}
impl AttendanceRow {
    fn to_domain(self) -> AttendanceRecord {
        AttendanceRecord {
            id: self.id,
            student_id: self.student_id,
            student_name: self.student_name,
            room_id: self.room_id,
            confidence: self.confidence,
            timestamp: self.timestamp,
        }
    }
}

//=========================================================================================
// `AttendanceStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AttendanceStore for DbAdapter {
    async fn create_student(&self, id: &str, name: &str, email: &str) -> PortResult<Student> {
        let record = sqlx::query_as::<_, StudentRecord>(
            "INSERT INTO students (id, name, email) VALUES ($1, $2, $3) \
             RETURNING id, name, email, is_trained, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(record.to_domain())
    }

    async fn list_students(&self) -> PortResult<Vec<Student>> {
        let records = sqlx::query_as::<_, StudentRecord>(
            "SELECT id, name, email, is_trained, created_at FROM students ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_untrained_students(&self) -> PortResult<Vec<Student>> {
        let records = sqlx::query_as::<_, StudentRecord>(
            "SELECT id, name, email, is_trained, created_at FROM students \
             WHERE is_trained = FALSE ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn set_student_trained(&self, student_id: &str) -> PortResult<Option<Student>> {
        let record = sqlx::query_as::<_, StudentRecord>(
            "UPDATE students SET is_trained = TRUE WHERE id = $1 \
             RETURNING id, name, email, is_trained, created_at",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn insert_embedding(
        &self,
        student_id: &str,
        vector: &[f32],
        photo_number: i32,
    ) -> PortResult<FaceEmbedding> {
        let record = sqlx::query_as::<_, EmbeddingRecord>(
            "INSERT INTO face_embeddings (id, student_id, vector, photo_number) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, student_id, vector, photo_number, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(vector)
        .bind(photo_number)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(record.to_domain())
    }

    async fn list_embeddings_with_students(&self) -> PortResult<Vec<EmbeddingWithStudent>> {
        let records = sqlx::query_as::<_, EmbeddingJoinRecord>(
            "SELECT e.id, e.student_id, s.name AS student_name, s.email AS student_email, \
                    e.vector, e.photo_number \
             FROM face_embeddings e \
             JOIN students s ON s.id = e.student_id \
             ORDER BY s.name ASC, e.photo_number ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn latest_attendance_since(
        &self,
        student_id: &str,
        room_id: &str,
        since: DateTime<Utc>,
    ) -> PortResult<Option<AttendanceRecord>> {
        let record = sqlx::query_as::<_, AttendanceRow>(
            "SELECT id, student_id, student_name, room_id, confidence, timestamp \
             FROM attendance_records \
             WHERE student_id = $1 AND room_id = $2 AND timestamp > $3 \
             ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(student_id)
        .bind(room_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn insert_attendance(&self, new: NewAttendance) -> PortResult<AttendanceRecord> {
        let record = sqlx::query_as::<_, AttendanceRow>(
            "INSERT INTO attendance_records \
                 (id, student_id, student_name, room_id, confidence, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, student_id, student_name, room_id, confidence, timestamp",
        )
        .bind(Uuid::new_v4())
        .bind(&new.student_id)
        .bind(&new.student_name)
        .bind(&new.room_id)
        .bind(new.confidence)
        .bind(new.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(record.to_domain())
    }

    async fn list_attendance(&self, filter: AttendanceFilter) -> PortResult<Vec<AttendanceRecord>> {
        // Optional filters collapse to `TRUE` when unset, keeping a single
        // prepared statement for every filter combination.
        let (day_start, day_end) = match filter.day {
            Some(day) => {
                let (start, end) = day_bounds(day);
                (Some(start), Some(end))
            }
            None => (None, None),
        };

        let records = sqlx::query_as::<_, AttendanceRow>(
            "SELECT id, student_id, student_name, room_id, confidence, timestamp \
             FROM attendance_records \
             WHERE ($1::TEXT IS NULL OR student_id = $1) \
               AND ($2::TEXT IS NULL OR room_id = $2) \
               AND ($3::TIMESTAMPTZ IS NULL OR (timestamp >= $3 AND timestamp < $4)) \
             ORDER BY timestamp DESC",
        )
        .bind(filter.student_id)
        .bind(filter.room_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
