//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use attendance_core::domain::{
    AttendanceFilter, AttendanceRecord, EmbeddingWithStudent, FaceEmbedding, Student,
};
use attendance_core::ports::PortError;
use attendance_core::service::{self, ConfirmError, ConfirmRequest, TrainingError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_students_handler,
        create_student_handler,
        list_untrained_students_handler,
        mark_trained_handler,
        create_descriptor_handler,
        list_descriptors_handler,
        confirm_attendance_handler,
        list_attendance_handler,
    ),
    components(
        schemas(
            HealthResponse,
            StudentResponse,
            CreateStudentPayload,
            FaceDescriptorResponse,
            CreateDescriptorPayload,
            DescriptorWithStudentResponse,
            AttendanceResponse,
            ConfirmAttendancePayload,
            DuplicateAttendanceResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Attendance API", description = "API endpoints for the face-recognition attendance tool.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

/// A student as returned by every student-facing endpoint.
#[derive(Serialize, ToSchema)]
pub struct StudentResponse {
    id: String,
    name: String,
    email: String,
    is_trained: bool,
    created_at: DateTime<Utc>,
}

impl From<Student> for StudentResponse {
    fn from(s: Student) -> Self {
        Self {
            id: s.id,
            name: s.name,
            email: s.email,
            is_trained: s.is_trained,
            created_at: s.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateStudentPayload {
    id: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

/// A stored face descriptor row, as returned on creation.
#[derive(Serialize, ToSchema)]
pub struct FaceDescriptorResponse {
    id: Uuid,
    student_id: String,
    descriptor: Vec<f32>,
    photo_number: i32,
    created_at: DateTime<Utc>,
}

impl From<FaceEmbedding> for FaceDescriptorResponse {
    fn from(e: FaceEmbedding) -> Self {
        Self {
            id: e.id,
            student_id: e.student_id,
            descriptor: e.vector,
            photo_number: e.photo_number,
            created_at: e.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateDescriptorPayload {
    student_id: Option<String>,
    descriptor: Option<Vec<f32>>,
    photo_number: Option<i32>,
}

/// A face descriptor joined with its owning student, used to seed the
/// browser-side matcher.
#[derive(Serialize, ToSchema)]
pub struct DescriptorWithStudentResponse {
    id: Uuid,
    student_id: String,
    student_name: String,
    student_email: String,
    descriptor: Vec<f32>,
    photo_number: i32,
}

impl From<EmbeddingWithStudent> for DescriptorWithStudentResponse {
    fn from(e: EmbeddingWithStudent) -> Self {
        Self {
            id: e.id,
            student_id: e.student_id,
            student_name: e.student_name,
            student_email: e.student_email,
            descriptor: e.vector,
            photo_number: e.photo_number,
        }
    }
}

/// An attendance ledger entry.
#[derive(Serialize, ToSchema)]
pub struct AttendanceResponse {
    id: Uuid,
    student_id: String,
    student_name: String,
    room_id: String,
    confidence: Option<f64>,
    timestamp: DateTime<Utc>,
}

impl From<AttendanceRecord> for AttendanceResponse {
    fn from(r: AttendanceRecord) -> Self {
        Self {
            id: r.id,
            student_id: r.student_id,
            student_name: r.student_name,
            room_id: r.room_id,
            confidence: r.confidence,
            timestamp: r.timestamp,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ConfirmAttendancePayload {
    student_id: Option<String>,
    student_name: Option<String>,
    room_id: Option<String>,
    confidence: Option<f64>,
}

/// The 409 body for a confirmation rejected by the cooldown window.
#[derive(Serialize, ToSchema)]
pub struct DuplicateAttendanceResponse {
    error: String,
    #[serde(rename = "lastAttendance")]
    last_attendance: AttendanceResponse,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
pub struct AttendanceQuery {
    student_id: Option<String>,
    room_id: Option<String>,
    /// Calendar date, `YYYY-MM-DD`.
    date: Option<String>,
}

//=========================================================================================
// Error mapping
//=========================================================================================

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}

fn internal_error(context: &str, err: PortError) -> Response {
    error!("{}: {:?}", context, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: context.to_string(),
        }),
    )
        .into_response()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is running", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// List all students, ordered by name.
#[utoipa::path(
    get,
    path = "/students",
    responses(
        (status = 200, description = "All students", body = [StudentResponse]),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn list_students_handler(State(app_state): State<Arc<AppState>>) -> Response {
    match app_state.store.list_students().await {
        Ok(students) => Json(
            students
                .into_iter()
                .map(StudentResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => internal_error("Failed to list students", e),
    }
}

/// Register a new student.
#[utoipa::path(
    post,
    path = "/students",
    request_body = CreateStudentPayload,
    responses(
        (status = 201, description = "Student created", body = StudentResponse),
        (status = 400, description = "Missing required field", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn create_student_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateStudentPayload>,
) -> Response {
    let (id, name, email) = match (
        non_empty(payload.id),
        non_empty(payload.name),
        non_empty(payload.email),
    ) {
        (Some(id), Some(name), Some(email)) => (id, name, email),
        (None, _, _) => return bad_request("id is required".to_string()),
        (_, None, _) => return bad_request("name is required".to_string()),
        (_, _, None) => return bad_request("email is required".to_string()),
    };

    match app_state.store.create_student(&id, &name, &email).await {
        Ok(student) => {
            (StatusCode::CREATED, Json(StudentResponse::from(student))).into_response()
        }
        Err(e) => internal_error("Failed to create student", e),
    }
}

/// List students that still need training photos.
#[utoipa::path(
    get,
    path = "/students/untrained",
    responses(
        (status = 200, description = "Students with is_trained = false", body = [StudentResponse]),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn list_untrained_students_handler(State(app_state): State<Arc<AppState>>) -> Response {
    match app_state.store.list_untrained_students().await {
        Ok(students) => Json(
            students
                .into_iter()
                .map(StudentResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => internal_error("Failed to list untrained students", e),
    }
}

/// Flip a student to trained. Idempotent; an unknown id yields `null`.
#[utoipa::path(
    post,
    path = "/students/{id}/trained",
    params(("id" = String, Path, description = "The student's id.")),
    responses(
        (status = 200, description = "Updated student, or null for an unknown id", body = StudentResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn mark_trained_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match service::mark_trained(app_state.store.as_ref(), &id).await {
        Ok(student) => Json(student.map(StudentResponse::from)).into_response(),
        Err(TrainingError::Validation(msg)) => bad_request(msg),
        Err(TrainingError::Storage(e)) => internal_error("Failed to mark student trained", e),
    }
}

/// Store one training face descriptor for a student.
#[utoipa::path(
    post,
    path = "/face-descriptors",
    request_body = CreateDescriptorPayload,
    responses(
        (status = 201, description = "Descriptor stored", body = FaceDescriptorResponse),
        (status = 400, description = "Missing required field", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn create_descriptor_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateDescriptorPayload>,
) -> Response {
    match service::add_embedding(
        app_state.store.as_ref(),
        payload.student_id,
        payload.descriptor,
        payload.photo_number,
    )
    .await
    {
        Ok(embedding) => (
            StatusCode::CREATED,
            Json(FaceDescriptorResponse::from(embedding)),
        )
            .into_response(),
        Err(TrainingError::Validation(msg)) => bad_request(msg),
        Err(TrainingError::Storage(e)) => internal_error("Failed to store descriptor", e),
    }
}

/// List every stored descriptor joined with its owning student.
#[utoipa::path(
    get,
    path = "/face-descriptors",
    responses(
        (status = 200, description = "Descriptors with owning students", body = [DescriptorWithStudentResponse]),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn list_descriptors_handler(State(app_state): State<Arc<AppState>>) -> Response {
    match app_state.store.list_embeddings_with_students().await {
        Ok(embeddings) => Json(
            embeddings
                .into_iter()
                .map(DescriptorWithStudentResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => internal_error("Failed to list descriptors", e),
    }
}

/// Record an attendance event for a recognized face.
///
/// Rejects a repeat for the same student and room within the cooldown
/// window; the 409 body carries the conflicting record so the frontend can
/// suppress repeated confirmations for the same face.
#[utoipa::path(
    post,
    path = "/attendance/confirm",
    request_body = ConfirmAttendancePayload,
    responses(
        (status = 201, description = "Attendance recorded", body = AttendanceResponse),
        (status = 400, description = "Missing required field", body = ErrorResponse),
        (status = 409, description = "Already recorded within the cooldown window", body = DuplicateAttendanceResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn confirm_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmAttendancePayload>,
) -> Response {
    let request = ConfirmRequest {
        student_id: payload.student_id,
        student_name: payload.student_name,
        room_id: payload.room_id,
        confidence: payload.confidence,
    };

    match service::confirm(app_state.store.as_ref(), request).await {
        Ok(record) => {
            (StatusCode::CREATED, Json(AttendanceResponse::from(record))).into_response()
        }
        Err(ConfirmError::Validation(msg)) => bad_request(msg),
        Err(ConfirmError::Duplicate(existing)) => (
            StatusCode::CONFLICT,
            Json(DuplicateAttendanceResponse {
                error: format!(
                    "Attendance already recorded within the last {} minutes",
                    service::COOLDOWN_MINUTES
                ),
                last_attendance: AttendanceResponse::from(existing),
            }),
        )
            .into_response(),
        Err(ConfirmError::Storage(e)) => internal_error("Failed to record attendance", e),
    }
}

/// List attendance records, newest first, optionally filtered.
#[utoipa::path(
    get,
    path = "/attendance",
    params(
        ("student_id" = Option<String>, Query, description = "Filter by student id."),
        ("room_id" = Option<String>, Query, description = "Filter by room id."),
        ("date" = Option<String>, Query, description = "Filter by calendar date, YYYY-MM-DD.")
    ),
    responses(
        (status = 200, description = "Matching records, newest first", body = [AttendanceResponse]),
        (status = 400, description = "Malformed date", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn list_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<AttendanceQuery>,
) -> Response {
    let day = match query.date.as_deref() {
        Some(raw) => match raw.parse::<NaiveDate>() {
            Ok(day) => Some(day),
            Err(_) => return bad_request(format!("'{}' is not a valid YYYY-MM-DD date", raw)),
        },
        None => None,
    };

    let filter = AttendanceFilter {
        student_id: query.student_id,
        room_id: query.room_id,
        day,
    };

    match app_state.store.list_attendance(filter).await {
        Ok(records) => Json(
            records
                .into_iter()
                .map(AttendanceResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => internal_error("Failed to list attendance", e),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
