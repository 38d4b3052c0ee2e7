//! crates/attendance_core/src/service.rs
//!
//! The attendance confirmation protocol and the training registration
//! operations. This is the only original control logic in the system;
//! everything else is a passthrough read or write against the store.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::domain::{AttendanceRecord, FaceEmbedding, NewAttendance, Student};
use crate::ports::{AttendanceStore, PortError};

/// Cooldown window for repeat attendance of the same student in the same room.
pub const COOLDOWN_MINUTES: i64 = 5;

/// Embeddings collected per student before training is considered complete.
/// The frontend drives the count; the server does not enforce it.
pub const EMBEDDINGS_PER_STUDENT: i32 = 5;

//=========================================================================================
// Errors
//=========================================================================================

/// Outcome of a rejected confirmation.
#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The cooldown window already holds a record for this student and room.
    /// Carries the conflicting record so callers can surface it.
    #[error("Attendance already recorded within the last {COOLDOWN_MINUTES} minutes")]
    Duplicate(AttendanceRecord),
    #[error(transparent)]
    Storage(#[from] PortError),
}

/// Outcome of a rejected training operation.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] PortError),
}

//=========================================================================================
// Attendance confirmation
//=========================================================================================

/// A proposed attendance event, as received from the recognizing frontend.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub room_id: Option<String>,
    pub confidence: Option<f64>,
}

/// Decides whether a proposed attendance event should be recorded and, if
/// accepted, appends it to the ledger.
///
/// The cooldown check and the insert are two separate store round trips with
/// no wrapping transaction, so two near-simultaneous confirmations for the
/// same student and room can both be admitted. Exactly-once is not guaranteed.
pub async fn confirm(
    store: &dyn AttendanceStore,
    request: ConfirmRequest,
) -> Result<AttendanceRecord, ConfirmError> {
    confirm_at(store, request, Utc::now()).await
}

/// As [`confirm`], with the clock supplied by the caller.
pub async fn confirm_at(
    store: &dyn AttendanceStore,
    request: ConfirmRequest,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, ConfirmError> {
    let student_id = require_non_empty("student_id", request.student_id)?;
    let student_name = require_non_empty("student_name", request.student_name)?;
    let room_id = require_non_empty("room_id", request.room_id)?;
    if let Some(confidence) = request.confidence {
        if !confidence.is_finite() {
            return Err(ConfirmError::Validation(
                "confidence must be a finite number".to_string(),
            ));
        }
    }

    let window_start = now - Duration::minutes(COOLDOWN_MINUTES);
    if let Some(existing) = store
        .latest_attendance_since(&student_id, &room_id, window_start)
        .await?
    {
        return Err(ConfirmError::Duplicate(existing));
    }

    let record = store
        .insert_attendance(NewAttendance {
            student_id,
            student_name,
            room_id,
            confidence: request.confidence,
            timestamp: now,
        })
        .await?;
    Ok(record)
}

//=========================================================================================
// Training registration
//=========================================================================================

/// Stores one reference embedding for a student.
///
/// `photo_number` is supplied by the frontend, which increments it
/// `1..=EMBEDDINGS_PER_STUDENT` across captures; the server checks presence,
/// not uniqueness.
pub async fn add_embedding(
    store: &dyn AttendanceStore,
    student_id: Option<String>,
    vector: Option<Vec<f32>>,
    photo_number: Option<i32>,
) -> Result<FaceEmbedding, TrainingError> {
    let student_id = match student_id {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Err(TrainingError::Validation(
                "student_id is required".to_string(),
            ))
        }
    };
    let vector = match vector {
        Some(v) if !v.is_empty() => v,
        _ => {
            return Err(TrainingError::Validation(
                "descriptor is required".to_string(),
            ))
        }
    };
    let photo_number = photo_number
        .ok_or_else(|| TrainingError::Validation("photo_number is required".to_string()))?;

    let embedding = store
        .insert_embedding(&student_id, &vector, photo_number)
        .await?;
    Ok(embedding)
}

/// Flips a student to trained. Idempotent: an already-trained student is a
/// no-op success, and an unknown id yields `Ok(None)`.
pub async fn mark_trained(
    store: &dyn AttendanceStore,
    student_id: &str,
) -> Result<Option<Student>, TrainingError> {
    let updated = store.set_student_trained(student_id).await?;
    Ok(updated)
}

//=========================================================================================
// Helpers
//=========================================================================================

/// The inclusive UTC timestamp range covering a calendar day, used by the
/// date-filtered attendance listing: `[00:00:00.000, 23:59:59.999...]`,
/// expressed as a half-open `[start, end)` pair.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let end = start + Duration::days(1);
    (start.and_utc(), end.and_utc())
}

fn require_non_empty(field: &str, value: Option<String>) -> Result<String, ConfirmError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfirmError::Validation(format!("{} is required", field))),
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttendanceFilter, EmbeddingWithStudent};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// In-memory store backing the service tests.
    #[derive(Default)]
    struct MemStore {
        students: Mutex<Vec<Student>>,
        embeddings: Mutex<Vec<FaceEmbedding>>,
        ledger: Mutex<Vec<AttendanceRecord>>,
    }

    #[async_trait]
    impl AttendanceStore for MemStore {
        async fn create_student(
            &self,
            id: &str,
            name: &str,
            email: &str,
        ) -> crate::ports::PortResult<Student> {
            let student = Student {
                id: id.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                is_trained: false,
                created_at: Utc::now(),
            };
            self.students.lock().unwrap().push(student.clone());
            Ok(student)
        }

        async fn list_students(&self) -> crate::ports::PortResult<Vec<Student>> {
            Ok(self.students.lock().unwrap().clone())
        }

        async fn list_untrained_students(&self) -> crate::ports::PortResult<Vec<Student>> {
            Ok(self
                .students
                .lock()
                .unwrap()
                .iter()
                .filter(|s| !s.is_trained)
                .cloned()
                .collect())
        }

        async fn set_student_trained(
            &self,
            student_id: &str,
        ) -> crate::ports::PortResult<Option<Student>> {
            let mut students = self.students.lock().unwrap();
            for student in students.iter_mut() {
                if student.id == student_id {
                    student.is_trained = true;
                    return Ok(Some(student.clone()));
                }
            }
            Ok(None)
        }

        async fn insert_embedding(
            &self,
            student_id: &str,
            vector: &[f32],
            photo_number: i32,
        ) -> crate::ports::PortResult<FaceEmbedding> {
            let embedding = FaceEmbedding {
                id: Uuid::new_v4(),
                student_id: student_id.to_string(),
                vector: vector.to_vec(),
                photo_number,
                created_at: Utc::now(),
            };
            self.embeddings.lock().unwrap().push(embedding.clone());
            Ok(embedding)
        }

        async fn list_embeddings_with_students(
            &self,
        ) -> crate::ports::PortResult<Vec<EmbeddingWithStudent>> {
            Ok(Vec::new())
        }

        async fn latest_attendance_since(
            &self,
            student_id: &str,
            room_id: &str,
            since: DateTime<Utc>,
        ) -> crate::ports::PortResult<Option<AttendanceRecord>> {
            Ok(self
                .ledger
                .lock()
                .unwrap()
                .iter()
                .filter(|r| {
                    r.student_id == student_id && r.room_id == room_id && r.timestamp > since
                })
                .max_by_key(|r| r.timestamp)
                .cloned())
        }

        async fn insert_attendance(
            &self,
            new: NewAttendance,
        ) -> crate::ports::PortResult<AttendanceRecord> {
            let record = AttendanceRecord {
                id: Uuid::new_v4(),
                student_id: new.student_id,
                student_name: new.student_name,
                room_id: new.room_id,
                confidence: new.confidence,
                timestamp: new.timestamp,
            };
            self.ledger.lock().unwrap().push(record.clone());
            Ok(record)
        }

        async fn list_attendance(
            &self,
            filter: AttendanceFilter,
        ) -> crate::ports::PortResult<Vec<AttendanceRecord>> {
            let bounds = filter.day.map(day_bounds);
            let mut records: Vec<_> = self
                .ledger
                .lock()
                .unwrap()
                .iter()
                .filter(|r| {
                    filter
                        .student_id
                        .as_deref()
                        .map_or(true, |id| r.student_id == id)
                        && filter.room_id.as_deref().map_or(true, |id| r.room_id == id)
                        && bounds.map_or(true, |(start, end)| {
                            r.timestamp >= start && r.timestamp < end
                        })
                })
                .cloned()
                .collect();
            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(records)
        }
    }

    fn request(student_id: &str, room_id: &str) -> ConfirmRequest {
        ConfirmRequest {
            student_id: Some(student_id.to_string()),
            student_name: Some("Alice".to_string()),
            room_id: Some(room_id.to_string()),
            confidence: Some(92.5),
        }
    }

    fn ledger_len(store: &MemStore) -> usize {
        store.ledger.lock().unwrap().len()
    }

    #[tokio::test]
    async fn fresh_confirmation_appends_one_record() {
        let store = MemStore::default();
        let now = Utc::now();

        let record = confirm_at(&store, request("S1", "R1"), now).await.unwrap();

        assert_eq!(record.student_id, "S1");
        assert_eq!(record.student_name, "Alice");
        assert_eq!(record.room_id, "R1");
        assert_eq!(record.confidence, Some(92.5));
        assert_eq!(record.timestamp, now);
        assert_eq!(ledger_len(&store), 1);
    }

    #[tokio::test]
    async fn repeat_within_cooldown_is_rejected_with_conflicting_record() {
        let store = MemStore::default();
        let now = Utc::now();

        let first = confirm_at(&store, request("S1", "R1"), now).await.unwrap();
        let err = confirm_at(&store, request("S1", "R1"), now + Duration::seconds(1))
            .await
            .unwrap_err();

        match err {
            ConfirmError::Duplicate(existing) => assert_eq!(existing, first),
            other => panic!("expected Duplicate, got {:?}", other),
        }
        assert_eq!(ledger_len(&store), 1);
    }

    #[tokio::test]
    async fn repeat_after_cooldown_succeeds() {
        let store = MemStore::default();
        let now = Utc::now();

        confirm_at(&store, request("S1", "R1"), now).await.unwrap();
        let later = now + Duration::minutes(COOLDOWN_MINUTES);
        confirm_at(&store, request("S1", "R1"), later).await.unwrap();

        assert_eq!(ledger_len(&store), 2);
    }

    #[tokio::test]
    async fn different_room_is_not_a_duplicate() {
        let store = MemStore::default();
        let now = Utc::now();

        confirm_at(&store, request("S1", "R1"), now).await.unwrap();
        confirm_at(&store, request("S1", "R2"), now).await.unwrap();

        assert_eq!(ledger_len(&store), 2);
    }

    #[tokio::test]
    async fn missing_room_id_fails_validation_without_writing() {
        let store = MemStore::default();
        let mut req = request("S1", "R1");
        req.room_id = None;

        let err = confirm(&store, req).await.unwrap_err();

        assert!(matches!(err, ConfirmError::Validation(ref msg) if msg.contains("room_id")));
        assert_eq!(ledger_len(&store), 0);
    }

    #[tokio::test]
    async fn empty_student_id_fails_validation() {
        let store = MemStore::default();
        let err = confirm(&store, request("", "R1")).await.unwrap_err();
        assert!(matches!(err, ConfirmError::Validation(_)));
    }

    #[tokio::test]
    async fn non_finite_confidence_fails_validation() {
        let store = MemStore::default();
        let mut req = request("S1", "R1");
        req.confidence = Some(f64::NAN);

        let err = confirm(&store, req).await.unwrap_err();

        assert!(matches!(err, ConfirmError::Validation(ref msg) if msg.contains("confidence")));
        assert_eq!(ledger_len(&store), 0);
    }

    #[tokio::test]
    async fn confidence_is_optional() {
        let store = MemStore::default();
        let mut req = request("S1", "R1");
        req.confidence = None;

        let record = confirm(&store, req).await.unwrap();
        assert_eq!(record.confidence, None);
    }

    #[tokio::test]
    async fn mark_trained_is_idempotent() {
        let store = MemStore::default();
        store
            .create_student("S1", "Alice", "alice@example.com")
            .await
            .unwrap();

        let first = mark_trained(&store, "S1").await.unwrap().unwrap();
        assert!(first.is_trained);

        let second = mark_trained(&store, "S1").await.unwrap().unwrap();
        assert!(second.is_trained);
    }

    #[tokio::test]
    async fn mark_trained_on_unknown_id_is_empty_success() {
        let store = MemStore::default();
        let updated = mark_trained(&store, "nope").await.unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn add_embedding_requires_all_fields() {
        let store = MemStore::default();

        let err = add_embedding(&store, None, Some(vec![0.1; 128]), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrainingError::Validation(_)));

        let err = add_embedding(&store, Some("S1".to_string()), Some(Vec::new()), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrainingError::Validation(_)));

        let err = add_embedding(&store, Some("S1".to_string()), Some(vec![0.1; 128]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TrainingError::Validation(_)));
    }

    #[tokio::test]
    async fn add_embedding_stores_the_row() {
        let store = MemStore::default();
        let embedding = add_embedding(&store, Some("S1".to_string()), Some(vec![0.5; 128]), Some(3))
            .await
            .unwrap();

        assert_eq!(embedding.student_id, "S1");
        assert_eq!(embedding.photo_number, 3);
        assert_eq!(embedding.vector.len(), 128);
        assert_eq!(store.embeddings.lock().unwrap().len(), 1);
    }

    #[test]
    fn day_bounds_cover_exactly_one_utc_day() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let (start, end) = day_bounds(day);

        let just_before_midnight = "2024-01-10T23:59:00Z".parse::<DateTime<Utc>>().unwrap();
        let just_after_midnight = "2024-01-11T00:01:00Z".parse::<DateTime<Utc>>().unwrap();

        assert!(just_before_midnight >= start && just_before_midnight < end);
        assert!(!(just_after_midnight >= start && just_after_midnight < end));
        assert_eq!(start, "2024-01-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn date_filter_returns_only_records_on_that_day() {
        let store = MemStore::default();
        let on_day = "2024-01-10T23:59:00Z".parse::<DateTime<Utc>>().unwrap();
        let next_day = "2024-01-11T00:01:00Z".parse::<DateTime<Utc>>().unwrap();

        confirm_at(&store, request("S1", "R1"), on_day).await.unwrap();
        confirm_at(&store, request("S2", "R1"), next_day).await.unwrap();

        let filter = AttendanceFilter {
            day: Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            ..Default::default()
        };
        let records = store.list_attendance(filter).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, "S1");
    }
}
