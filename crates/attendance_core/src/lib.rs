pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    AttendanceFilter, AttendanceRecord, EmbeddingWithStudent, FaceEmbedding, NewAttendance,
    Student,
};
pub use ports::{AttendanceStore, PortError, PortResult};
pub use service::{
    add_embedding, confirm, confirm_at, day_bounds, mark_trained, ConfirmError, ConfirmRequest,
    TrainingError, COOLDOWN_MINUTES, EMBEDDINGS_PER_STUDENT,
};
