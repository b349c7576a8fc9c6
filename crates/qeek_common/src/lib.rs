//! Shared types for Qeek components.
//!
//! Entities, API shapes and the error taxonomy used by the daemon and
//! by integration tests.

pub mod api;
pub mod conversation;
pub mod diagnosis;
pub mod error;
pub mod resource;

pub use api::*;
pub use conversation::{ChatMessage, ChatRole, Message, Question, QuestionDetails, RecordId, Sender};
pub use diagnosis::{Diagnosis, DiagnosisShape, CATEGORY_LABELS};
pub use error::{GatewayErrorKind, QeekError};
pub use resource::Resource;

/// Crate version, single source of truth for the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
