//! Per-request ids used to tie log lines and spans together.

use uuid::Uuid;

/// Generate a new request id (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
