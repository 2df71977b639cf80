/// Time utilities.
///
/// Record mutations are stamped with wall-clock milliseconds so callers can
/// order conversation updates without consulting the engine.

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
