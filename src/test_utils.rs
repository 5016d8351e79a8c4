//! Test utilities for AgentChat
//!
//! Temporary files, configuration fixtures and event-stream builders shared
//! by unit tests.

use crate::config::Config;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// Cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error's display text contains `expected`
///
/// # Panics
///
/// Panics if the result is Ok or the message does not match
pub fn assert_error_contains<T, E: std::fmt::Display>(result: Result<T, E>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}', got Ok", expected),
        Err(e) => {
            let message = e.to_string();
            assert!(
                message.contains(expected),
                "Expected error containing '{}', got '{}'",
                expected,
                message
            );
        }
    }
}

/// Configuration pointing at a local endpoint with fast retries
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.runtime.endpoint = "http://127.0.0.1:9/invocations".to_string();
    config.runtime.session_id = Some("test-session".to_string());
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = false;
    config
}

/// One content-delta event record, terminated by a blank line
pub fn delta_record(text: &str) -> String {
    format!(
        "data: {{'contentBlockDelta': {{'delta': {{'text': '{}'}}}}}}\n\n",
        text
    )
}

/// Event-stream body made of one content-delta record per fragment
pub fn sse_body(fragments: &[&str]) -> String {
    fragments.iter().map(|f| delta_record(f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "a.txt", "content");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "content");
    }

    #[test]
    fn test_test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_sse_body() {
        assert_eq!(
            sse_body(&["a", "b"]),
            format!("{}{}", delta_record("a"), delta_record("b"))
        );
    }

    #[test]
    fn test_assert_error_contains() {
        let result: Result<(), String> = Err("boom happened".to_string());
        assert_error_contains(result, "boom");
    }
}
