//! Shared constants for end-to-end tests
//!
//! When test credentials or timings change, update only this file.

// ============================================================================
// Credentials
// ============================================================================

/// API key accepted by every test server
pub const TEST_API_KEY: &str = "e2e-test-api-key";

/// Credential the gallery presents to the fake storage service
pub const STORAGE_API_KEY: &str = "e2e-storage-key";

/// Application id the gallery presents to the fake storage service
pub const STORAGE_APP_ID: &str = "e2e-app";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for a server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Timeout for individual HTTP requests in tests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Interval between job progress checks during ingestion (milliseconds)
pub const POLL_INTERVAL_MS: u64 = 5;
