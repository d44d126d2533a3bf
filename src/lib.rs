// Library exports for the binary and integration tests

pub mod config;
pub mod db;
pub mod pipeline;
pub mod torrent;

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
