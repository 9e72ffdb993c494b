//! Shared HTTP client factory.
//!
//! Provides consistent HTTP client configuration across the codebase.

use reqwest::Client;
use std::time::Duration;

/// Default timeout for one-shot calls such as provider checks (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout for relay traffic (10 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a client for relay traffic.
///
/// Only connecting is bounded here; streamed responses can run as long as
/// the request deadline allows, which the relay enforces itself.
pub fn create_relay_client(connect_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}

/// Create a new HTTP client with a custom overall timeout.
pub fn create_client_with_timeout(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_relay_client_builds() {
        assert!(create_relay_client(CONNECT_TIMEOUT).is_ok());
    }

    #[test]
    fn create_client_with_timeout_builds() {
        assert!(create_client_with_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn default_timeout_is_30_seconds() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(30));
    }

    #[test]
    fn connect_timeout_is_10_seconds() {
        assert_eq!(CONNECT_TIMEOUT, Duration::from_secs(10));
    }
}
