//! Centralized configuration for chainrpc.
//!
//! Wire-format constants shared by the client and the server, plus defaults
//! for the client pipeline and the hosting layer.

use std::time::Duration;

/// Wire format constants.
pub struct WireConfig;

impl WireConfig {
    pub const JSON_MIME_TYPE: &'static str = "application/json";
    pub const JSON_CONTENT_TYPE: &'static str = "application/json; charset=utf-8";

    /// Key holding the result in a success envelope.
    pub const DATA_KEY: &'static str = "data";
    pub const CODE_KEY: &'static str = "code";

    /// Error text taken from a non-envelope body is cut to this many characters.
    pub const ERROR_TEXT_LIMIT: usize = 255;

    pub const REQUEST_ID_HEADER: &'static str = "x-request-id";
}

/// Client-side defaults.
pub struct ClientConfig;

impl ClientConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = "chainrpc/0.1";
    pub const MAX_RETRIES: u32 = 3;
}

/// Server-side defaults.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const HEALTH_PATH: &'static str = "/health";
    pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(ClientConfig::REQUEST_TIMEOUT > Duration::ZERO);
        assert!(ClientConfig::MAX_RETRIES >= 1);
    }

    #[test]
    fn test_json_content_type_has_mime_prefix() {
        assert!(WireConfig::JSON_CONTENT_TYPE.starts_with(WireConfig::JSON_MIME_TYPE));
    }
}
