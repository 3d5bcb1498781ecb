//! Response envelopes.
//!
//! Success: `{"data": <result>}`. Error: `{"code": <status>, "message": <text>, "data"?: <payload>}`.

use crate::config::WireConfig;
use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Error envelope as written on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
}

impl ErrorEnvelope {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Json) -> Self {
        self.data = Some(data);
        self
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"message":"error"}}"#, self.code)
        })
    }
}

/// A parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Json),
    Error(ErrorEnvelope),
}

impl Envelope {
    /// Parse a response body.
    ///
    /// Objects with a `data` member and no `code` are successes; objects with
    /// numeric `code` and string `message` are errors. Anything else is a
    /// JSON error.
    pub fn parse(body: &str) -> Result<Envelope> {
        let json: Json = serde_json::from_str(body)?;
        let Json::Object(object) = json else {
            return Err(RpcError::json("response body is not a JSON object"));
        };

        let has_code = object.contains_key(WireConfig::CODE_KEY);
        if has_code {
            return serde_json::from_value(Json::Object(object))
                .map(Envelope::Error)
                .map_err(|e| RpcError::Json {
                    message: format!("malformed error envelope: {}", e),
                    source: Some(e),
                });
        }

        let mut object = object;
        match object.remove(WireConfig::DATA_KEY) {
            Some(data) => Ok(Envelope::Success(data)),
            None => Err(RpcError::json(format!(
                "response envelope has no {:?} member",
                WireConfig::DATA_KEY
            ))),
        }
    }
}

/// Wrap an encoded result in a success envelope.
pub fn success_body(data: Json) -> String {
    let mut object = Map::with_capacity(1);
    object.insert(WireConfig::DATA_KEY.to_string(), data);
    Json::Object(object).to_string()
}

/// Shorten error text taken from a non-JSON body.
pub(crate) fn truncate_text(text: &str) -> String {
    text.chars().take(WireConfig::ERROR_TEXT_LIMIT).collect()
}
