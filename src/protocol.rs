use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

/// Every request line is CR-LF terminated per the Yeelight LAN spec
pub(crate) const CRLF: &str = "\r\n";

/// Command request structure
///
/// One request is one JSON object on one line:
/// `{"id": 1, "method": "set_power", "params": ["on", "smooth", 500]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Per-connection identifier used to correlate the result
    pub id: u64,
    /// Command name, passed through opaquely to the bulb
    pub method: String,
    /// Ordered command arguments
    pub params: Vec<Value>,
}

/// Command result structure
///
/// Correlated back to exactly one [`Request`] by `id`. Carries either a
/// `result` array or an `error` object, never meaningfully both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error part of a result, present when the bulb rejects a command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i64,
    pub message: String,
}

/// Unsolicited state-change notification pushed by the bulb
///
/// Carries no identifier and is never correlated to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    pub params: HashMap<String, String>,
}

/// One decoded incoming line: a correlated result or a push notification
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Line carried an `id` field
    Response(Response),
    /// Line carried `method`/`params` and no `id`
    Notification(Notification),
}

impl Request {
    /// Create a new request with the given identifier and method
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Encode as a single CR-LF terminated JSON line
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push_str(CRLF);
        Ok(line)
    }
}

impl Response {
    /// Check if the result carries a device-reported error
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Message {
    /// Decode one incoming line
    ///
    /// Classification is by shape: anything with an `id` is a [`Response`],
    /// an id-less `method`/`params` pair is a [`Notification`]. Invalid JSON
    /// surfaces as a decode error; the read loop logs and skips those.
    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_is_one_crlf_terminated_line() {
        let req = Request::new(1, "get_prop", vec![json!("power")]);
        let line = req.encode().unwrap();
        assert!(line.ends_with("\r\n"));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            line.trim_end(),
            r#"{"id":1,"method":"get_prop","params":["power"]}"#
        );
    }

    #[test]
    fn encode_preserves_param_order() {
        let req = Request::new(7, "set_power", vec![json!("on"), json!("smooth"), json!(500)]);
        let line = req.encode().unwrap();
        assert_eq!(
            line.trim_end(),
            r#"{"id":7,"method":"set_power","params":["on","smooth",500]}"#
        );
    }

    #[test]
    fn decode_result_line() {
        let msg = Message::decode(r#"{"id":1,"result":["on"]}"#).unwrap();
        match msg {
            Message::Response(rsp) => {
                assert_eq!(rsp.id, 1);
                assert_eq!(rsp.result, Some(vec![json!("on")]));
                assert!(!rsp.has_error());
            }
            Message::Notification(_) => panic!("classified as notification"),
        }
    }

    #[test]
    fn decode_error_line() {
        let msg = Message::decode(r#"{"id":1,"error":{"code":-1,"message":"invalid params"}}"#)
            .unwrap();
        match msg {
            Message::Response(rsp) => {
                let err = rsp.error.expect("error part missing");
                assert_eq!(err.code, -1);
                assert_eq!(err.message, "invalid params");
            }
            Message::Notification(_) => panic!("classified as notification"),
        }
    }

    #[test]
    fn decode_notification_line() {
        let msg = Message::decode("{\"method\":\"props\",\"params\":{\"power\":\"off\"}}\r\n")
            .unwrap();
        match msg {
            Message::Notification(n) => {
                assert_eq!(n.method, "props");
                assert_eq!(n.params.get("power").map(String::as_str), Some("off"));
            }
            Message::Response(_) => panic!("classified as response"),
        }
    }

    #[test]
    fn decode_rejects_invalid_json() {
        assert!(Message::decode("{nope").is_err());
    }
}
