//! CDP wire types.
//!
//! Only the envelopes and the few results the page driver reads; command
//! parameters are built with `serde_json::json!` at the call site.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID - monotonically increasing
pub type RequestId = u64;

pub type TargetId = String;

/// Session ID for attached targets
pub type SessionId = String;

#[derive(Debug, Clone, Serialize)]
pub struct CDPRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CDPResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CDPErrorBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CDPErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// CDP Event from browser (no request ID)
#[derive(Debug, Clone, Deserialize)]
pub struct CDPEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl CDPEvent {
    /// String parameter by name, e.g. `name` of `Page.lifecycleEvent`.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CDPMessage {
    Response(CDPResponse),
    Event(CDPEvent),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResult {
    pub target_id: TargetId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    pub frame_id: String,
    #[serde(default)]
    pub loader_id: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_told_apart_by_id() {
        let response: CDPMessage =
            serde_json::from_str(r#"{"id": 7, "result": {"frameId": "F1"}}"#).unwrap();
        assert!(matches!(response, CDPMessage::Response(CDPResponse { id: 7, .. })));

        let event: CDPMessage = serde_json::from_str(
            r#"{"method": "Page.lifecycleEvent", "params": {"name": "load"}, "sessionId": "S"}"#,
        )
        .unwrap();
        match event {
            CDPMessage::Event(event) => {
                assert_eq!(event.param_str("name"), Some("load"));
                assert_eq!(event.session_id.as_deref(), Some("S"));
            }
            CDPMessage::Response(_) => panic!("expected an event"),
        }
    }

    #[test]
    fn test_request_omits_empty_fields() {
        let request = CDPRequest {
            id: 1,
            method: "Browser.getVersion".into(),
            params: None,
            session_id: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"id":1,"method":"Browser.getVersion"}"#
        );
    }

    #[test]
    fn test_navigate_result_reports_errors() {
        let result: NavigateResult = serde_json::from_str(
            r#"{"frameId": "F", "loaderId": "L", "errorText": "net::ERR_NAME_NOT_RESOLVED"}"#,
        )
        .unwrap();
        assert_eq!(result.error_text.as_deref(), Some("net::ERR_NAME_NOT_RESOLVED"));
    }
}
