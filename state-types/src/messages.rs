//! Protocol messages for statesync.
//!
//! Every frame is a JSON object sent as a WebSocket text frame. Requests may
//! carry an optional `"rid"`; servers that echo it on the reply enable exact
//! correlation, servers that don't are still understood.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{CurrentState, RequestId, WireError};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// `{"get": true}`: request the current state
    Get {
        /// Always `true` on the wire
        get: bool,
        /// Optional request id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rid: Option<RequestId>,
    },
    /// `{"state": {...}}`: propose a new authoritative state
    Set {
        /// The proposed state
        state: CurrentState,
        /// Optional request id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rid: Option<RequestId>,
    },
    /// `{"ping": value}`: liveness probe
    Ping {
        /// Probe value, echoed back verbatim
        ping: Value,
        /// Optional request id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rid: Option<RequestId>,
    },
    /// `{"pong": value}`: reply to a server ping
    Pong {
        /// The server's probe value
        pong: Value,
        /// Request id of the ping, if it had one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rid: Option<RequestId>,
    },
}

impl ClientMessage {
    /// Request the current state.
    pub fn get() -> Self {
        Self::Get {
            get: true,
            rid: None,
        }
    }

    /// Propose a new state.
    pub fn set(state: CurrentState) -> Self {
        Self::Set { state, rid: None }
    }

    /// Liveness probe carrying `value`.
    pub fn ping(value: Value) -> Self {
        Self::Ping {
            ping: value,
            rid: None,
        }
    }

    /// Reply to a server probe.
    pub fn pong(value: Value) -> Self {
        Self::Pong {
            pong: value,
            rid: None,
        }
    }

    /// Attach (or clear) the request id.
    pub fn with_rid(mut self, request_id: Option<RequestId>) -> Self {
        match &mut self {
            Self::Get { rid, .. }
            | Self::Set { rid, .. }
            | Self::Ping { rid, .. }
            | Self::Pong { rid, .. } => *rid = request_id,
        }
        self
    }

    /// The attached request id, if any.
    pub fn rid(&self) -> Option<RequestId> {
        match self {
            Self::Get { rid, .. }
            | Self::Set { rid, .. }
            | Self::Ping { rid, .. }
            | Self::Pong { rid, .. } => *rid,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    /// Parse a JSON text frame.
    pub fn from_json(frame: &str) -> Result<Self, WireError> {
        serde_json::from_value(object_value(frame)?).map_err(WireError::Decode)
    }
}

/// Frames sent by the server.
///
/// Fields are independent: a single frame may carry a state push and a ping
/// at the same time. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Current or updated authoritative state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CurrentState>,
    /// Liveness probe from the server; `null` is a valid probe value
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub ping: Option<Value>,
    /// Reply to a client probe
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub pong: Option<Value>,
    /// Echoed request id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<RequestId>,
}

impl ServerMessage {
    /// A state push.
    pub fn state(state: CurrentState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// A server probe.
    pub fn ping(value: Value) -> Self {
        Self {
            ping: Some(value),
            ..Self::default()
        }
    }

    /// A reply to a client probe.
    pub fn pong(value: Value) -> Self {
        Self {
            pong: Some(value),
            ..Self::default()
        }
    }

    /// Echo a request id.
    pub fn with_rid(mut self, rid: Option<RequestId>) -> Self {
        self.rid = rid;
        self
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    /// Parse a JSON text frame.
    ///
    /// Anything that is not a JSON object is rejected.
    pub fn from_json(frame: &str) -> Result<Self, WireError> {
        serde_json::from_value(object_value(frame)?).map_err(WireError::Decode)
    }
}

/// A field that is present is `Some`, even when its value is `null`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Parse a frame and require a top-level object.
fn object_value(frame: &str) -> Result<Value, WireError> {
    let value: Value = serde_json::from_str(frame).map_err(WireError::Decode)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(WireError::NotAnObject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateId;
    use serde_json::json;

    fn as_json(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    // ===========================================
    // Client Frame Shapes
    // ===========================================

    #[test]
    fn get_frame_shape() {
        let frame = ClientMessage::get().to_json().unwrap();
        assert_eq!(as_json(&frame), json!({"get": true}));
    }

    #[test]
    fn set_frame_shape() {
        let state = CurrentState::new("abc".into(), json!({"background": false}));
        let frame = ClientMessage::set(state).to_json().unwrap();
        assert_eq!(
            as_json(&frame),
            json!({"state": {"id": "abc", "content": {"background": false}}})
        );
    }

    #[test]
    fn ping_and_pong_frame_shapes() {
        let ping = ClientMessage::ping(json!("p1")).to_json().unwrap();
        let pong = ClientMessage::pong(json!("p1")).to_json().unwrap();
        assert_eq!(as_json(&ping), json!({"ping": "p1"}));
        assert_eq!(as_json(&pong), json!({"pong": "p1"}));
    }

    #[test]
    fn rid_is_additive() {
        let frame = ClientMessage::get()
            .with_rid(Some(RequestId::new(3)))
            .to_json()
            .unwrap();
        assert_eq!(as_json(&frame), json!({"get": true, "rid": 3}));
    }

    #[test]
    fn with_rid_none_clears() {
        let msg = ClientMessage::ping(json!("x"))
            .with_rid(Some(RequestId::new(1)))
            .with_rid(None);
        assert_eq!(msg.rid(), None);
    }

    // ===========================================
    // Client Frame Parsing (server side)
    // ===========================================

    #[test]
    fn parses_client_frames_by_shape() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"get":true}"#).unwrap(),
            ClientMessage::Get { get: true, rid: None }
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"state":{"id":"a","content":1},"rid":9}"#).unwrap(),
            ClientMessage::Set { rid: Some(rid), .. } if rid == RequestId::new(9)
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"ping":"x"}"#).unwrap(),
            ClientMessage::Ping { .. }
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"pong":"x"}"#).unwrap(),
            ClientMessage::Pong { .. }
        ));
    }

    #[test]
    fn unknown_client_frame_is_rejected() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"hello":1}"#),
            Err(WireError::Decode(_))
        ));
        assert!(matches!(
            ClientMessage::from_json("[1,2]"),
            Err(WireError::NotAnObject)
        ));
    }

    // ===========================================
    // Server Frames
    // ===========================================

    #[test]
    fn parses_state_push() {
        let msg = ServerMessage::from_json(
            r#"{"state":{"id":"s1","content":{"background":true}}}"#,
        )
        .unwrap();
        let state = msg.state.unwrap();
        assert_eq!(state.id, StateId::from("s1"));
        assert_eq!(state.content, json!({"background": true}));
        assert!(msg.ping.is_none());
        assert!(msg.rid.is_none());
    }

    #[test]
    fn server_frame_may_combine_fields() {
        let msg = ServerMessage::from_json(
            r#"{"state":{"id":"","content":null},"ping":"p1","extra":true}"#,
        )
        .unwrap();
        assert!(msg.state.is_some());
        assert_eq!(msg.ping, Some(json!("p1")));
    }

    #[test]
    fn null_probe_values_are_present() {
        let ping = ServerMessage::from_json(r#"{"ping":null}"#).unwrap();
        assert_eq!(ping.ping, Some(Value::Null));
        assert!(ping.pong.is_none());

        let pong = ServerMessage::from_json(r#"{"pong":null,"rid":3}"#).unwrap();
        assert_eq!(pong.pong, Some(Value::Null));
        assert_eq!(pong.rid, Some(RequestId::new(3)));

        // Absent stays absent
        let push = ServerMessage::from_json(r#"{"state":{"id":"","content":null}}"#).unwrap();
        assert!(push.ping.is_none());
        assert!(push.pong.is_none());
    }

    #[test]
    fn null_pong_serializes_as_null() {
        let frame = ServerMessage::pong(Value::Null).to_json().unwrap();
        assert_eq!(frame, r#"{"pong":null}"#);
        assert_eq!(ClientMessage::pong(Value::Null).to_json().unwrap(), r#"{"pong":null}"#);
    }

    #[test]
    fn server_frame_serializes_only_present_fields() {
        let frame = ServerMessage::pong(json!("x"))
            .with_rid(Some(RequestId::new(4)))
            .to_json()
            .unwrap();
        assert_eq!(as_json(&frame), json!({"pong": "x", "rid": 4}));
    }

    #[test]
    fn non_object_server_frame_is_rejected() {
        assert!(matches!(
            ServerMessage::from_json("42"),
            Err(WireError::NotAnObject)
        ));
        assert!(matches!(
            ServerMessage::from_json("not json"),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn malformed_state_is_rejected() {
        assert!(ServerMessage::from_json(r#"{"state":5}"#).is_err());
    }
}
