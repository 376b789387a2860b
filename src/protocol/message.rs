//! Wire message types.
//!
//! Three shapes travel over the transport, one JSON object per frame:
//!
//! | Shape | Direction | Fields |
//! |-------|-----------|--------|
//! | [`Command`] | Local → Remote | `id`, `method`, `params?`, `sessionId?` |
//! | [`Response`] | Remote → Local | `id`, `result?`, `error?`, `sessionId?` |
//! | [`Event`] | Remote → Local | `method`, `params?`, `sessionId?` |
//!
//! Absent fields are omitted, never written as `null`.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId};

// ============================================================================
// Constants
// ============================================================================

/// Error code used when a call is failed because the connection closed.
pub const CONNECTION_CLOSED_CODE: i32 = -32000;

/// Error code returned by the stub transport.
pub const STUB_CONNECTION_CODE: i32 = -32015;

// ============================================================================
// Method Names
// ============================================================================

/// Splits `Domain.method` into its two halves.
///
/// Returns `None` when there is no dot or either half is empty.
#[inline]
#[must_use]
pub fn split_method(method: &str) -> Option<(&str, &str)> {
    let (domain, name) = method.split_once('.')?;
    if domain.is_empty() || name.is_empty() {
        return None;
    }
    Some((domain, name))
}

// ============================================================================
// Command
// ============================================================================

/// A command from local end to remote end.
///
/// # Format
///
/// ```json
/// {
///   "id": 1,
///   "method": "Network.enable",
///   "params": { ... },
///   "sessionId": "AB12"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Correlation id.
    pub id: CallId,

    /// Fully qualified method name.
    pub method: String,

    /// Command parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Target session; omitted for the root session.
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Command {
    /// Creates a command addressed to `session`.
    ///
    /// `Null` or empty-object params are omitted from the wire form.
    #[must_use]
    pub fn new(id: CallId, session: &SessionId, method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(other),
        };
        Self {
            id,
            method: method.into(),
            params,
            session_id: session.as_wire().map(str::to_string),
        }
    }

    /// Serializes to a wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Response
// ============================================================================

/// Error object carried by a failed [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Protocol error code.
    pub code: i32,

    /// Human readable message.
    pub message: String,

    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response from remote end to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 1, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 1, "error": { "code": -32601, "message": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Matches the command `id`.
    pub id: CallId,

    /// Session the command was addressed to.
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Result data (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error object (if failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    /// Returns `true` if the remote end reported an error.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the session this response belongs to.
    #[inline]
    #[must_use]
    pub fn session(&self) -> SessionId {
        SessionId::from(self.session_id.clone())
    }

    /// Converts into the command outcome.
    ///
    /// A missing `result` resolves to an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the response carries an `error`.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::remote(method, error.code, error.message, error.data)),
            None => Ok(self.result.unwrap_or_else(|| Value::Object(Map::new()))),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// An unsolicited notification from remote end to local end.
///
/// # Format
///
/// ```json
/// {
///   "method": "Network.requestWillBeSent",
///   "params": { "requestId": "X" },
///   "sessionId": "S1"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event payload; an empty object when the wire omits it.
    #[serde(default = "empty_params")]
    pub params: Value,

    /// Originating session; omitted for the root session.
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

impl Event {
    /// Returns the domain name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event { method: "Page.loadEventFired".into(), .. };
    /// assert_eq!(event.domain(), "Page");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        split_method(&self.method).map(|(d, _)| d).unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        split_method(&self.method).map(|(_, e)| e).unwrap_or_default()
    }

    /// Returns the session this event belongs to.
    #[inline]
    #[must_use]
    pub fn session(&self) -> SessionId {
        SessionId::from(self.session_id.clone())
    }

    /// Deserializes the params into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the params do not match `T`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.params)?)
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Has `id`, no `method`.
    Response(Response),
    /// Has `method`, no `id`.
    Event(Event),
    /// Has a readable `id`, but the rest of the response does not parse.
    ///
    /// The call it names can still be settled.
    MalformedResponse {
        /// The response id.
        id: CallId,
        /// The response session, when readable.
        session_id: Option<String>,
        /// Why the response was rejected.
        reason: String,
    },
}

impl Incoming {
    /// Parses and classifies a raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the frame is not JSON, not an
    /// object, carries both or neither of `id` and `method`, or has fields
    /// of the wrong type. A response whose `id` is readable is returned as
    /// [`Incoming::MalformedResponse`] instead.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("unparsable frame: {e}")))?;

        let Value::Object(ref object) = value else {
            return Err(Error::protocol("frame is not a JSON object"));
        };

        match (object.contains_key("id"), object.contains_key("method")) {
            (true, false) => {
                let id = object.get("id").and_then(|id| CallId::deserialize(id).ok());
                let session_id = object
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match serde_json::from_value(value) {
                    Ok(response) => Ok(Self::Response(response)),
                    Err(e) => {
                        let reason = format!("malformed response: {e}");
                        match id {
                            Some(id) => Ok(Self::MalformedResponse {
                                id,
                                session_id,
                                reason,
                            }),
                            None => Err(Error::protocol(reason)),
                        }
                    }
                }
            }
            (false, true) => {
                let event: Event = serde_json::from_value(value)
                    .map_err(|e| Error::protocol(format!("malformed event: {e}")))?;
                if split_method(&event.method).is_none() {
                    return Err(Error::protocol(format!(
                        "event method '{}' is not in Domain.event form",
                        event.method
                    )));
                }
                Ok(Self::Event(event))
            }
            (true, true) => Err(Error::protocol("frame carries both id and method")),
            (false, false) => Err(Error::protocol("frame carries neither id nor method")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_command_root_session_omits_fields() {
        let command = Command::new(CallId::new(1), &SessionId::root(), "Network.enable", json!({}));
        let frame = command.to_frame().unwrap();
        assert_eq!(frame, r#"{"id":1,"method":"Network.enable"}"#);
    }

    #[test]
    fn test_command_child_session() {
        let command = Command::new(
            CallId::new(7),
            &SessionId::new("S1"),
            "Network.replayXHR",
            json!({ "requestId": "R" }),
        );
        let value: Value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["sessionId"], "S1");
        assert_eq!(value["params"]["requestId"], "R");
    }

    #[test]
    fn test_parse_response() {
        let incoming = Incoming::parse(r#"{"id":2,"result":{"ok":true}}"#).unwrap();
        let Incoming::Response(response) = incoming else {
            panic!("expected response");
        };
        assert_eq!(response.id, CallId::new(2));
        assert!(response.session().is_root());
        assert_eq!(response.into_result("Page.enable").unwrap(), json!({ "ok": true }));
    }

    #[test]
    fn test_parse_error_response() {
        let text = r#"{"id":3,"error":{"code":-32601,"message":"not found"}}"#;
        let Incoming::Response(response) = Incoming::parse(text).unwrap() else {
            panic!("expected response");
        };
        let err = response.into_result("Foo.bar").unwrap_err();
        assert_eq!(err.code(), Some(-32601));
    }

    #[test]
    fn test_response_without_result_is_empty_object() {
        let Incoming::Response(response) = Incoming::parse(r#"{"id":4}"#).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(response.into_result("X.y").unwrap(), json!({}));
    }

    #[test]
    fn test_parse_event() {
        let text = r#"{"method":"Network.requestWillBeSent","params":{"requestId":"X"},"sessionId":"S1"}"#;
        let Incoming::Event(event) = Incoming::parse(text).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.domain(), "Network");
        assert_eq!(event.event_name(), "requestWillBeSent");
        assert_eq!(event.session(), SessionId::new("S1"));
    }

    #[test]
    fn test_event_without_params() {
        let Incoming::Event(event) = Incoming::parse(r#"{"method":"Page.loadEventFired"}"#).unwrap()
        else {
            panic!("expected event");
        };
        assert_eq!(event.params, json!({}));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Incoming::parse("not json").is_err());
        assert!(Incoming::parse("[1,2]").is_err());
        assert!(Incoming::parse(r#"{"params":{}}"#).is_err());
        assert!(Incoming::parse(r#"{"id":1,"method":"A.b"}"#).is_err());
        assert!(Incoming::parse(r#"{"method":"nodot"}"#).is_err());
        assert!(Incoming::parse(r#"{"id":"str"}"#).is_err());
    }

    #[test]
    fn test_parse_keeps_id_of_malformed_response() {
        let text = r#"{"id":5,"error":{"code":-32000},"sessionId":"S1"}"#;
        let Incoming::MalformedResponse {
            id,
            session_id,
            reason,
        } = Incoming::parse(text).unwrap()
        else {
            panic!("expected malformed response");
        };
        assert_eq!(id, CallId::new(5));
        assert_eq!(session_id.as_deref(), Some("S1"));
        assert!(reason.contains("message"));
    }

    #[test]
    fn test_split_method() {
        assert_eq!(split_method("Page.enable"), Some(("Page", "enable")));
        assert_eq!(split_method("Page."), None);
        assert_eq!(split_method("enable"), None);
    }

    #[test]
    fn test_params_as() {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(rename = "requestId")]
            request_id: String,
        }
        let event = Event {
            method: "Network.loadingFinished".into(),
            params: json!({ "requestId": "R1" }),
            session_id: None,
        };
        let payload: Payload = event.params_as().unwrap();
        assert_eq!(payload.request_id, "R1");
    }
}
