// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged over the websocket.
//!
//! Requests carry a numeric id; the matching response echoes it. Push events
//! carry an `event` tag and no id.

use crate::{ConsoleLog, ProtocolError, TaskUpdate};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A request sent from the client to the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Correlation id, unique per connection.
    pub id: u64,

    /// The requested operation.
    #[serde(flatten)]
    pub payload: RequestPayload,
}

impl ClientRequest {
    /// Encodes this request as a JSON frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// The operations exposed by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum RequestPayload {
    /// Fetch the full current file/test list.
    GetFiles,

    /// Fetch the resolved runner configuration.
    GetConfig,

    /// Re-run the tests of the given files.
    #[serde(rename_all = "camelCase")]
    Rerun {
        /// Paths of the files to re-run.
        filepaths: Vec<Utf8PathBuf>,
    },
}

impl RequestPayload {
    /// The wire method name, used in error messages.
    pub fn method(&self) -> &'static str {
        match self {
            RequestPayload::GetFiles => "getFiles",
            RequestPayload::GetConfig => "getConfig",
            RequestPayload::Rerun { .. } => "rerun",
        }
    }
}

/// A response to a [`ClientRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// The id of the request this responds to.
    pub id: u64,

    /// The result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// The error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An unsolicited event pushed by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Incremental result updates, in execution order.
    #[serde(rename_all = "camelCase")]
    TaskUpdate {
        /// The updates contained in this frame.
        updates: Vec<TaskUpdate>,
    },

    /// The current run finished.
    Finished,

    /// Console output was captured for a running test.
    #[serde(rename_all = "camelCase")]
    UserConsoleLog {
        /// The captured entry.
        log: ConsoleLog,
    },
}

/// Any frame the service can send: a response or a push event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A response to a request.
    Response(RpcResponse),

    /// A push event.
    Event(ServerEvent),
}

impl ServerMessage {
    /// Decodes a JSON frame from the service.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TaskId, TaskState, TestResult};

    #[test]
    fn request_encodes_with_flattened_method() {
        let request = ClientRequest {
            id: 3,
            payload: RequestPayload::Rerun {
                filepaths: vec!["/course/a.spec.ts".into()],
            },
        };
        assert_eq!(
            request.encode().unwrap(),
            r#"{"id":3,"method":"rerun","params":{"filepaths":["/course/a.spec.ts"]}}"#,
        );

        let request = ClientRequest {
            id: 1,
            payload: RequestPayload::GetFiles,
        };
        assert_eq!(request.encode().unwrap(), r#"{"id":1,"method":"getFiles"}"#);
    }

    #[test]
    fn frames_with_an_id_decode_as_responses() {
        let message = ServerMessage::decode(r#"{"id":1,"result":[]}"#).unwrap();
        assert_eq!(
            message,
            ServerMessage::Response(RpcResponse {
                id: 1,
                result: Some(serde_json::json!([])),
                error: None,
            }),
        );
    }

    #[test]
    fn event_frames_decode_by_tag() {
        let message = ServerMessage::decode(
            r#"{"event":"taskUpdate","updates":[{"id":"t-1","result":{"state":"fail"}}]}"#,
        )
        .unwrap();
        let ServerMessage::Event(ServerEvent::TaskUpdate { updates }) = message else {
            panic!("expected a task-update event");
        };
        assert_eq!(
            updates,
            vec![TaskUpdate {
                id: TaskId::new("t-1"),
                result: TestResult::state(TaskState::Fail),
            }],
        );

        let message = ServerMessage::decode(r#"{"event":"finished"}"#).unwrap();
        assert_eq!(message, ServerMessage::Event(ServerEvent::Finished));
    }

    #[test]
    fn malformed_frames_error_out() {
        ServerMessage::decode("not json").unwrap_err();
    }
}
