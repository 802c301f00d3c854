// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console output captured by the service while tests run.

use crate::TaskId;
use serde::{Deserialize, Serialize};

/// The output stream a console entry was captured from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// A console entry captured during a test run.
///
/// One entry corresponds to one flush of the underlying stream, which may
/// contain several logical marker messages concatenated together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLog {
    /// The task the output was attributed to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    /// The stream the entry came from.
    #[serde(rename = "type")]
    pub stream: LogStream,

    /// The raw captured content.
    pub content: String,
}

impl ConsoleLog {
    /// Creates a stdout entry attributed to a task.
    pub fn stdout(task_id: Option<TaskId>, content: impl Into<String>) -> Self {
        Self {
            task_id,
            stream: LogStream::Stdout,
            content: content.into(),
        }
    }

    /// Creates a stderr entry attributed to a task.
    pub fn stderr(task_id: Option<TaskId>, content: impl Into<String>) -> Self {
        Self {
            task_id,
            stream: LogStream::Stderr,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wire_shape() {
        let log: ConsoleLog = serde_json::from_str(
            r#"{ "taskId": "t-1", "type": "stdout", "content": "__MESSAGE[tip] hello\n" }"#,
        )
        .unwrap();
        assert_eq!(log.task_id, Some(TaskId::new("t-1")));
        assert_eq!(log.stream, LogStream::Stdout);
        assert_eq!(log.content, "__MESSAGE[tip] hello\n");
    }
}
