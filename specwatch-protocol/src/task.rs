// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Files, suites and tests as reported by the service.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// An opaque identifier for a task (file, suite or test).
///
/// Identifiers are stable for the lifetime of the service process and are
/// used as registry keys on the client side.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(SmolStr);

impl TaskId {
    /// Creates a new task id from a string.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The state of a task as reported by the service.
///
/// Doubles as the declared *mode* of a test: `skip`, `todo` and `only` exist
/// before any result has been produced.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// The task has not run yet.
    Idle,
    /// The task is currently running.
    Run,
    /// The task passed.
    Pass,
    /// The task failed.
    Fail,
    /// The task was skipped.
    Skip,
    /// The task is declared but not implemented yet.
    Todo,
    /// The task is part of an `only` selection.
    Only,
}

impl TaskState {
    /// Returns true if this state counts towards the "passing" aggregate:
    /// passed outright, or declared as skipped/todo.
    pub fn counts_as_passing(self) -> bool {
        matches!(self, TaskState::Pass | TaskState::Skip | TaskState::Todo)
    }
}

/// A single error captured for a failed task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    /// The error message.
    pub message: String,

    /// The captured stack trace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// The result of executing a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// The result state.
    pub state: TaskState,

    /// Errors captured during execution. Empty unless the task failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorSummary>,

    /// Wall-clock duration of the task in milliseconds, once finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl TestResult {
    /// Convenience constructor for a result with no errors.
    pub fn state(state: TaskState) -> Self {
        Self {
            state,
            errors: Vec::new(),
            duration_ms: None,
        }
    }
}

/// An incremental update to a single task's result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    /// The task being updated.
    pub id: TaskId,

    /// The new result, merged shallowly into the cached task.
    pub result: TestResult,
}

/// A test-like leaf node: an individual test, or a custom task that behaves
/// like one (e.g. a benchmark or type-check assertion).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNode {
    /// The task id.
    pub id: TaskId,

    /// The human-readable name.
    pub name: String,

    /// The declared mode of the test.
    #[serde(default = "default_mode")]
    pub mode: TaskState,

    /// The current result, if the test has started at least once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TestResult>,
}

fn default_mode() -> TaskState {
    TaskState::Run
}

/// A named grouping of tasks. Suites nest; display only uses one level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteNode {
    /// The task id.
    pub id: TaskId,

    /// The suite name.
    pub name: String,

    /// Child tasks in declaration order.
    #[serde(default)]
    pub tasks: Vec<ReportedTask>,
}

/// A node in a file's task tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReportedTask {
    /// A suite grouping further tasks.
    Suite(SuiteNode),

    /// An individual test.
    Test(TestNode),

    /// A custom test-like task.
    Custom(TestNode),
}

impl ReportedTask {
    /// Returns the id of this node.
    pub fn id(&self) -> &TaskId {
        match self {
            ReportedTask::Suite(suite) => &suite.id,
            ReportedTask::Test(test) | ReportedTask::Custom(test) => &test.id,
        }
    }
}

/// A collection of suites and tests sharing a filesystem path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFile {
    /// The task id of the file node.
    pub id: TaskId,

    /// The path of the file on the service's filesystem.
    pub filepath: Utf8PathBuf,

    /// Root-level tasks in declaration order.
    #[serde(default)]
    pub tasks: Vec<ReportedTask>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_roundtrips_lowercase() {
        let json = serde_json::to_string(&TaskState::Fail).unwrap();
        assert_eq!(json, r#""fail""#);
        let state: TaskState = serde_json::from_str(r#""todo""#).unwrap();
        assert_eq!(state, TaskState::Todo);
    }

    #[test]
    fn file_tree_deserializes() {
        let file: TestFile = serde_json::from_str(
            r#"{
                "id": "f-1",
                "filepath": "/course/src/exercises/1.4-foo/.internal/store.spec.ts",
                "tasks": [
                    {
                        "type": "suite",
                        "id": "s-1",
                        "name": "Auth",
                        "tasks": [
                            { "type": "test", "id": "t-1", "name": "logs in" },
                            {
                                "type": "test",
                                "id": "t-2",
                                "name": "logs out",
                                "mode": "skip"
                            }
                        ]
                    },
                    { "type": "custom", "id": "t-3", "name": "typecheck" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(file.tasks.len(), 2);
        let ReportedTask::Suite(suite) = &file.tasks[0] else {
            panic!("expected a suite node");
        };
        assert_eq!(suite.name, "Auth");
        assert_eq!(suite.tasks.len(), 2);
        let ReportedTask::Test(test) = &suite.tasks[1] else {
            panic!("expected a test node");
        };
        // mode defaults to run when absent, and is honored when present
        assert_eq!(test.mode, TaskState::Skip);
        assert_eq!(file.tasks[1].id(), &TaskId::new("t-3"));
    }

    #[test]
    fn result_omits_empty_fields() {
        let json = serde_json::to_string(&TestResult::state(TaskState::Pass)).unwrap();
        assert_eq!(json, r#"{"state":"pass"}"#);
    }
}
