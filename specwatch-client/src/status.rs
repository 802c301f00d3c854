// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Projection of the raw result store into per-exercise summaries.
//!
//! [`ExerciseStatus::compute`] is a pure function of the registry, the
//! current scope and the run state; the connection event loop never calls
//! it. [`watch_run_transitions`] layers the user-facing run notifications on
//! top of run-state changes.

use crate::{
    console::handle_console_log,
    observer::SubscriptionHandle,
    report::{MessageKind, MessageOptions, SharedReporter, show_message},
    settings::Settings,
    state::{RunState, RunTracker, TaskEntry, TaskRegistry},
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use indexmap::IndexMap;
use specwatch_protocol::{TaskId, TaskState};
use std::sync::{Arc, Mutex};

/// Which exercise's tests are being watched.
///
/// Exercise spec files live under the exercise's internal directory, so the
/// scope matches paths containing `/<dirname>/.internal`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExerciseScope {
    dirname: Option<String>,
}

impl ExerciseScope {
    /// A scope covering every file the service knows about.
    pub fn all() -> Self {
        Self::default()
    }

    /// A scope covering a single exercise directory.
    pub fn exercise(dirname: impl Into<String>) -> Self {
        Self {
            dirname: Some(dirname.into()),
        }
    }

    /// The title shown for this scope.
    pub fn title(&self) -> &str {
        self.dirname.as_deref().unwrap_or("All Tests")
    }

    /// Whether a file path belongs to this scope.
    pub fn matches(&self, filepath: &Utf8Path) -> bool {
        match &self.dirname {
            Some(dirname) => filepath
                .as_str()
                .contains(&format!("/{dirname}/.internal")),
            None => true,
        }
    }
}

/// Per-task icon derived from the result state (or declared mode), as used
/// in suite groupings and the overall summary.
pub fn group_icon(state: TaskState) -> &'static str {
    match state {
        TaskState::Fail => "🔴",
        TaskState::Pass => "🟢",
        TaskState::Run => "⌛️",
        TaskState::Skip => "⏭",
        TaskState::Todo => "📝",
        TaskState::Only => "🔵",
        TaskState::Idle => "❓",
    }
}

/// Per-task icon used next to individual test names.
pub fn test_icon(state: TaskState) -> &'static str {
    match state {
        TaskState::Fail => "❌",
        TaskState::Pass => "✅",
        TaskState::Run => "⌛️",
        TaskState::Skip => "⏭",
        TaskState::Todo => "📝",
        TaskState::Only => "🔵",
        TaskState::Idle => "❓",
    }
}

/// Human-readable description of a task state.
pub fn state_text(state: TaskState) -> &'static str {
    match state {
        TaskState::Fail => "Failed",
        TaskState::Pass => "Passed",
        TaskState::Run => "Running...",
        TaskState::Skip => "Skipped",
        TaskState::Only => "Only this test run",
        TaskState::Todo => "Has yet to be implemented",
        TaskState::Idle => "Idle",
    }
}

/// The overall state of the scoped tests, in display precedence order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverallStatus {
    /// A run is in progress.
    Running,
    /// At least one test is failing.
    Fail,
    /// No failures and at least one passing (or skipped/todo) test.
    Pass,
    /// Nothing has run yet.
    Unknown,
}

impl OverallStatus {
    /// The icon for this status.
    pub fn icon(self) -> &'static str {
        match self {
            OverallStatus::Running => "🔄",
            OverallStatus::Fail => "🔴",
            OverallStatus::Pass => "🟢",
            OverallStatus::Unknown => "❓",
        }
    }

    /// The text for this status.
    pub fn text(self) -> &'static str {
        match self {
            OverallStatus::Running => "Running...",
            OverallStatus::Fail => "Failed",
            OverallStatus::Pass => "Passed",
            OverallStatus::Unknown => "Idle",
        }
    }
}

/// A single test as seen by the projector.
#[derive(Clone, Debug)]
pub struct TestView {
    /// The task id.
    pub id: TaskId,
    /// The bare test name.
    pub name: String,
    /// The suite-path title (see [`TaskRegistry::display_title`]).
    pub title: String,
    /// The result state, once the test has run.
    pub result: Option<TaskState>,
    /// The declared mode.
    pub mode: TaskState,
    /// The owning file, when known.
    pub file: Option<TaskId>,
    /// The enclosing suite name, for tests inside a named suite.
    suite_name: Option<String>,
}

impl TestView {
    fn new(registry: &TaskRegistry, task: &TaskEntry) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            title: registry.display_title(task),
            result: task.result.as_ref().map(|result| result.state),
            mode: task.mode,
            file: task.file.clone(),
            suite_name: task
                .suite
                .as_ref()
                .and_then(|id| registry.suite(id))
                .map(|suite| suite.name.clone()),
        }
    }

    /// The result state if present, else the declared mode.
    pub fn effective_state(&self) -> TaskState {
        self.result.unwrap_or(self.mode)
    }

    /// The enclosing suite name, for tests inside a named suite.
    pub fn suite_name(&self) -> Option<&str> {
        self.suite_name.as_deref()
    }

    fn is_running(&self) -> bool {
        self.result == Some(TaskState::Run)
    }

    fn is_failing(&self) -> bool {
        self.result == Some(TaskState::Fail)
    }

    fn is_passing(&self) -> bool {
        self.result == Some(TaskState::Pass) || matches!(self.mode, TaskState::Skip | TaskState::Todo)
    }
}

/// A suite grouping in the projection.
///
/// Only tests inside a named suite are grouped; tests attached directly to a
/// file stay out of every group (but keep counting in the aggregates).
#[derive(Clone, Debug)]
pub struct SuiteGroup {
    /// The suite name.
    pub name: String,
    /// Tests in the suite, in declaration order.
    pub tests: Vec<TestView>,
    /// The group icon: pinned to fail by any failing test, else showing run
    /// while any test runs, else the first test's icon.
    pub icon: &'static str,
    /// Text for the group's initial state.
    pub state_text: &'static str,
}

/// A filtered, grouped, counted projection of the result store.
#[derive(Clone, Debug)]
pub struct ExerciseStatus {
    /// The scope title.
    pub title: String,
    /// The run state the projection was computed under.
    pub run_state: RunState,
    /// Paths of the files in scope (the rerun argument).
    pub filepaths: Vec<Utf8PathBuf>,
    /// Every test in scope, flattened in declaration order.
    pub tests: Vec<TestView>,
    /// Number of tests currently running.
    pub running: usize,
    /// Number of failing tests.
    pub failing: usize,
    /// Number of passing, skipped or todo tests.
    pub passing: usize,
    /// Suite groupings, in first-seen order.
    pub suites: IndexMap<String, SuiteGroup>,
    /// Whether more than one suite grouping exists.
    pub has_nested_suites: bool,
    /// Whether the scope declares any test at all.
    pub has_tests: bool,
    /// The overall status, precedence running > failing > passing > unknown.
    pub overall: OverallStatus,
}

impl ExerciseStatus {
    /// Computes the projection for `scope` from the current registry
    /// contents and run state.
    pub fn compute(registry: &TaskRegistry, scope: &ExerciseScope, run_state: RunState) -> Self {
        let files: Vec<_> = registry
            .files()
            .filter(|file| scope.matches(&file.filepath))
            .collect();
        let filepaths = files.iter().map(|file| file.filepath.clone()).collect();

        let tests: Vec<TestView> = registry
            .tests_of_files(files.iter().copied())
            .into_iter()
            .map(|task| TestView::new(registry, task))
            .collect();

        let running = tests.iter().filter(|test| test.is_running()).count();
        let failing = tests.iter().filter(|test| test.is_failing()).count();
        let passing = tests.iter().filter(|test| test.is_passing()).count();

        let mut suites: IndexMap<String, SuiteGroup> = IndexMap::new();
        for test in &tests {
            let Some(suite_name) = &test.suite_name else {
                continue;
            };
            let group = suites.entry(suite_name.clone()).or_insert_with(|| SuiteGroup {
                name: suite_name.clone(),
                tests: Vec::new(),
                icon: group_icon(test.effective_state()),
                state_text: state_text(test.effective_state()),
            });
            group.tests.push(test.clone());
            if test.is_failing() {
                group.icon = group_icon(TaskState::Fail);
            } else if test.is_running() && group.icon != group_icon(TaskState::Fail) {
                group.icon = group_icon(TaskState::Run);
            }
        }

        let overall = if run_state == RunState::Running {
            OverallStatus::Running
        } else if failing > 0 {
            OverallStatus::Fail
        } else if passing > 0 {
            OverallStatus::Pass
        } else {
            OverallStatus::Unknown
        };

        let has_tests = !tests.is_empty();
        let has_nested_suites = suites.len() > 1;
        Self {
            title: scope.title().to_owned(),
            run_state,
            filepaths,
            tests,
            running,
            failing,
            passing,
            suites,
            has_nested_suites,
            has_tests,
            overall,
        }
    }

    /// The failing tests, in declaration order.
    pub fn failing_tests(&self) -> impl Iterator<Item = &TestView> {
        self.tests.iter().filter(|test| test.is_failing())
    }
}

/// Registers the run-transition notifications on a tracker.
///
/// On every transition to idle with at least one test in scope, emits either
/// a celebration or a failure report (naming each failing test, linking the
/// dashboard, and replaying captured hints). On every transition to running,
/// emits a timestamped notice and optionally clears previous output.
///
/// The returned handle keeps the watcher alive; dispose it to detach.
#[must_use = "dropping the handle detaches the watcher"]
pub fn watch_run_transitions(
    tracker: &RunTracker,
    registry: Arc<Mutex<TaskRegistry>>,
    reporter: SharedReporter,
    scope: ExerciseScope,
    settings: Settings,
    dashboard_url: String,
) -> SubscriptionHandle {
    let mut times_ran = 0u64;
    tracker.run_state().subscribe(move |state| {
        let registry = registry.lock().unwrap();
        let status = ExerciseStatus::compute(&registry, &scope, *state);
        if !status.has_tests {
            return;
        }

        match state {
            RunState::Idle => {
                if status.failing == 0 {
                    show_message(
                        &reporter,
                        MessageKind::Info,
                        &MessageOptions::titled("All tests are passing!").with_label("🎉"),
                        &[],
                    );
                    return;
                }

                let failed_count = status.failing;
                let title = format!(
                    "{failed_count} test{} still failing",
                    if failed_count == 1 { " is" } else { "s are" },
                );
                let mut lines: Vec<String> = status
                    .failing_tests()
                    .map(|test| format!("- {}", test.name))
                    .collect();
                let file_fragment = status
                    .failing_tests()
                    .next()
                    .and_then(|test| test.file.as_ref())
                    .map(|file| format!("?file={file}"))
                    .unwrap_or_default();
                lines.push(format!(
                    "You can inspect the error at {dashboard_url}{file_fragment}",
                ));
                show_message(
                    &reporter,
                    MessageKind::Error,
                    &MessageOptions::titled(title)
                        .with_label("🧑‍💻")
                        .with_collapsed(false),
                    &lines,
                );

                // hints may have arrived before anyone was listening
                for test in status.failing_tests() {
                    let Some(task) = registry.task(&test.id) else {
                        continue;
                    };
                    for log in &task.logs {
                        handle_console_log(&reporter, &registry, log);
                    }
                }
            }
            RunState::Running => {
                times_ran += 1;
                if times_ran > 1 && settings.clear_on_test_run {
                    reporter.lock().unwrap().clear();
                }
                let now = Local::now();
                show_message(
                    &reporter,
                    MessageKind::Info,
                    &MessageOptions::titled(format!("New Run for: {}", status.title))
                        .with_label(format!("🔄 {}", now.format("%H:%M:%S")))
                        .with_collapsed(true),
                    &[],
                );
            }
        }
    })
}
