// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The client-side result store.
//!
//! [`TaskRegistry`] accumulates the service's file/suite/test tree, keyed by
//! the service's stable string ids. Entries are created on first report and
//! merged in place on every update; the only deletion path is the full
//! snapshot replacement performed after a (re)connect.

use crate::observer::Observable;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use specwatch_protocol::{
    ConsoleLog, ReportedTask, TaskId, TaskState, TaskUpdate, TestFile, TestNode, TestResult,
};
use tracing::debug;

/// Whether a test run is currently in progress.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunState {
    /// No run in progress.
    #[default]
    Idle,
    /// The service is executing tests.
    Running,
}

/// Tracks the run state and the run-identifier counter.
///
/// The counter bumps exactly once per idle-to-running transition, letting
/// consumers detect "a new run started" without diffing task results.
#[derive(Clone, Debug)]
pub struct RunTracker {
    run_state: Observable<RunState>,
    run_id: Observable<u64>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    /// Creates a tracker in the idle state with run id 0.
    pub fn new() -> Self {
        Self {
            run_state: Observable::new(RunState::Idle),
            run_id: Observable::new(0),
        }
    }

    /// The observable run state.
    pub fn run_state(&self) -> &Observable<RunState> {
        &self.run_state
    }

    /// The observable run-identifier counter.
    pub fn run_id(&self) -> &Observable<u64> {
        &self.run_id
    }

    /// Notes that a task-update event arrived.
    ///
    /// The run id is bumped before the state flips to running, so run-state
    /// subscribers observe the new id.
    pub fn note_task_update(&self) {
        if self.run_state.get() != RunState::Running {
            self.run_id.update(|id| id + 1);
            self.run_state.set(RunState::Running);
        }
    }

    /// Notes the service's explicit "finished" signal.
    pub fn note_finished(&self) {
        self.run_state.set(RunState::Idle);
    }
}

/// The kind of a test-like registry entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskKind {
    /// An individual test.
    Test,
    /// A custom test-like task.
    Custom,
}

/// A test-like entry in the registry.
#[derive(Clone, Debug)]
pub struct TaskEntry {
    /// The service's id for this task.
    pub id: TaskId,
    /// The human-readable name.
    pub name: String,
    /// Test or custom task.
    pub kind: TaskKind,
    /// The declared mode (`skip`/`todo`/`only` exist before results do).
    pub mode: TaskState,
    /// The most recent result, if the task has started at least once.
    pub result: Option<TestResult>,
    /// The enclosing suite; `None` for tasks attached directly to the file.
    pub suite: Option<TaskId>,
    /// The owning file; `None` for orphan updates no snapshot has named yet.
    pub file: Option<TaskId>,
    /// Console entries attributed to this task, in arrival order.
    pub logs: Vec<ConsoleLog>,
}

impl TaskEntry {
    /// The result state if present, else the declared mode.
    pub fn effective_state(&self) -> TaskState {
        self.result.as_ref().map_or(self.mode, |result| result.state)
    }
}

/// A suite entry in the registry.
#[derive(Clone, Debug)]
pub struct SuiteEntry {
    /// The service's id for this suite.
    pub id: TaskId,
    /// The suite name.
    pub name: String,
    /// The enclosing suite; `None` when directly under the file root.
    pub parent: Option<TaskId>,
    /// The owning file.
    pub file: TaskId,
    /// Child task ids in declaration order.
    pub tasks: Vec<TaskId>,
}

/// A file entry in the registry.
#[derive(Clone, Debug)]
pub struct FileEntry {
    /// The service's id for this file.
    pub id: TaskId,
    /// The path of the file on the service's filesystem.
    pub filepath: Utf8PathBuf,
    /// Root-level task ids in declaration order.
    pub tasks: Vec<TaskId>,
}

/// The registry of files, suites and tests reported by the service.
///
/// An explicit store keyed by stable string identifiers: created once per
/// session, cleared only by a snapshot replacement.
#[derive(Clone, Debug, Default)]
pub struct TaskRegistry {
    files: IndexMap<TaskId, FileEntry>,
    suites: IndexMap<TaskId, SuiteEntry>,
    tasks: IndexMap<TaskId, TaskEntry>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes everything. Called when a connection (re)opens, before the
    /// snapshot fetch, so stale state never coexists with fresh state.
    pub fn clear(&mut self) {
        self.files.clear();
        self.suites.clear();
        self.tasks.clear();
    }

    /// Replaces the registry contents with a full service snapshot.
    pub fn replace_files(&mut self, files: Vec<TestFile>) {
        self.clear();
        for file in files {
            let file_id = file.id.clone();
            let mut entry = FileEntry {
                id: file.id,
                filepath: file.filepath,
                tasks: Vec::with_capacity(file.tasks.len()),
            };
            for task in file.tasks {
                entry.tasks.push(task.id().clone());
                self.insert_reported(&file_id, None, task);
            }
            self.files.insert(file_id, entry);
        }
        debug!(
            files = self.files.len(),
            tests = self.tasks.len(),
            "installed snapshot"
        );
    }

    fn insert_reported(&mut self, file: &TaskId, parent: Option<&TaskId>, node: ReportedTask) {
        match node {
            ReportedTask::Suite(suite) => {
                let suite_id = suite.id.clone();
                let mut entry = SuiteEntry {
                    id: suite.id,
                    name: suite.name,
                    parent: parent.cloned(),
                    file: file.clone(),
                    tasks: Vec::with_capacity(suite.tasks.len()),
                };
                for task in suite.tasks {
                    entry.tasks.push(task.id().clone());
                    self.insert_reported(file, Some(&suite_id), task);
                }
                self.suites.insert(suite_id, entry);
            }
            ReportedTask::Test(test) => self.insert_test(file, parent, test, TaskKind::Test),
            ReportedTask::Custom(test) => self.insert_test(file, parent, test, TaskKind::Custom),
        }
    }

    fn insert_test(
        &mut self,
        file: &TaskId,
        parent: Option<&TaskId>,
        test: TestNode,
        kind: TaskKind,
    ) {
        self.tasks.insert(
            test.id.clone(),
            TaskEntry {
                id: test.id,
                name: test.name,
                kind,
                mode: test.mode,
                result: test.result,
                suite: parent.cloned(),
                file: Some(file.clone()),
                logs: Vec::new(),
            },
        );
    }

    /// Merges an incremental update into the corresponding task, creating a
    /// minimal entry on the first report of an unknown id.
    pub fn apply_update(&mut self, update: TaskUpdate) {
        match self.tasks.get_mut(&update.id) {
            Some(entry) => {
                entry.result = Some(update.result);
            }
            None => {
                debug!(id = %update.id, "update for unreported task");
                self.tasks.insert(
                    update.id.clone(),
                    TaskEntry {
                        id: update.id,
                        name: String::new(),
                        kind: TaskKind::Test,
                        mode: TaskState::Run,
                        result: Some(update.result),
                        suite: None,
                        file: None,
                        logs: Vec::new(),
                    },
                );
            }
        }
    }

    /// Appends a console entry to the owning task's log list, when the entry
    /// names a task the registry knows about.
    pub fn attach_log(&mut self, log: &ConsoleLog) {
        let Some(task_id) = &log.task_id else {
            return;
        };
        if let Some(entry) = self.tasks.get_mut(task_id) {
            entry.logs.push(log.clone());
        }
    }

    /// Iterates files in snapshot order.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    /// Looks up a task entry.
    pub fn task(&self, id: &TaskId) -> Option<&TaskEntry> {
        self.tasks.get(id)
    }

    /// Looks up a suite entry.
    pub fn suite(&self, id: &TaskId) -> Option<&SuiteEntry> {
        self.suites.get(id)
    }

    /// Flattens the given files to their test-like tasks, in declaration
    /// order.
    pub fn tests_of_files<'a>(
        &'a self,
        files: impl IntoIterator<Item = &'a FileEntry>,
    ) -> Vec<&'a TaskEntry> {
        let mut tests = Vec::new();
        for file in files {
            for id in &file.tasks {
                self.collect_tests(id, &mut tests);
            }
        }
        tests
    }

    fn collect_tests<'a>(&'a self, id: &TaskId, out: &mut Vec<&'a TaskEntry>) {
        if let Some(task) = self.tasks.get(id) {
            out.push(task);
        } else if let Some(suite) = self.suites.get(id) {
            for child in &suite.tasks {
                self.collect_tests(child, out);
            }
        }
    }

    /// The title shown for a task in hints and failure reports:
    /// `<suite> > <name>` when the task sits inside a named suite, else the
    /// bare name.
    pub fn display_title(&self, task: &TaskEntry) -> String {
        match task.suite.as_ref().and_then(|id| self.suites.get(id)) {
            Some(suite) => format!("{} > {}", suite.name, task.name),
            None => task.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use specwatch_protocol::{SuiteNode, TestNode};

    fn test_node(id: &str, name: &str) -> ReportedTask {
        ReportedTask::Test(TestNode {
            id: TaskId::new(id),
            name: name.to_owned(),
            mode: TaskState::Run,
            result: None,
        })
    }

    fn sample_file() -> TestFile {
        TestFile {
            id: TaskId::new("f-1"),
            filepath: "/course/src/exercises/1.4-foo/.internal/store.spec.ts".into(),
            tasks: vec![
                ReportedTask::Suite(SuiteNode {
                    id: TaskId::new("s-auth"),
                    name: "Auth".to_owned(),
                    tasks: vec![test_node("t-1", "logs in"), test_node("t-2", "logs out")],
                }),
                test_node("t-3", "root level"),
            ],
        }
    }

    #[test]
    fn run_id_bumps_once_per_transition() {
        let tracker = RunTracker::new();
        assert_eq!(tracker.run_id().get(), 0);

        tracker.note_task_update();
        tracker.note_task_update();
        tracker.note_task_update();
        assert_eq!(tracker.run_state().get(), RunState::Running);
        assert_eq!(tracker.run_id().get(), 1);

        tracker.note_finished();
        assert_eq!(tracker.run_state().get(), RunState::Idle);
        tracker.note_task_update();
        assert_eq!(tracker.run_id().get(), 2);
    }

    #[test]
    fn run_id_is_visible_to_run_state_subscribers() {
        let tracker = RunTracker::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_in_callback = std::sync::Arc::clone(&seen);
        let run_id = tracker.run_id().clone();
        let _handle = tracker.run_state().subscribe(move |state| {
            seen_in_callback.lock().unwrap().push((*state, run_id.get()));
        });

        tracker.note_task_update();
        tracker.note_finished();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(RunState::Running, 1), (RunState::Idle, 1)],
        );
    }

    #[test]
    fn snapshot_builds_tree_and_flattens_in_order() {
        let mut registry = TaskRegistry::new();
        registry.replace_files(vec![sample_file()]);

        let files: Vec<_> = registry.files().collect();
        assert_eq!(files.len(), 1);
        let tests = registry.tests_of_files(files);
        let names: Vec<_> = tests.iter().map(|test| test.name.as_str()).collect();
        assert_eq!(names, ["logs in", "logs out", "root level"]);
    }

    #[test]
    fn replace_files_drops_stale_tasks() {
        let mut registry = TaskRegistry::new();
        registry.replace_files(vec![sample_file()]);
        assert!(registry.task(&TaskId::new("t-2")).is_some());

        // a reconnect snapshot that no longer contains t-2
        registry.replace_files(vec![TestFile {
            id: TaskId::new("f-1"),
            filepath: "/course/src/exercises/1.4-foo/.internal/store.spec.ts".into(),
            tasks: vec![test_node("t-1", "logs in")],
        }]);
        assert!(registry.task(&TaskId::new("t-1")).is_some());
        assert!(registry.task(&TaskId::new("t-2")).is_none());
        assert!(registry.suite(&TaskId::new("s-auth")).is_none());
    }

    #[test]
    fn updates_merge_in_place_and_create_on_first_report() {
        let mut registry = TaskRegistry::new();
        registry.replace_files(vec![sample_file()]);

        registry.apply_update(TaskUpdate {
            id: TaskId::new("t-1"),
            result: TestResult::state(TaskState::Run),
        });
        registry.apply_update(TaskUpdate {
            id: TaskId::new("t-1"),
            result: TestResult::state(TaskState::Pass),
        });
        let task = registry.task(&TaskId::new("t-1")).unwrap();
        assert_eq!(task.effective_state(), TaskState::Pass);

        registry.apply_update(TaskUpdate {
            id: TaskId::new("t-unknown"),
            result: TestResult::state(TaskState::Fail),
        });
        let orphan = registry.task(&TaskId::new("t-unknown")).unwrap();
        assert_eq!(orphan.effective_state(), TaskState::Fail);
        assert!(orphan.file.is_none());
    }

    #[test]
    fn display_title_uses_parent_suite() {
        let mut registry = TaskRegistry::new();
        registry.replace_files(vec![sample_file()]);

        let nested = registry.task(&TaskId::new("t-1")).unwrap();
        assert_eq!(registry.display_title(nested), "Auth > logs in");

        let root = registry.task(&TaskId::new("t-3")).unwrap();
        assert_eq!(registry.display_title(root), "root level");
    }

    #[test]
    fn logs_attach_to_known_tasks_only() {
        let mut registry = TaskRegistry::new();
        registry.replace_files(vec![sample_file()]);

        registry.attach_log(&ConsoleLog::stdout(
            Some(TaskId::new("t-1")),
            "__MESSAGE[tip] hello\n",
        ));
        registry.attach_log(&ConsoleLog::stdout(Some(TaskId::new("nope")), "dropped"));
        registry.attach_log(&ConsoleLog::stdout(None, "no task context"));

        assert_eq!(registry.task(&TaskId::new("t-1")).unwrap().logs.len(), 1);
    }
}
