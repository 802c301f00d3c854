// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The connection to the test-execution service.
//!
//! [`TestMonitor::connect`] spawns a single owning event-loop task per
//! monitor. The loop drives the websocket, the command channel and the
//! reconnect timer with `tokio::select!`; every mutation of the shared state
//! happens on that task, in socket-delivery order.
//!
//! On every (re)open the loop clears the registry and fetches the full
//! file/config snapshot, so a reconnect that missed interim events can never
//! leave stale state behind. Connection loss is handled with a bounded
//! retry counter: the loop keeps reconnecting indefinitely, but after
//! [`ServerOptions::retries`] consecutive failures it surfaces one terminal
//! notification and starts counting again.

use crate::{
    console::handle_console_log,
    errors::RpcError,
    observer::{Observable, SubscriptionHandle},
    report::{MessageKind, MessageOptions, SharedReporter, show_message},
    settings::Settings,
    state::{RunState, RunTracker, TaskRegistry},
    status::{ExerciseScope, ExerciseStatus, watch_run_transitions},
};
use futures::{SinkExt, StreamExt};
use specwatch_protocol::{
    ClientRequest, RequestPayload, RpcResponse, RunnerConfig, ServerEvent, ServerMessage, TestFile,
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingReply = oneshot::Sender<Result<serde_json::Value, RpcError>>;

/// The port the test service listens on by default.
pub const DEFAULT_PORT: u16 = 51205;

const RETRIES: u32 = 20;
const RECONNECT_INTERVAL: Duration = Duration::from_millis(2500);

/// The default websocket endpoint of a locally running test service.
pub fn default_server_url() -> String {
    format!("ws://localhost:{DEFAULT_PORT}/__vitest_api__")
}

/// Derives the browser dashboard URL from a websocket endpoint, for the
/// debug link in failure reports.
pub fn dashboard_url(server_url: &str) -> String {
    let http = if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        server_url.to_owned()
    };
    let base = http.strip_suffix("/__vitest_api__").unwrap_or(&http);
    format!("{base}/__vitest__/#/")
}

/// How to reach the test service.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// The websocket endpoint.
    pub url: String,

    /// Consecutive connection failures before the terminal notice.
    pub retries: u32,

    /// Pause between reconnection attempts.
    pub retry_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            retries: RETRIES,
            retry_interval: RECONNECT_INTERVAL,
        }
    }
}

/// The state of the websocket, independent of the run state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    /// A connection attempt is in progress.
    Connecting,
    /// The socket is open.
    Open,
    /// The socket is closed (between attempts, or after disposal).
    Closed,
}

/// Bookkeeping for connection-loss notifications.
///
/// The warning about a missing server fires once per outage; the terminal
/// notice fires once per exhausted retry cycle, after which the counter
/// starts over so the loop can keep retrying.
#[derive(Debug)]
struct RetryState {
    attempts: u32,
    limit: u32,
    has_warned_error: bool,
}

#[derive(Debug, Eq, PartialEq)]
enum CloseNotice {
    Reconnecting(u32),
    Terminal,
}

impl RetryState {
    fn new(limit: u32) -> Self {
        Self {
            attempts: 0,
            limit,
            has_warned_error: false,
        }
    }

    /// Returns true if the "server is not running" warning should be shown.
    fn note_error(&mut self) -> bool {
        if self.has_warned_error {
            false
        } else {
            self.has_warned_error = true;
            true
        }
    }

    /// Returns true if the "back online" notice should be shown.
    fn note_open(&mut self) -> bool {
        let announce = self.has_warned_error;
        self.has_warned_error = false;
        self.attempts = 0;
        announce
    }

    fn note_close(&mut self) -> CloseNotice {
        self.attempts += 1;
        if self.attempts >= self.limit {
            self.attempts = 0;
            self.has_warned_error = false;
            CloseNotice::Terminal
        } else {
            CloseNotice::Reconnecting(self.attempts)
        }
    }
}

struct MonitorShared {
    registry: Arc<Mutex<TaskRegistry>>,
    tracker: RunTracker,
    status: Observable<ConnectionStatus>,
    config: Observable<RunnerConfig>,
    snapshots: Observable<u64>,
    disposed: AtomicBool,
}

impl MonitorShared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Once disposed, the status is frozen at `Closed` and no further
    /// transitions are published.
    fn set_status(&self, status: ConnectionStatus) {
        if !self.is_disposed() {
            self.status.set(status);
        }
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.status.set(ConnectionStatus::Closed);
        }
    }
}

enum Command {
    Request {
        payload: RequestPayload,
        reply: PendingReply,
    },
    Close,
}

/// A live connection to the test service.
///
/// Exactly one socket is live per monitor at any time. Dropping or
/// [`close`](Self::close)-ing the monitor freezes the connection status at
/// [`ConnectionStatus::Closed`] and shuts the event loop down.
pub struct TestMonitor {
    shared: Arc<MonitorShared>,
    options: ServerOptions,
    reporter: SharedReporter,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TestMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestMonitor")
            .field("url", &self.options.url)
            .field("status", &self.shared.status.get())
            .finish_non_exhaustive()
    }
}

impl TestMonitor {
    /// Connects to the test service, spawning the owning event-loop task.
    ///
    /// Must be called from within a tokio runtime. The call returns
    /// immediately; connection progress is published through
    /// [`connection_status`](Self::connection_status) and the reporter.
    pub fn connect(options: ServerOptions, reporter: SharedReporter) -> Self {
        let shared = Arc::new(MonitorShared {
            registry: Arc::new(Mutex::new(TaskRegistry::new())),
            tracker: RunTracker::new(),
            status: Observable::new(ConnectionStatus::Connecting),
            config: Observable::new(RunnerConfig::default()),
            snapshots: Observable::new(0),
            disposed: AtomicBool::new(false),
        });
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_event_loop(
            Arc::clone(&shared),
            options.clone(),
            reporter.clone(),
            commands_rx,
        ));
        Self {
            shared,
            options,
            reporter,
            commands,
            task: Some(task),
        }
    }

    /// The observable connection status.
    pub fn connection_status(&self) -> &Observable<ConnectionStatus> {
        &self.shared.status
    }

    /// The observable run state.
    pub fn run_state(&self) -> &Observable<RunState> {
        self.shared.tracker.run_state()
    }

    /// The observable run-identifier counter.
    pub fn run_id(&self) -> &Observable<u64> {
        self.shared.tracker.run_id()
    }

    /// The observable runner configuration, replaced on every snapshot.
    pub fn config(&self) -> &Observable<RunnerConfig> {
        &self.shared.config
    }

    /// The observable snapshot counter, bumped whenever a full snapshot
    /// installs (at least once per successful connection).
    pub fn snapshots(&self) -> &Observable<u64> {
        &self.shared.snapshots
    }

    /// Runs `f` against the current registry contents.
    pub fn with_registry<R>(&self, f: impl FnOnce(&TaskRegistry) -> R) -> R {
        f(&self.shared.registry.lock().unwrap())
    }

    /// Computes the current projection for `scope`.
    pub fn project(&self, scope: &ExerciseScope) -> ExerciseStatus {
        let run_state = self.run_state().get();
        self.with_registry(|registry| ExerciseStatus::compute(registry, scope, run_state))
    }

    /// Attaches the run-transition notifications for `scope`.
    #[must_use = "dropping the handle detaches the watcher"]
    pub fn watch_transitions(&self, scope: ExerciseScope, settings: Settings) -> SubscriptionHandle {
        watch_run_transitions(
            &self.shared.tracker,
            Arc::clone(&self.shared.registry),
            self.reporter.clone(),
            scope,
            settings,
            dashboard_url(&self.options.url),
        )
    }

    /// Issues a raw request to the service.
    pub async fn request(&self, payload: RequestPayload) -> Result<serde_json::Value, RpcError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Request { payload, reply })
            .map_err(|_| RpcError::Closed)?;
        response.await.map_err(|_| RpcError::ResponseDropped)?
    }

    /// Asks the service to re-run every file in `scope`.
    pub async fn rerun(&self, scope: &ExerciseScope) -> Result<(), RpcError> {
        let filepaths = self.with_registry(|registry| {
            registry
                .files()
                .filter(|file| scope.matches(&file.filepath))
                .map(|file| file.filepath.clone())
                .collect()
        });
        self.request(RequestPayload::Rerun { filepaths })
            .await
            .map(|_| ())
    }

    /// Resolves once at least `at_least` snapshots have installed.
    pub async fn wait_for_snapshots(&self, at_least: u64) {
        let (notify, mut notified) = mpsc::unbounded_channel();
        let _handle = self.shared.snapshots.subscribe(move |count| {
            let _ = notify.send(*count);
        });
        while self.shared.snapshots.get() < at_least {
            if notified.recv().await.is_none() {
                return;
            }
        }
    }

    /// Resolves once the first snapshot has installed.
    pub async fn wait_for_snapshot(&self) {
        self.wait_for_snapshots(1).await;
    }

    /// Resolves once a run newer than `previous_run_id` has completed.
    pub async fn wait_for_run_complete(&self, previous_run_id: u64) {
        let (notify, mut notified) = mpsc::unbounded_channel();
        let run_notify = notify.clone();
        let _run_handle = self.run_id().subscribe(move |_| {
            let _ = run_notify.send(());
        });
        let _state_handle = self.run_state().subscribe(move |_| {
            let _ = notify.send(());
        });
        loop {
            if self.run_id().get() > previous_run_id && self.run_state().get() == RunState::Idle {
                return;
            }
            if notified.recv().await.is_none() {
                return;
            }
        }
    }

    /// Closes the socket and shuts the event loop down.
    pub async fn close(mut self) {
        self.shared.dispose();
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestMonitor {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shared.dispose();
            let _ = self.commands.send(Command::Close);
        }
    }
}

enum ConnectionEnd {
    SocketClosed,
    Disposed,
}

async fn run_event_loop(
    shared: Arc<MonitorShared>,
    options: ServerOptions,
    reporter: SharedReporter,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut retry = RetryState::new(options.retries);
    'reconnect: loop {
        if shared.is_disposed() {
            break;
        }
        shared.set_status(ConnectionStatus::Connecting);
        debug!(url = %options.url, "connecting to test server");
        // stay responsive to commands while the dial is in flight
        let connect = connect_async(options.url.as_str());
        tokio::pin!(connect);
        let attempt = loop {
            tokio::select! {
                result = &mut connect => break Some(result),
                command = commands.recv() => match command {
                    Some(Command::Request { reply, .. }) => {
                        let _ = reply.send(Err(RpcError::NotConnected));
                    }
                    Some(Command::Close) | None => break None,
                },
            }
        };
        match attempt {
            Some(Ok((socket, _response))) => {
                let end = run_connection(&shared, &reporter, &mut retry, socket, &mut commands).await;
                if matches!(end, ConnectionEnd::Disposed) {
                    break 'reconnect;
                }
            }
            Some(Err(error)) => {
                debug!(%error, "failed to connect to test server");
                warn_server_down(&reporter, &mut retry);
            }
            None => break 'reconnect,
        }
        if shared.is_disposed() {
            break;
        }
        shared.set_status(ConnectionStatus::Closed);

        match retry.note_close() {
            CloseNotice::Terminal => {
                show_message(
                    &reporter,
                    MessageKind::Error,
                    &MessageOptions::titled("Test Server is not running").with_collapsed(false),
                    &[format!(
                        "Failed to connect to the test server after {} retries. specwatch keeps retrying in the background.",
                        options.retries,
                    )],
                );
            }
            CloseNotice::Reconnecting(attempt) => {
                let title = if attempt > 1 {
                    format!("({attempt}) Reconnecting...")
                } else {
                    "Reconnecting...".to_owned()
                };
                show_message(
                    &reporter,
                    MessageKind::Info,
                    &MessageOptions::titled(title).with_label("🔌"),
                    &[],
                );
            }
        }

        // keep answering commands while waiting out the retry interval
        let sleep = tokio::time::sleep(options.retry_interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(Command::Request { reply, .. }) => {
                        let _ = reply.send(Err(RpcError::NotConnected));
                    }
                    Some(Command::Close) | None => break 'reconnect,
                },
            }
        }
    }
    shared.dispose();
}

fn warn_server_down(reporter: &SharedReporter, retry: &mut RetryState) {
    if retry.note_error() {
        show_message(
            reporter,
            MessageKind::Warn,
            &MessageOptions::titled("Test Server is not running"),
            &[
                "It seems like the test server isn't started...".to_owned(),
                "Did you forget to run this command:".to_owned(),
                "`pnpm run dev:test-server`".to_owned(),
            ],
        );
    }
}

/// In-flight snapshot fetch. Responses arriving after a reconnect replaced
/// the connection are simply never matched, which discards them.
#[derive(Default)]
struct SnapshotFetch {
    files_request: Option<u64>,
    config_request: Option<u64>,
    files: Option<Vec<TestFile>>,
    config: Option<RunnerConfig>,
}

async fn run_connection(
    shared: &MonitorShared,
    reporter: &SharedReporter,
    retry: &mut RetryState,
    socket: WsStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> ConnectionEnd {
    let (mut sink, mut stream) = socket.split();
    shared.set_status(ConnectionStatus::Open);
    if retry.note_open() {
        show_message(
            reporter,
            MessageKind::Info,
            &MessageOptions::titled("Test Server is back online").with_label("🤖"),
            &[],
        );
    }

    // replace, never merge: drop everything the stale cache held before the
    // snapshot arrives
    shared.registry.lock().unwrap().clear();

    let mut pending: HashMap<u64, PendingReply> = HashMap::new();
    let mut next_request_id: u64 = 0;
    let mut snapshot = SnapshotFetch::default();

    for payload in [RequestPayload::GetFiles, RequestPayload::GetConfig] {
        next_request_id += 1;
        let id = next_request_id;
        match payload {
            RequestPayload::GetFiles => snapshot.files_request = Some(id),
            RequestPayload::GetConfig => snapshot.config_request = Some(id),
            RequestPayload::Rerun { .. } => {}
        }
        let request = ClientRequest { id, payload };
        let frame = match request.encode() {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "failed to encode snapshot request");
                continue;
            }
        };
        if sink.send(Message::Text(frame)).await.is_err() {
            warn_server_down(reporter, retry);
            return ConnectionEnd::SocketClosed;
        }
    }

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(frame))) => {
                    handle_frame(shared, reporter, &mut pending, &mut snapshot, &frame);
                }
                Some(Ok(Message::Close(_))) | None => return ConnectionEnd::SocketClosed,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%error, "socket error");
                    warn_server_down(reporter, retry);
                    return ConnectionEnd::SocketClosed;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Request { payload, reply }) => {
                    next_request_id += 1;
                    let id = next_request_id;
                    match (ClientRequest { id, payload }).encode() {
                        Ok(frame) => {
                            if sink.send(Message::Text(frame)).await.is_err() {
                                let _ = reply.send(Err(RpcError::NotConnected));
                                warn_server_down(reporter, retry);
                                return ConnectionEnd::SocketClosed;
                            }
                            pending.insert(id, reply);
                        }
                        Err(error) => {
                            let _ = reply.send(Err(error.into()));
                        }
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.close().await;
                    return ConnectionEnd::Disposed;
                }
            },
        }
    }
}

fn handle_frame(
    shared: &MonitorShared,
    reporter: &SharedReporter,
    pending: &mut HashMap<u64, PendingReply>,
    snapshot: &mut SnapshotFetch,
    frame: &str,
) {
    let message = match ServerMessage::decode(frame) {
        Ok(message) => message,
        Err(error) => {
            warn!(%error, "dropping malformed frame");
            return;
        }
    };
    match message {
        ServerMessage::Response(response) => {
            handle_response(shared, pending, snapshot, response);
        }
        ServerMessage::Event(event) => handle_event(shared, reporter, event),
    }
}

fn handle_response(
    shared: &MonitorShared,
    pending: &mut HashMap<u64, PendingReply>,
    snapshot: &mut SnapshotFetch,
    response: RpcResponse,
) {
    let result = response.result.unwrap_or(serde_json::Value::Null);
    if snapshot.files_request == Some(response.id) {
        snapshot.files_request = None;
        match serde_json::from_value::<Vec<TestFile>>(result) {
            Ok(files) => snapshot.files = Some(files),
            Err(error) => warn!(%error, "dropping malformed file list"),
        }
        maybe_install_snapshot(shared, snapshot);
    } else if snapshot.config_request == Some(response.id) {
        snapshot.config_request = None;
        match serde_json::from_value::<RunnerConfig>(result) {
            Ok(config) => snapshot.config = Some(config),
            Err(error) => warn!(%error, "dropping malformed config"),
        }
        maybe_install_snapshot(shared, snapshot);
    } else if let Some(reply) = pending.remove(&response.id) {
        let outcome = match response.error {
            Some(message) => Err(RpcError::Server { message }),
            None => Ok(result),
        };
        let _ = reply.send(outcome);
    } else {
        debug!(id = response.id, "response for unknown request");
    }
}

fn maybe_install_snapshot(shared: &MonitorShared, snapshot: &mut SnapshotFetch) {
    if snapshot.files.is_none() || snapshot.config.is_none() {
        return;
    }
    if let (Some(files), Some(config)) = (snapshot.files.take(), snapshot.config.take()) {
        shared.registry.lock().unwrap().replace_files(files);
        shared.config.set(config);
        shared.snapshots.update(|count| count + 1);
    }
}

fn handle_event(shared: &MonitorShared, reporter: &SharedReporter, event: ServerEvent) {
    match event {
        ServerEvent::TaskUpdate { updates } => {
            shared.tracker.note_task_update();
            let mut registry = shared.registry.lock().unwrap();
            for update in updates {
                registry.apply_update(update);
            }
        }
        ServerEvent::Finished => shared.tracker.note_finished(),
        ServerEvent::UserConsoleLog { log } => {
            let mut registry = shared.registry.lock().unwrap();
            registry.attach_log(&log);
            handle_console_log(reporter, &registry, &log);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_notice_after_ceiling() {
        let mut retry = RetryState::new(20);
        for attempt in 1..20 {
            assert_eq!(retry.note_close(), CloseNotice::Reconnecting(attempt));
        }
        assert_eq!(retry.note_close(), CloseNotice::Terminal);

        // the counter reset: the next cycle starts from scratch
        assert_eq!(retry.note_close(), CloseNotice::Reconnecting(1));
    }

    #[test]
    fn server_down_warning_fires_once_per_outage() {
        let mut retry = RetryState::new(20);
        assert!(retry.note_error());
        assert!(!retry.note_error());

        // a successful connection re-arms the warning
        assert!(retry.note_open());
        assert!(retry.note_error());

        // so does the terminal notice
        let mut retry = RetryState::new(2);
        assert!(retry.note_error());
        retry.note_close();
        assert_eq!(retry.note_close(), CloseNotice::Terminal);
        assert!(retry.note_error());
    }

    #[test]
    fn open_resets_the_attempt_counter() {
        let mut retry = RetryState::new(20);
        retry.note_close();
        retry.note_close();
        assert!(!retry.note_open());
        assert_eq!(retry.note_close(), CloseNotice::Reconnecting(1));
    }

    #[test]
    fn dashboard_url_derives_from_the_socket_url() {
        assert_eq!(
            dashboard_url("ws://localhost:51205/__vitest_api__"),
            "http://localhost:51205/__vitest__/#/",
        );
        assert_eq!(
            dashboard_url("wss://course.example.com/__vitest_api__"),
            "https://course.example.com/__vitest__/#/",
        );
    }

    #[test]
    fn default_options_match_the_service() {
        let options = ServerOptions::default();
        assert_eq!(options.url, "ws://localhost:51205/__vitest_api__");
        assert_eq!(options.retries, 20);
        assert_eq!(options.retry_interval, Duration::from_millis(2500));
    }
}
