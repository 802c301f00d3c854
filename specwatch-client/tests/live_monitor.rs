// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests against a loopback websocket server that speaks the
//! service protocol.

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use specwatch_client::{
    connection::{ConnectionStatus, ServerOptions, TestMonitor},
    report::{MessageKind, RecordingReporter},
    settings::Settings,
    status::{ExerciseScope, OverallStatus},
};
use specwatch_protocol::TaskId;
use std::{future::Future, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};

async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("test timed out")
}

fn files_json() -> Value {
    json!([{
        "id": "f-1",
        "filepath": "/course/src/exercises/2.1-auth/.internal/auth.spec.ts",
        "tasks": [
            {
                "type": "suite",
                "id": "s-auth",
                "name": "Auth",
                "tasks": [
                    { "type": "test", "id": "t-1", "name": "logs in" },
                ],
            },
        ],
    }])
}

fn config_json() -> Value {
    json!({ "root": "/course", "include": ["**/*.spec.ts"], "watch": true })
}

async fn read_request(socket: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(frame))) => {
                return serde_json::from_str(&frame).expect("client sent malformed frame");
            }
            Some(Ok(_)) => continue,
            other => panic!("socket ended while waiting for a request: {other:?}"),
        }
    }
}

async fn send_json(socket: &mut WebSocketStream<TcpStream>, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("failed to send frame");
}

/// Answers the two snapshot requests issued after every (re)connect.
async fn serve_snapshot(socket: &mut WebSocketStream<TcpStream>, files: Value) {
    for _ in 0..2 {
        let request = read_request(socket).await;
        let id = request["id"].as_u64().expect("request without id");
        let result = match request["method"].as_str() {
            Some("getFiles") => files.clone(),
            Some("getConfig") => config_json(),
            other => panic!("unexpected method during snapshot: {other:?}"),
        };
        send_json(socket, json!({ "id": id, "result": result })).await;
    }
}

fn options_for(addr: std::net::SocketAddr) -> ServerOptions {
    ServerOptions {
        url: format!("ws://{addr}/__vitest_api__"),
        retries: 20,
        retry_interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn full_feedback_cycle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        serve_snapshot(&mut socket, files_json()).await;

        send_json(
            &mut socket,
            json!({
                "event": "taskUpdate",
                "updates": [{ "id": "t-1", "result": { "state": "run" } }],
            }),
        )
        .await;
        send_json(
            &mut socket,
            json!({
                "event": "userConsoleLog",
                "log": {
                    "taskId": "t-1",
                    "type": "stdout",
                    "content": "__MESSAGE[tip] check the token\n",
                },
            }),
        )
        .await;
        send_json(
            &mut socket,
            json!({
                "event": "taskUpdate",
                "updates": [{
                    "id": "t-1",
                    "result": { "state": "fail", "errors": [{ "message": "nope" }] },
                }],
            }),
        )
        .await;
        send_json(&mut socket, json!({ "event": "finished" })).await;

        // hold the connection open until the client closes it
        while let Some(Ok(_)) = socket.next().await {}
    });

    let recording = RecordingReporter::new();
    let monitor = TestMonitor::connect(options_for(addr), recording.shared());
    let scope = ExerciseScope::exercise("2.1-auth");
    let _transitions = monitor.watch_transitions(scope.clone(), Settings::default());
    let status_observable = monitor.connection_status().clone();

    within(monitor.wait_for_snapshot()).await;
    assert_eq!(status_observable.get(), ConnectionStatus::Open);
    assert!(monitor.with_registry(|registry| registry.task(&TaskId::new("t-1")).is_some()));

    within(monitor.wait_for_run_complete(0)).await;
    assert_eq!(monitor.run_id().get(), 1);

    let status = monitor.project(&scope);
    assert_eq!(status.failing, 1);
    assert_eq!(status.overall, OverallStatus::Fail);
    assert_eq!(status.suites["Auth"].icon, "🔴");

    let titles = recording.titles();
    assert!(titles.contains(&"New Run for: 2.1-auth".to_owned()), "{titles:?}");
    assert!(titles.contains(&"1 test is still failing".to_owned()), "{titles:?}");
    // the tip shows once live and once replayed with the failure report
    let tip_count = recording
        .messages()
        .iter()
        .filter(|message| {
            message.kind == MessageKind::Tip && message.title == "Auth > logs in"
        })
        .count();
    assert_eq!(tip_count, 2);
    let failure_report = recording
        .messages()
        .into_iter()
        .find(|message| message.title == "1 test is still failing")
        .unwrap();
    assert!(failure_report.lines.contains(&"- logs in".to_owned()));
    assert!(
        failure_report
            .lines
            .iter()
            .any(|line| line.contains("/__vitest__/#/?file=f-1")),
        "{failure_report:?}",
    );

    monitor.close().await;
    assert_eq!(status_observable.get(), ConnectionStatus::Closed);
    server.abort();
}

#[tokio::test]
async fn reconnect_replaces_snapshot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // first connection: serve a snapshot with a soon-to-be-stale task,
        // then drop the connection
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        let stale_files = json!([{
            "id": "f-1",
            "filepath": "/course/src/exercises/2.1-auth/.internal/auth.spec.ts",
            "tasks": [
                { "type": "test", "id": "t-stale", "name": "old test" },
                { "type": "test", "id": "t-keep", "name": "kept test" },
            ],
        }]);
        serve_snapshot(&mut socket, stale_files).await;
        socket.close(None).await.unwrap();

        // second connection: the stale task is gone
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        let fresh_files = json!([{
            "id": "f-1",
            "filepath": "/course/src/exercises/2.1-auth/.internal/auth.spec.ts",
            "tasks": [
                { "type": "test", "id": "t-keep", "name": "kept test" },
            ],
        }]);
        serve_snapshot(&mut socket, fresh_files).await;
        while let Some(Ok(_)) = socket.next().await {}
    });

    let recording = RecordingReporter::new();
    let monitor = TestMonitor::connect(options_for(addr), recording.shared());

    within(monitor.wait_for_snapshots(1)).await;
    assert!(monitor.with_registry(|registry| registry.task(&TaskId::new("t-stale")).is_some()));

    within(monitor.wait_for_snapshots(2)).await;
    assert!(monitor.with_registry(|registry| registry.task(&TaskId::new("t-stale")).is_none()));
    assert!(monitor.with_registry(|registry| registry.task(&TaskId::new("t-keep")).is_some()));

    let titles = recording.titles();
    assert!(titles.contains(&"Reconnecting...".to_owned()), "{titles:?}");

    monitor.close().await;
    server.abort();
}

#[tokio::test]
async fn rerun_scopes_to_the_exercise_files() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        serve_snapshot(&mut socket, files_json()).await;

        let request = read_request(&mut socket).await;
        assert_eq!(request["method"], "rerun");
        assert_eq!(
            request["params"]["filepaths"],
            json!(["/course/src/exercises/2.1-auth/.internal/auth.spec.ts"]),
        );
        let id = request["id"].as_u64().unwrap();
        send_json(&mut socket, json!({ "id": id, "result": Value::Null })).await;

        send_json(
            &mut socket,
            json!({
                "event": "taskUpdate",
                "updates": [{ "id": "t-1", "result": { "state": "pass" } }],
            }),
        )
        .await;
        send_json(&mut socket, json!({ "event": "finished" })).await;
        while let Some(Ok(_)) = socket.next().await {}
    });

    let recording = RecordingReporter::new();
    let monitor = TestMonitor::connect(options_for(addr), recording.shared());
    let scope = ExerciseScope::exercise("2.1-auth");
    let _transitions = monitor.watch_transitions(scope.clone(), Settings::default());

    within(monitor.wait_for_snapshot()).await;
    let previous_run = monitor.run_id().get();
    within(monitor.rerun(&scope)).await.unwrap();
    within(monitor.wait_for_run_complete(previous_run)).await;

    let status = monitor.project(&scope);
    assert_eq!(status.overall, OverallStatus::Pass);
    assert_eq!(status.failing, 0);
    assert!(
        recording
            .titles()
            .contains(&"All tests are passing!".to_owned()),
    );

    monitor.close().await;
    server.abort();
}
