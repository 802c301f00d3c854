// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core client logic for [specwatch](https://crates.io/crates/specwatch-cli).
//!
//! specwatch keeps a websocket connection to a local test-execution service,
//! aggregates incremental task results into a registry, projects
//! per-exercise status summaries, and surfaces hints embedded in captured
//! console output.
//!
//! The flow of data: socket events feed the [`state::TaskRegistry`] through
//! the connection event loop, observers registered on
//! [`observer::Observable`] values fire, and consumers recompute
//! [`status::ExerciseStatus`] projections from the updated registry.

pub mod connection;
pub mod console;
pub mod errors;
pub mod observer;
pub mod report;
pub mod settings;
pub mod state;
pub mod status;
pub mod welcome;
