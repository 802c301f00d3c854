// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the specwatch client.

use camino::Utf8PathBuf;
use specwatch_protocol::ProtocolError;
use thiserror::Error;

/// An error that occurred while issuing a request to the test server.
///
/// Connection loss is not an error: the monitor reconnects on its own and
/// surfaces progress as user notifications. These errors only reach callers
/// performing explicit requests.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The monitor was closed.
    #[error("the test monitor is closed")]
    Closed,

    /// No connection is currently established.
    #[error("not connected to the test server")]
    NotConnected,

    /// The connection dropped before the response arrived.
    #[error("the connection dropped before a response arrived")]
    ResponseDropped,

    /// The server answered with an error.
    #[error("the test server returned an error: {message}")]
    Server {
        /// The server's error message.
        message: String,
    },

    /// A frame could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// An error that occurred while reading or writing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings directory could not be determined.
    #[error("could not determine the settings directory")]
    Home(#[from] etcetera::HomeDirError),

    /// The settings path is not valid UTF-8.
    #[error("settings path is not valid UTF-8")]
    NonUtf8(#[from] camino::FromPathBufError),

    /// The settings file exists but could not be read or parsed.
    #[error("failed to read settings from `{path}`")]
    Read {
        /// The settings file location.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: config::ConfigError,
    },

    /// The settings could not be serialized.
    #[error("failed to serialize settings")]
    Serialize(#[source] toml::ser::Error),

    /// The settings file could not be written.
    #[error("failed to write settings to `{path}`")]
    Write {
        /// The settings file location.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An unrecognized setting key.
    #[error(
        "unrecognized setting `{key}` (known settings: show-tips, clear-on-test-run, hide-welcome-message)"
    )]
    UnknownKey {
        /// The key as typed.
        key: String,
    },

    /// A value that does not parse for the given key.
    #[error("invalid value `{value}` for setting `{key}` (expected true or false)")]
    InvalidValue {
        /// The key as typed.
        key: String,
        /// The value as typed.
        value: String,
    },
}
