// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// The service's resolved runner configuration, fetched as part of the
/// snapshot after every (re)connect.
///
/// The client treats this as mostly opaque display data; only the fields it
/// actually surfaces are modelled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// The root directory tests are resolved against.
    #[serde(default)]
    pub root: Utf8PathBuf,

    /// Glob patterns for files included in the run.
    #[serde(default)]
    pub include: Vec<String>,

    /// Whether the service is in watch mode.
    #[serde(default)]
    pub watch: bool,
}
