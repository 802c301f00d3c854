// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of hint messages embedded in captured console output.
//!
//! Exercise code emits structured hints through normal process output, as
//! lines of the form `__MESSAGE[<type>] <text>`. A single flush may carry
//! several logical messages with the marker repeated inline, so one captured
//! entry can expand to several displayed messages.

use crate::{
    report::{MessageKind, MessageOptions, SharedReporter, show_message},
    state::TaskRegistry,
};
use regex::Regex;
use specwatch_protocol::{ConsoleLog, LogStream};
use std::sync::LazyLock;

/// The marker token prefixing structured hint output.
pub const MESSAGE_MARKER: &str = "__MESSAGE";

/// Extracts the bracketed type tag and the message body. Case-insensitive,
/// with `.` matching newlines so the body may span lines.
static MESSAGE_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\[([^\]]+)\]\s*(.*)").expect("message type regex is valid"));

/// A single logical message recovered from a marker line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedMessage {
    /// The message kind from the bracketed tag.
    pub kind: MessageKind,
    /// The message body.
    pub text: String,
}

/// Splits one captured flush into its logical marker messages.
///
/// Content that does not start with the marker yields nothing; messages
/// whose tag does not parse are dropped.
pub fn parse_marker_messages(content: &str) -> Vec<ParsedMessage> {
    let Some(stripped) = content.strip_prefix(MESSAGE_MARKER) else {
        return Vec::new();
    };
    // the capture adds one empty trailing line per flush
    let stripped = stripped.strip_suffix('\n').unwrap_or(stripped);

    stripped
        // the newline removes blank lines between grouped messages while
        // still splitting on every repeated marker
        .split("\n__MESSAGE")
        .filter_map(|message| {
            let captures = MESSAGE_TYPE_RE.captures(message)?;
            let kind = captures[1].parse().ok()?;
            Some(ParsedMessage {
                kind,
                text: captures[2].to_owned(),
            })
        })
        .collect()
}

/// Displays a captured console entry.
///
/// Marker messages on stdout are parsed and shown individually; a tip with a
/// known task context is titled with the task's suite path. Anything on
/// stderr surfaces as an error display, marker or not.
pub fn handle_console_log(reporter: &SharedReporter, registry: &TaskRegistry, log: &ConsoleLog) {
    match log.stream {
        LogStream::Stdout if log.content.starts_with(MESSAGE_MARKER) => {
            let task = log.task_id.as_ref().and_then(|id| registry.task(id));
            for message in parse_marker_messages(&log.content) {
                let lines: Vec<String> = message.text.split('\n').map(str::to_owned).collect();
                match task {
                    Some(task) if message.kind == MessageKind::Tip => {
                        let options = MessageOptions::titled(registry.display_title(task))
                            .with_subtitle("💡 Unfold this only if you are blocked");
                        show_message(reporter, message.kind, &options, &lines);
                    }
                    _ => {
                        show_message(reporter, message.kind, &MessageOptions::default(), &lines);
                    }
                }
            }
        }
        LogStream::Stderr => {
            show_message(
                reporter,
                MessageKind::Error,
                &MessageOptions::default(),
                &["Failed running test".to_owned(), log.content.clone()],
            );
        }
        LogStream::Stdout => {}
    }
}
