// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing messages.
//!
//! The service-side hints and the client's own connection/run notices all
//! flow through the [`Reporter`] trait. The default implementation renders
//! styled groups to stderr; tests swap in [`RecordingReporter`].

use owo_colors::{OwoColorize, Style};
use regex::Regex;
use std::{
    io::Write,
    str::FromStr,
    sync::{Arc, LazyLock, Mutex},
};
use swrite::{SWrite, swrite, swriteln};

static MD_BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold regex is valid"));
static MD_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`(.*?)`").expect("code regex is valid"));

/// The kind of a user-facing message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageKind {
    /// A hint to unblock an exercise. Hidden entirely when tips are off.
    Tip,
    /// Useful information about the exercise or the session.
    Info,
    /// Something unexpected that deserves attention.
    Warn,
    /// Something went wrong.
    Error,
}

impl MessageKind {
    /// The default label shown in front of the title.
    pub fn label(self) -> &'static str {
        match self {
            MessageKind::Tip => "👉 Tip",
            MessageKind::Info => "ℹ️",
            MessageKind::Warn => "🚧",
            MessageKind::Error => "⛔️",
        }
    }

    /// The default title used when the message does not provide one.
    pub fn default_title(self) -> &'static str {
        match self {
            MessageKind::Tip => "Unfold this if you are blocked",
            MessageKind::Info => "info",
            MessageKind::Warn => "warning",
            MessageKind::Error => "error",
        }
    }

    /// Whether groups of this kind render collapsed by default.
    pub fn collapsed_by_default(self) -> bool {
        matches!(self, MessageKind::Tip | MessageKind::Error)
    }
}

impl FromStr for MessageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tip") {
            Ok(MessageKind::Tip)
        } else if s.eq_ignore_ascii_case("info") {
            Ok(MessageKind::Info)
        } else if s.eq_ignore_ascii_case("warn") {
            Ok(MessageKind::Warn)
        } else if s.eq_ignore_ascii_case("error") {
            Ok(MessageKind::Error)
        } else {
            Err(())
        }
    }
}

/// Per-message overrides for the kind-derived defaults.
#[derive(Clone, Debug, Default)]
pub struct MessageOptions {
    /// Overrides the kind's label.
    pub label: Option<String>,
    /// Overrides the kind's default title.
    pub title: Option<String>,
    /// An extra line rendered dimmed under the title.
    pub subtitle: Option<String>,
    /// Overrides the kind's collapsed default.
    pub collapsed: Option<bool>,
}

impl MessageOptions {
    /// Options with only a title set.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Returns these options with the label replaced.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns these options with the collapsed flag replaced.
    pub fn with_collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = Some(collapsed);
        self
    }

    /// Returns these options with the subtitle replaced.
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

/// Sink for user-facing messages.
pub trait Reporter: Send {
    /// Shows a message: a headline plus zero or more body lines.
    fn show(&mut self, kind: MessageKind, options: &MessageOptions, lines: &[String]);

    /// Clears previous output, where the medium supports it.
    fn clear(&mut self) {}
}

/// A reporter shared between the connection event loop and run watchers.
pub type SharedReporter = Arc<Mutex<dyn Reporter>>;

/// Locks `reporter` and shows one message.
pub fn show_message(
    reporter: &SharedReporter,
    kind: MessageKind,
    options: &MessageOptions,
    lines: &[String],
) {
    reporter.lock().unwrap().show(kind, options, lines);
}

#[derive(Clone, Debug, Default)]
struct Styles {
    tip: Style,
    info: Style,
    warn: Style,
    error: Style,
    title: Style,
    subtitle: Style,
    bold: Style,
    code: Style,
    fence: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.tip = Style::new().purple().bold();
        self.info = Style::new().blue().bold();
        self.warn = Style::new().yellow().bold();
        self.error = Style::new().red().bold();
        self.title = Style::new().bold();
        self.subtitle = Style::new().dimmed();
        self.bold = Style::new().bold();
        self.code = Style::new().cyan();
        self.fence = Style::new().dimmed();
    }

    fn for_kind(&self, kind: MessageKind) -> Style {
        match kind {
            MessageKind::Tip => self.tip,
            MessageKind::Info => self.info,
            MessageKind::Warn => self.warn,
            MessageKind::Error => self.error,
        }
    }
}

/// Renders messages as styled groups on a terminal.
pub struct ConsoleReporter {
    writer: Box<dyn Write + Send>,
    styles: Box<Styles>,
    show_tips: bool,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    /// Creates a reporter writing to stderr, without colors.
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    /// Creates a reporter writing to the given sink.
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            styles: Box::default(),
            show_tips: true,
        }
    }

    /// Enables ANSI styling.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Sets whether tip messages are shown at all.
    pub fn set_show_tips(&mut self, show_tips: bool) {
        self.show_tips = show_tips;
    }

    /// Wraps this reporter for sharing.
    pub fn shared(self) -> SharedReporter {
        Arc::new(Mutex::new(self))
    }

    fn render_line(&self, line: &str, fence_active: bool) -> String {
        if fence_active || line.contains("http") {
            return line.to_owned();
        }
        let styled = MD_BOLD_RE.replace_all(line, |caps: &regex::Captures<'_>| {
            (&caps[1]).style(self.styles.bold).to_string()
        });
        MD_CODE_RE
            .replace_all(&styled, |caps: &regex::Captures<'_>| {
                format!("`{}`", (&caps[1]).style(self.styles.code))
            })
            .into_owned()
    }
}

impl Reporter for ConsoleReporter {
    fn show(&mut self, kind: MessageKind, options: &MessageOptions, lines: &[String]) {
        if kind == MessageKind::Tip && !self.show_tips {
            return;
        }

        let label = options.label.as_deref().unwrap_or_else(|| kind.label());
        let title = options
            .title
            .as_deref()
            .unwrap_or_else(|| kind.default_title());

        let mut out = String::new();
        swriteln!(
            out,
            " {}  {}",
            label.style(self.styles.for_kind(kind)),
            title.style(self.styles.title),
        );
        if let Some(subtitle) = &options.subtitle {
            swriteln!(out, "    {}", subtitle.style(self.styles.subtitle));
        }

        let mut fence_active = false;
        for line in lines {
            if line.starts_with("```") {
                fence_active = !fence_active;
                swriteln!(out, "    {}", line.style(self.styles.fence));
                continue;
            }
            swrite!(out, "    ");
            swriteln!(out, "{}", self.render_line(line, fence_active));
        }

        let _ = self.writer.write_all(out.as_bytes());
        let _ = self.writer.flush();
    }

    fn clear(&mut self) {
        // ANSI clear screen + cursor home, the terminal analogue of the
        // browser's console.clear().
        let _ = self.writer.write_all(b"\x1b[2J\x1b[1;1H");
        let _ = self.writer.flush();
    }
}

/// A recorded message, as captured by [`RecordingReporter`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedMessage {
    /// The message kind.
    pub kind: MessageKind,
    /// The resolved label.
    pub label: String,
    /// The resolved title.
    pub title: String,
    /// The subtitle, if any.
    pub subtitle: Option<String>,
    /// The body lines.
    pub lines: Vec<String>,
}

#[derive(Default)]
struct Recorded {
    messages: Vec<RecordedMessage>,
    clears: usize,
}

/// Test double that records every message instead of printing it.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingReporter {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a clone of this recorder for sharing; the original keeps
    /// access to everything recorded through the shared handle.
    pub fn shared(&self) -> SharedReporter {
        Arc::new(Mutex::new(self.clone()))
    }

    /// All messages recorded so far.
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.inner.lock().unwrap().messages.clone()
    }

    /// The titles of all recorded messages, in order.
    pub fn titles(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|message| message.title.clone())
            .collect()
    }

    /// How many times `clear` was called.
    pub fn clears(&self) -> usize {
        self.inner.lock().unwrap().clears
    }
}

impl Reporter for RecordingReporter {
    fn show(&mut self, kind: MessageKind, options: &MessageOptions, lines: &[String]) {
        self.inner.lock().unwrap().messages.push(RecordedMessage {
            kind,
            label: options
                .label
                .clone()
                .unwrap_or_else(|| kind.label().to_owned()),
            title: options
                .title
                .clone()
                .unwrap_or_else(|| kind.default_title().to_owned()),
            subtitle: options.subtitle.clone(),
            lines: lines.to_vec(),
        });
    }

    fn clear(&mut self) {
        self.inner.lock().unwrap().clears += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("tip".parse(), Ok(MessageKind::Tip));
        assert_eq!("TIP".parse(), Ok(MessageKind::Tip));
        assert_eq!("Error".parse(), Ok(MessageKind::Error));
        assert_eq!("fatal".parse::<MessageKind>(), Err(()));
    }

    #[test]
    fn console_reporter_drops_tips_when_disabled() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let mut reporter = ConsoleReporter::with_writer(Box::new(SharedBuffer(Arc::clone(&buffer))));
        reporter.set_show_tips(false);

        reporter.show(
            MessageKind::Tip,
            &MessageOptions::titled("hidden"),
            &["line".to_owned()],
        );
        assert!(buffer.lock().unwrap().is_empty());

        reporter.show(
            MessageKind::Error,
            &MessageOptions::titled("shown"),
            &["line".to_owned()],
        );
        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(output.contains("shown"));
        assert!(output.contains("    line"));
    }

    #[test]
    fn recording_reporter_resolves_defaults() {
        let recording = RecordingReporter::new();
        let shared = recording.shared();
        show_message(&shared, MessageKind::Warn, &MessageOptions::default(), &[]);

        let messages = recording.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].label, "🚧");
        assert_eq!(messages[0].title, "warning");
    }

    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
