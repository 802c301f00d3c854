// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal rendering of status summaries.

use owo_colors::{OwoColorize, Style};
use specwatch_client::status::{ExerciseStatus, test_icon};
use std::io::IsTerminal;
use swrite::{SWrite, swriteln};

#[derive(Clone, Debug, Default)]
struct Styles {
    title: Style,
    counts: Style,
    dim: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.title = Style::new().bold();
        self.counts = Style::new().bold();
        self.dim = Style::new().dimmed();
    }
}

/// Prints the per-suite breakdown and aggregate counts for a projection.
pub(crate) fn print_summary(status: &ExerciseStatus) {
    let mut styles = Styles::default();
    if std::io::stdout().is_terminal() {
        styles.colorize();
    }

    let mut out = String::new();
    swriteln!(out);
    swriteln!(
        out,
        "{} {} — {}",
        status.overall.icon(),
        status.title.style(styles.title),
        status.overall.text(),
    );

    if !status.has_tests {
        swriteln!(
            out,
            "    {}",
            "No tests declared for this exercise yet.".style(styles.dim),
        );
        print!("{out}");
        return;
    }

    swriteln!(
        out,
        "    {} running, {} failing, {} passing",
        status.running.style(styles.counts),
        status.failing.style(styles.counts),
        status.passing.style(styles.counts),
    );

    for group in status.suites.values() {
        swriteln!(out, "    {} {}", group.icon, group.name);
        for test in &group.tests {
            swriteln!(out, "        {} {}", test_icon(test.effective_state()), test.name);
        }
    }
    for test in status.tests.iter().filter(|test| test.suite_name().is_none()) {
        swriteln!(out, "    {} {}", test_icon(test.effective_state()), test.name);
    }

    print!("{out}");
}
