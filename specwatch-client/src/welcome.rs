// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The startup banner and the hard-mode toggle.

use crate::{
    report::{MessageKind, MessageOptions, SharedReporter, show_message},
    settings::{Settings, SettingsManager},
};

/// Shows the welcome banner, unless the user hid it or turned tips off.
pub fn show_welcome(reporter: &SharedReporter, settings: &Settings) {
    if settings.hide_welcome_message || !settings.show_tips {
        return;
    }

    show_message(
        reporter,
        MessageKind::Tip,
        &MessageOptions::titled("Let's get you started with the Exercise Platform 👇")
            .with_label("👋 Welcome!")
            .with_collapsed(false),
        &[
            "Tips like this one should help you unblock your way through exercises.".to_owned(),
            "**Only unveil them after being blocked for at least a few minutes!**".to_owned(),
            "You can **completely** disable tips by running:".to_owned(),
            "```sh".to_owned(),
            "specwatch tips off".to_owned(),
            "```".to_owned(),
            "You can turn them back again with `specwatch tips on`.".to_owned(),
            "Hide the whole welcome message with:".to_owned(),
            "```sh".to_owned(),
            "specwatch settings set hide-welcome-message true".to_owned(),
            "```".to_owned(),
        ],
    );

    show_message(
        reporter,
        MessageKind::Info,
        &MessageOptions::titled("This is an info message").with_collapsed(true),
        &[
            "This message contains useful information about the exercise".to_owned(),
            "Try not to miss info messages".to_owned(),
        ],
    );
    show_message(
        reporter,
        MessageKind::Warn,
        &MessageOptions::titled("This is a warning message").with_collapsed(true),
        &[
            "It means that something unexpected was found in your code or that there is something you should pay attention to".to_owned(),
            "You should always read warnings".to_owned(),
        ],
    );
    show_message(
        reporter,
        MessageKind::Error,
        &MessageOptions::titled("This is an error message").with_collapsed(true),
        &[
            "Something unexpected happened, you might need to reach out to your instructor for help".to_owned(),
            "Pay extra attention to error messages".to_owned(),
        ],
    );
    show_message(
        reporter,
        MessageKind::Tip,
        &MessageOptions::titled("This is a tip message").with_collapsed(true),
        &[
            "Tips should help you unblock your way through exercises. They show the name of the test that is failing.".to_owned(),
            "**Only unveil them after being blocked for at least a few minutes!**".to_owned(),
        ],
    );
}

/// Toggles hard mode: tips off with a send-off, or a nudge when the user is
/// already there.
pub fn toggle_hard_mode(
    reporter: &SharedReporter,
    manager: &mut SettingsManager,
) -> Result<(), crate::errors::SettingsError> {
    if !manager.settings.show_tips {
        show_message(
            reporter,
            MessageKind::Info,
            &MessageOptions::titled("Struggling on the hard mode, are we?").with_label("👀"),
            &[
                "You are already on Hard Mode, so I imagine you wanted to turn tips back on instead.".to_owned(),
                "Simply run".to_owned(),
                "```sh".to_owned(),
                "specwatch tips on".to_owned(),
                "```".to_owned(),
                "and voila!".to_owned(),
                "Don't worry, we won't tell anyone you needed a little help 🤫".to_owned(),
            ],
        );
        return Ok(());
    }

    // show the send-off before tips get silenced
    show_message(
        reporter,
        MessageKind::Tip,
        &MessageOptions::titled("Hard mode activated!")
            .with_label("💀")
            .with_collapsed(false),
        &["You are a brave one, aren't you?".to_owned()],
    );
    manager.settings.show_tips = false;
    manager.save()
}
