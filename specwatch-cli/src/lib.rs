// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live test status for guided exercise courses.
//!
//! Connects to the course's local test-execution service and streams
//! pass/fail feedback plus contextual hints to the terminal.

#![warn(missing_docs)]

mod output;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{Result, eyre::WrapErr};
use output::print_summary;
use specwatch_client::{
    connection::{ServerOptions, TestMonitor, default_server_url},
    report::{ConsoleReporter, MessageKind, MessageOptions, SharedReporter, show_message},
    settings::SettingsManager,
    status::ExerciseScope,
    welcome::{show_welcome, toggle_hard_mode},
};
use std::{io::IsTerminal, time::Duration};

/// How long to wait for the initial snapshot before giving up on a one-shot
/// command.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30);

/// The specwatch CLI.
#[derive(Debug, Parser)]
#[command(
    name = "specwatch",
    bin_name = "specwatch",
    version,
    about = "Live test status for guided exercise courses"
)]
pub struct SpecwatchApp {
    /// Websocket endpoint of the test service.
    #[arg(long, global = true, value_name = "URL", env = "SPECWATCH_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch test results until interrupted
    Watch {
        /// Exercise directory to scope to (all tests when omitted)
        #[arg(long, value_name = "DIRNAME")]
        exercise: Option<String>,
    },
    /// Re-run the scoped tests once and exit with their status
    Rerun {
        /// Exercise directory to scope to (all tests when omitted)
        #[arg(long, value_name = "DIRNAME")]
        exercise: Option<String>,
    },
    /// Inspect or edit persisted settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Turn hint tips on or off ("hard mode")
    Tips {
        /// The desired tips state
        #[arg(value_enum)]
        state: TipsState,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print the settings file location and current values
    Show,
    /// Set a setting (e.g. `specwatch settings set clear-on-test-run true`)
    Set {
        /// The setting key, in kebab-case
        key: String,
        /// The new value
        value: String,
    },
    /// Restore the defaults
    Reset,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TipsState {
    /// Show tips (the default)
    On,
    /// Hard mode: hide every tip
    Off,
}

impl SpecwatchApp {
    /// Executes the selected command, returning the process exit code.
    pub fn exec(self) -> Result<i32> {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();

        let server_options = ServerOptions {
            url: self.url.unwrap_or_else(default_server_url),
            ..ServerOptions::default()
        };

        match self.command {
            Command::Watch { exercise } => exec_watch(server_options, scope_for(exercise)),
            Command::Rerun { exercise } => exec_rerun(server_options, scope_for(exercise)),
            Command::Settings { command } => exec_settings(command),
            Command::Tips { state } => exec_tips(state),
        }
    }
}

fn scope_for(exercise: Option<String>) -> ExerciseScope {
    exercise.map_or_else(ExerciseScope::all, ExerciseScope::exercise)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start the async runtime")
}

fn console_reporter(show_tips: bool) -> SharedReporter {
    let mut reporter = ConsoleReporter::new();
    if std::io::stderr().is_terminal() {
        reporter.colorize();
    }
    reporter.set_show_tips(show_tips);
    reporter.shared()
}

fn exec_watch(server_options: ServerOptions, scope: ExerciseScope) -> Result<i32> {
    let manager = SettingsManager::load_default()?;
    let settings = manager.settings;
    let reporter = console_reporter(settings.show_tips);

    runtime()?.block_on(async {
        show_welcome(&reporter, &settings);
        let monitor = TestMonitor::connect(server_options, reporter.clone());
        let _transitions = monitor.watch_transitions(scope.clone(), settings.clone());

        tokio::signal::ctrl_c()
            .await
            .wrap_err("failed to listen for ctrl-c")?;

        let status = monitor.project(&scope);
        print_summary(&status);
        monitor.close().await;
        Ok(0)
    })
}

fn exec_rerun(server_options: ServerOptions, scope: ExerciseScope) -> Result<i32> {
    let manager = SettingsManager::load_default()?;
    let settings = manager.settings;
    let reporter = console_reporter(settings.show_tips);

    runtime()?.block_on(async {
        let monitor = TestMonitor::connect(server_options, reporter.clone());
        tokio::time::timeout(SNAPSHOT_TIMEOUT, monitor.wait_for_snapshot())
            .await
            .wrap_err("the test server did not answer in time")?;

        let previous_run = monitor.run_id().get();
        monitor
            .rerun(&scope)
            .await
            .wrap_err("failed to trigger a test run")?;
        monitor.wait_for_run_complete(previous_run).await;

        let status = monitor.project(&scope);
        print_summary(&status);
        let code = if status.failing > 0 { 1 } else { 0 };
        monitor.close().await;
        Ok(code)
    })
}

fn exec_settings(command: SettingsCommand) -> Result<i32> {
    let mut manager = SettingsManager::load_default()?;
    match command {
        SettingsCommand::Show => {
            println!("settings file: {}", manager.path());
            println!("show-tips = {}", manager.settings.show_tips);
            println!("clear-on-test-run = {}", manager.settings.clear_on_test_run);
            println!(
                "hide-welcome-message = {}",
                manager.settings.hide_welcome_message
            );
        }
        SettingsCommand::Set { key, value } => {
            manager.set(&key, &value)?;
            manager.save()?;
            println!("{key} = {value}");
        }
        SettingsCommand::Reset => {
            manager.reset()?;
            println!("settings restored to defaults");
        }
    }
    Ok(0)
}

fn exec_tips(state: TipsState) -> Result<i32> {
    let mut manager = SettingsManager::load_default()?;
    let reporter = console_reporter(true);
    match state {
        TipsState::Off => toggle_hard_mode(&reporter, &mut manager)?,
        TipsState::On => {
            if manager.settings.show_tips {
                show_message(
                    &reporter,
                    MessageKind::Info,
                    &MessageOptions::titled("Tips are already on"),
                    &[],
                );
            } else {
                manager.settings.show_tips = true;
                manager.save()?;
                show_message(
                    &reporter,
                    MessageKind::Info,
                    &MessageOptions::titled("Tips are back on!").with_label("💡"),
                    &[],
                );
            }
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        SpecwatchApp::command().debug_assert();
    }

    #[test]
    fn scope_defaults_to_all_tests() {
        let app = SpecwatchApp::try_parse_from(["specwatch", "watch"]).unwrap();
        let Command::Watch { exercise } = app.command else {
            panic!("expected the watch command");
        };
        assert_eq!(scope_for(exercise).title(), "All Tests");

        let app =
            SpecwatchApp::try_parse_from(["specwatch", "watch", "--exercise", "1.4-foo"]).unwrap();
        let Command::Watch { exercise } = app.command else {
            panic!("expected the watch command");
        };
        assert_eq!(scope_for(exercise).title(), "1.4-foo");
    }
}
