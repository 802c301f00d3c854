// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use color_eyre::Result;
use specwatch_cli::SpecwatchApp;

fn main() -> Result<()> {
    color_eyre::install()?;

    let app = SpecwatchApp::parse();
    let code = app.exec()?;
    std::process::exit(code);
}
