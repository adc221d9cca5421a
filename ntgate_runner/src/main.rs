// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! CLI entry point for the ntgate runner.

use anyhow::Result;
use clap::Parser;
use ntgate_runner::{CliArgs, run};

fn main() -> Result<()> {
    run(CliArgs::parse())
}
