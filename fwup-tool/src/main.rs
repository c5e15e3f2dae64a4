// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for the staged update engine.
//!
//! Usage:
//!   fwup pack app.bin --kind application --version 1.2.0 -o out/
//!   fwup inspect out/tag.bin
//!   fwup stage --internal int.bin --external ext.bin app.bin --kind application --version 1.2.0
//!   fwup apply --internal int.bin --external ext.bin
//!
//! Set `RUST_LOG=fwup_common=debug` to see the engine's own log lines.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fwup=info,fwup_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();
    cli::run(args)
}
