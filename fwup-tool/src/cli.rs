// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use fwup_common::ImageKind;

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "fwup")]
#[command(about = "Pack, stage and dry-run staged firmware updates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Image kind as named on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Bootloader,
    Application,
    Driver,
}

impl From<KindArg> for ImageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Bootloader => ImageKind::Bootloader,
            KindArg::Application => ImageKind::Application,
            KindArg::Driver => ImageKind::Driver,
        }
    }
}

/// Internal and external flash dump files.
#[derive(Args)]
pub struct DumpArgs {
    /// Internal flash dump (2MB)
    #[arg(long, value_name = "FILE")]
    pub internal: PathBuf,

    /// External flash dump (896KB)
    #[arg(long, value_name = "FILE")]
    pub external: PathBuf,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Build the staging payload and tag record for an image
    Pack {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Destination of the image
        #[arg(short, long, value_enum)]
        kind: KindArg,

        /// Version string, up to 8 bytes
        #[arg(short, long, default_value = "0.0.0")]
        version: String,

        /// Output directory for staging.bin and tag.bin
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Decode and classify a tag record (tag.bin or an internal flash dump)
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Write an image and its tag record into flash dumps, like an OTA download
    Stage {
        #[command(flatten)]
        dumps: DumpArgs,

        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Destination of the image
        #[arg(short, long, value_enum)]
        kind: KindArg,

        /// Version string, up to 8 bytes
        #[arg(short, long, default_value = "0.0.0")]
        version: String,
    },

    /// Run the boot-time update pass against flash dumps
    Apply {
        #[command(flatten)]
        dumps: DumpArgs,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Pack {
            file,
            kind,
            version,
            out,
        } => commands::pack(&file, kind.into(), &version, &out).map(|_| ()),
        Commands::Inspect { file } => commands::inspect(&file).map(|_| ()),
        Commands::Stage {
            dumps,
            file,
            kind,
            version,
        } => commands::stage(&dumps.internal, &dumps.external, &file, kind.into(), &version),
        Commands::Apply { dumps } => {
            commands::apply(&dumps.internal, &dumps.external).and_then(commands::check_report)
        }
    }
}
