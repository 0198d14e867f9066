//! `envelope`: envelope encryption of files with a cloud KMS.
//!
//! Startup sequence:
//! 1. Parse the [`Command`] from the first argument.
//! 2. Load and validate [`Settings`] from `ENVELOPE_*` environment variables.
//! 3. Initialise tracing.
//! 4. Build the KMS client for the configured provider.
//! 5. Run the command.
//!
//! A missing or unknown command exits with `EX_USAGE`. Otherwise the exit
//! status is taken from the first [`EnvelopeError`] in the error chain, or 1
//! for anything else.

mod commands;
mod config;
mod kms;
mod output;
mod telemetry;

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;

use common::EnvelopeError;
use envelope::{EngineConfig, EnvelopeEngine};

use commands::{Command, UnknownCommand};
use config::Settings;

const EX_USAGE: u8 = 64;

const USAGE: &str = "usage: envelope <encrypt|decrypt|reencrypt>

Configuration is read from ENVELOPE_* environment variables, e.g.
  ENVELOPE_KMS_PROVIDER=gcp|aws   ENVELOPE_KEY_NAME=...
  ENVELOPE_SOURCE_PATH=...        ENVELOPE_TARGET_PATH=...
  ENVELOPE_RETAIN_SOURCE=true     ENVELOPE_SINGLE_LINE=true
  ENVELOPE_TO_STDOUT=true         ENVELOPE_VALIDATE_ONLY=true";

fn main() -> ExitCode {
    let Some(arg) = std::env::args().nth(1) else {
        eprintln!("{USAGE}");
        return ExitCode::from(EX_USAGE);
    };
    if matches!(arg.as_str(), "-h" | "--help" | "help") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match run(&arg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Telemetry may not be up; write to stderr directly.
            eprintln!("ERROR: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(arg: &str) -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Command
    // -----------------------------------------------------------------------
    let command: Command = arg.parse()?;

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let cfg = Settings::from_env().context("configuration invalid")?;

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level, cfg.log_json)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        %command,
        provider = %cfg.kms_provider,
        "envelope starting"
    );

    // -----------------------------------------------------------------------
    // 4. KMS client
    // -----------------------------------------------------------------------
    let client = kms::build_client(&cfg)?;
    let engine = EnvelopeEngine::new(EngineConfig::from(cfg.kms_provider), client);

    // -----------------------------------------------------------------------
    // 5. Command
    // -----------------------------------------------------------------------
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::run(command, &cfg, &engine, &mut out)
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if err.chain().any(|cause| cause.is::<UnknownCommand>()) {
        return EX_USAGE;
    }
    err.chain()
        .find_map(|cause| cause.downcast_ref::<EnvelopeError>())
        .map_or(1, EnvelopeError::exit_code)
}
