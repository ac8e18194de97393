//! `otp-verify`: check one PAP passcode against otpd from the command line.
//!
//! # What happens at startup
//!
//! 1. CLI arguments are parsed with `clap` into a [`Cli`] struct.
//! 2. The TOML configuration is loaded; a missing file means defaults.
//! 3. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
//!    configured level applies.  Logs go to stderr so stdout carries only
//!    the verdict.
//! 4. The passcode is read from the first line of stdin.  It is never taken
//!    from argv, where other local users could see it.
//! 5. One verification runs and the verdict is printed.
//!
//! Exit status is 0 for `accept`, 2 for `fail` and 1 for every other
//! verdict.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use otp_client::application::verify_passcode::{CredentialMaterial, PasscodeVerifier};
use otp_client::infrastructure::network::{
    ConnectionPool, Endpoint, UnixConnector, VerificationClient,
};
use otp_client::infrastructure::storage::config::load_config;
use otp_core::Verdict;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Verify a one-time passcode with otpd.
///
/// The passcode is read from stdin.
#[derive(Debug, Parser)]
#[command(name = "otp-verify", about = "Verify a one-time passcode with otpd", version)]
struct Cli {
    /// Configuration file.
    #[arg(
        long,
        default_value = "/etc/otp-client/config.toml",
        env = "OTP_CONFIG"
    )]
    config: PathBuf,

    /// otpd socket path, overriding `otpd_rp` from the configuration.
    #[arg(long)]
    endpoint: Option<PathBuf>,

    /// User whose passcode is being checked.
    #[arg(long)]
    username: String,

    /// Challenge previously issued to the user, for asynchronous mode.
    #[arg(long, default_value = "")]
    challenge: String,
}

fn exit_status(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Accept => 0,
        Verdict::Fail => 2,
        _ => 1,
    }
}

/// Reads one line and strips the line terminator.
fn read_passcode(input: &mut impl BufRead) -> anyhow::Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    input
        .read_line(&mut line)
        .context("failed to read passcode from stdin")?;
    let len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(len);
    Ok(line)
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .init();

    let endpoint = cli
        .endpoint
        .map(Endpoint::new)
        .unwrap_or_else(|| config.otp.endpoint());
    debug!("using otpd at {endpoint}");

    let client = VerificationClient::new(
        Arc::new(ConnectionPool::new()),
        UnixConnector::with_io_timeout(config.otp.io_timeout()),
        endpoint,
    )
    .with_reconnect_delay(config.otp.reconnect_delay());
    let verifier = PasscodeVerifier::new(client, config.otp.policy());

    let passcode = read_passcode(&mut io::stdin().lock())?;
    let outcome = verifier.verify(
        &cli.username,
        &cli.challenge,
        CredentialMaterial::Pap {
            passcode: &passcode,
        },
    );

    println!("{}", outcome.verdict);
    Ok(ExitCode::from(exit_status(outcome.verdict)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
