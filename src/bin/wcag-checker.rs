//! WCAG 2.4.6 checker CLI.
//!
//! Loads one page in a headless browser, evaluates every heading and form
//! label for descriptiveness with a language model, and prints a compliance
//! report.
//!
//! Usage:
//!   $ OPENAI_API_KEY=... wcag-checker https://example.com
//!   $ wcag-checker https://example.com --chrome-bin /usr/bin/chromium -v

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use wcag_checker_rs::config::{CheckerConfig, LoggerCallback, Verbosity};
use wcag_checker_rs::pipeline::run_check;

#[derive(Parser)]
#[command(
    name = "wcag-checker",
    author,
    version,
    about = "WCAG 2.4.6 headings-and-labels descriptiveness checker"
)]
struct Cli {
    /// Page URL to check (http or https).
    url: String,

    /// Model used for descriptiveness judgments.
    #[arg(long)]
    model: Option<String>,

    /// Path to the Chrome/Chromium executable to launch.
    #[arg(long)]
    chrome_bin: Option<PathBuf>,

    /// Attach to an already-running browser over CDP instead of launching.
    #[arg(long, conflicts_with = "chrome_bin")]
    cdp_url: Option<String>,

    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,

    /// Upper bound in milliseconds on loading the page.
    #[arg(long)]
    load_timeout_ms: Option<u64>,

    /// Increase log verbosity (pass twice for DEBUG).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let config = build_config(&cli).context("failed to build checker configuration")?;

    info!("Checking {} with model {}", cli.url, config.model_name);

    let report = run_check(config, &cli.url)
        .await
        .with_context(|| format!("check of {} failed", cli.url))?;

    // A completed report exits 0 whether or not the page is compliant; only
    // fatal load or extraction failures produce a non-zero exit.
    print!("{}", report.render());
    Ok(())
}

fn build_config(cli: &Cli) -> Result<CheckerConfig> {
    let mut config = CheckerConfig::from_env().context("invalid environment configuration")?;

    if let Some(model) = &cli.model {
        config.model_name = model.clone();
    }
    if let Some(chrome_bin) = &cli.chrome_bin {
        config.chrome_executable = Some(chrome_bin.clone());
    }
    if let Some(cdp_url) = &cli.cdp_url {
        config.cdp_url = Some(cdp_url.clone());
    }
    if let Some(timeout) = cli.load_timeout_ms {
        config.load_timeout_ms = timeout;
    }
    if cli.show_browser {
        config.headless = false;
    }
    if cli.verbose > 0 {
        config.verbose = verbosity_from_count(cli.verbose);
    }
    config.logger = Some(make_logger_callback());

    Ok(config)
}

fn make_logger_callback() -> LoggerCallback {
    Arc::new(|line: &str| {
        log::info!("{line}");
    })
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        1 => Verbosity::Detailed,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
