//! `slotwatch`: check configured reservation pages once and report new open slots.

mod report;
mod run;
mod scanner;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use chrono_tz::Tz;
use clap::{Args, Parser};
use slotwatch_browser::Paginator;
use slotwatch_browser::chromium::{ChromiumBrowser, LaunchOptions};
use slotwatch_core::load_targets;
use slotwatch_notify::{
    FanOut, LogNotifier, Notifier, SmtpConfig, SmtpNotifier, TlsMode, WebhookNotifier,
};
use slotwatch_store::{JsonFileStore, MemoryStore};
use tracing::{Level, error, info, warn};

use crate::run::{Pacing, RunReport, deliver, run_targets};
use crate::scanner::BrowserScanner;

/// Watch municipal facility reservation pages for open slots.
#[derive(Parser, Debug)]
#[command(name = "slotwatch", version, about)]
struct Cli {
    /// Target list (JSON array, or an object with a `targets` array).
    #[arg(long, env = "SLOTWATCH_TARGETS", default_value = "data/targets.json")]
    targets: PathBuf,

    /// Notified-slot cache.
    #[arg(long, env = "SLOTWATCH_CACHE", default_value = "data/notified.json")]
    cache: PathBuf,

    /// Facility time zone; decides "today" and the report timestamp.
    #[arg(long, env = "SLOTWATCH_TZ", default_value = "Asia/Tokyo")]
    timezone: String,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,

    /// Chrome/Chromium binary.
    #[arg(long, env = "CHROME_BIN")]
    chrome: Option<PathBuf>,

    /// Result pages read per target unless the target sets `maxPages`.
    #[arg(long, default_value_t = 2)]
    max_pages: usize,

    /// Lower bound of the pause between targets, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pace_min_ms: u64,

    /// Upper bound of the pause between targets, in milliseconds.
    #[arg(long, default_value_t = 4000)]
    pace_max_ms: u64,

    /// Page load timeout in seconds.
    #[arg(long, default_value_t = 60)]
    navigation_timeout: u64,

    /// Log the report instead of sending it and leave the cache untouched.
    #[arg(long)]
    dry_run: bool,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    mail: MailArgs,

    /// JSON webhook receiving reports.
    #[arg(long, env = "SLOTWATCH_WEBHOOK_URL")]
    webhook: Option<String>,
}

#[derive(Args, Debug)]
struct MailArgs {
    #[arg(long = "mail-host", env = "MAIL_HOST")]
    host: Option<String>,

    #[arg(long = "mail-port", env = "MAIL_PORT", default_value_t = 465)]
    port: u16,

    #[arg(long = "mail-user", env = "MAIL_USER")]
    user: Option<String>,

    #[arg(long = "mail-pass", env = "MAIL_PASS", hide_env_values = true)]
    pass: Option<String>,

    /// Sender address; defaults to the mail user.
    #[arg(long = "mail-from", env = "MAIL_FROM")]
    from: Option<String>,

    /// Comma-separated recipients.
    #[arg(long = "mail-to", env = "MAIL_TO")]
    to: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();
    info!("slotwatch v{}", env!("CARGO_PKG_VERSION"));

    let notifier = match build_notifier(&cli) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %format!("{e:#}"), "notification setup failed");
            return ExitCode::FAILURE;
        }
    };

    match check(&cli, notifier.as_ref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal");
            if let Err(ne) = notifier.send(report::ERROR_SUBJECT, &format!("{e:?}")).await {
                warn!(error = %ne, "could not report the failure");
            }
            ExitCode::FAILURE
        }
    }
}

fn build_notifier(cli: &Cli) -> Result<Box<dyn Notifier>> {
    if cli.dry_run {
        return Ok(Box::new(LogNotifier));
    }

    let mut fan = FanOut::new();
    let mail = &cli.mail;
    match (&mail.host, &mail.user, &mail.to) {
        (Some(host), Some(user), Some(to)) => {
            let smtp = SmtpNotifier::new(SmtpConfig {
                host: host.clone(),
                port: mail.port,
                tls: TlsMode::for_port(mail.port),
                username: user.clone(),
                password: mail.pass.clone().unwrap_or_default(),
                from: mail.from.clone(),
                to: SmtpConfig::recipients(to),
            })
            .context("invalid mail settings")?;
            fan.push(Box::new(smtp));
        }
        (None, None, None) => {}
        _ => warn!("MAIL_HOST, MAIL_USER and MAIL_TO must all be set; mail disabled"),
    }
    if let Some(url) = &cli.webhook {
        fan.push(Box::new(WebhookNotifier::new(url.clone())?));
    }

    if fan.is_empty() {
        warn!("no notification transport configured; reports go to the log");
        return Ok(Box::new(LogNotifier));
    }
    info!(transports = fan.len(), "notifications enabled");
    Ok(Box::new(fan))
}

async fn check(cli: &Cli, notifier: &dyn Notifier) -> Result<()> {
    let tz: Tz = cli
        .timezone
        .parse()
        .map_err(|e| anyhow!("unknown time zone {:?}: {e}", cli.timezone))?;
    let targets = load_targets(&cli.targets)?;
    let mut cache = JsonFileStore::load(&cli.cache)?;

    let browser = ChromiumBrowser::launch(LaunchOptions {
        headless: !cli.headed,
        executable: cli.chrome.clone(),
        timezone: tz.name().to_string(),
        ..LaunchOptions::default()
    })
    .await
    .context("launching browser")?;

    let started = Utc::now().with_timezone(&tz);
    let today = started.date_naive();
    let pacing = Pacing::new(
        Duration::from_millis(cli.pace_min_ms),
        Duration::from_millis(cli.pace_max_ms),
    );

    let outcomes = match browser.new_page().await {
        Ok(page) => {
            let scanner = BrowserScanner::new(page)
                .with_paginator(Paginator {
                    max_pages: cli.max_pages.max(1),
                    ..Paginator::default()
                })
                .with_navigation_timeout(Duration::from_secs(cli.navigation_timeout));
            let result = if cli.dry_run {
                let mut scratch = MemoryStore::with_keys(cache.keys().iter().cloned());
                run_targets(&targets, &scanner, &mut scratch, &pacing, today).await
            } else {
                run_targets(&targets, &scanner, &mut cache, &pacing, today).await
            };
            result.map_err(anyhow::Error::from)
        }
        Err(e) => Err(anyhow::Error::from(e).context("opening a browser tab")),
    };
    browser.close().await;

    let report = RunReport {
        started,
        outcomes: outcomes?,
    };
    deliver(&report, notifier).await;
    info!(
        targets = report.outcomes.len(),
        hits = report.hits(),
        errors = report.errors(),
        "run finished"
    );
    Ok(())
}
