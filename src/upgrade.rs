use std::{fmt::Display, time::Duration};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{advisory::advisory, config::Settings, engine::MediaEngine};

const LATEST_RELEASE_URL: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";
const RELEASE_CHECK_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpgradeOutcome {
    Skipped,
    AlreadyCurrent,
    NoCommand,
    CommandFailed,
    Upgraded,
}

/// Best-effort upgrade of the extraction engine before serving. Nothing in
/// here can stop the server from starting.
pub async fn upgrade_engine(engine: &dyn MediaEngine, settings: &Settings) {
    let outcome = run_upgrade(engine, settings, latest_release()).await;
    debug!("Engine upgrade finished: {outcome:?}");
}

async fn run_upgrade<E: Display>(
    engine: &dyn MediaEngine,
    settings: &Settings,
    latest_release: impl Future<Output = Result<String, E>>,
) -> UpgradeOutcome {
    if settings.skip_engine_upgrade {
        info!("Engine upgrade skipped by configuration");
        return UpgradeOutcome::Skipped;
    }

    let current = advisory("reading yt-dlp version", engine.version().await);
    if let Some(version) = &current {
        info!("Current yt-dlp version: {version}");
    }

    let latest = advisory("checking latest yt-dlp release", latest_release.await);
    if let (Some(current), Some(latest)) = (&current, &latest)
        && is_current(current, latest)
    {
        info!("yt-dlp is already up to date");
        return UpgradeOutcome::AlreadyCurrent;
    }

    let Some((program, args)) = settings.upgrade_command.split_first() else {
        info!("No engine upgrade command configured");
        return UpgradeOutcome::NoCommand;
    };

    info!("Upgrading yt-dlp with `{}`", settings.upgrade_command.join(" "));
    let status = advisory(
        "yt-dlp upgrade",
        Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|error| error.to_string())
            .and_then(|status| {
                if status.success() {
                    Ok(status)
                } else {
                    Err(format!("upgrade command exited with {status}"))
                }
            }),
    );
    if status.is_none() {
        info!("Trying to continue with current version...");
        return UpgradeOutcome::CommandFailed;
    }

    let updated = advisory("reading yt-dlp version", engine.version().await);
    match (current, updated) {
        (Some(before), Some(after)) if before != after => {
            info!("Updated yt-dlp from {before} to {after}");
        }
        (Some(_), Some(_)) => info!("yt-dlp is already up to date"),
        (None, Some(after)) => info!("yt-dlp version after upgrade: {after}"),
        _ => {}
    }
    UpgradeOutcome::Upgraded
}

async fn latest_release() -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(RELEASE_CHECK_TIMEOUT_SECONDS))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let release = client
        .get(LATEST_RELEASE_URL)
        .send()
        .await?
        .error_for_status()?
        .json::<Release>()
        .await?;

    Ok(release.tag_name)
}

fn is_current(installed: &str, latest_tag: &str) -> bool {
    installed.trim() == latest_tag.trim().trim_start_matches('v')
}
