use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("unknown browser {0:?}")]
    UnknownBrowser(String),
    #[error("no {0} profile found on this machine")]
    NoProfile(String),
}

/// Confirms that the browser has a profile the engine can read cookies
/// from. Returns the profile directory that was found.
pub fn detect_browser_profile(browser: &str) -> Result<PathBuf, CookieError> {
    let candidates = profile_candidates(browser)?;
    candidates
        .into_iter()
        .find(|path| path.is_dir())
        .ok_or_else(|| CookieError::NoProfile(browser.to_string()))
}

fn profile_candidates(browser: &str) -> Result<Vec<PathBuf>, CookieError> {
    let config = dirs::config_dir();
    let local = dirs::data_local_dir();
    let home = dirs::home_dir();

    let join = |base: &Option<PathBuf>, parts: &[&str]| {
        base.as_ref()
            .map(|base| parts.iter().fold(base.clone(), |path, part| path.join(part)))
    };

    let candidates = match browser {
        "chrome" => vec![
            join(&config, &["google-chrome"]),
            join(&config, &["Google", "Chrome"]),
            join(&local, &["Google", "Chrome", "User Data"]),
        ],
        "chromium" => vec![
            join(&config, &["chromium"]),
            join(&config, &["Chromium"]),
            join(&home, &["snap", "chromium", "common", "chromium"]),
        ],
        "brave" => vec![
            join(&config, &["BraveSoftware", "Brave-Browser"]),
            join(&local, &["BraveSoftware", "Brave-Browser", "User Data"]),
        ],
        "edge" => vec![
            join(&config, &["microsoft-edge"]),
            join(&config, &["Microsoft Edge"]),
            join(&local, &["Microsoft", "Edge", "User Data"]),
        ],
        "firefox" => vec![
            join(&home, &[".mozilla", "firefox"]),
            join(&config, &["Firefox", "Profiles"]),
            join(&config, &["Mozilla", "Firefox", "Profiles"]),
            join(&home, &["snap", "firefox", "common", ".mozilla", "firefox"]),
        ],
        other => return Err(CookieError::UnknownBrowser(other.to_string())),
    };

    Ok(candidates.into_iter().flatten().collect())
}
