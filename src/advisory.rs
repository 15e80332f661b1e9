use std::{fmt::Display, io::ErrorKind, path::Path};

use tracing::warn;

/// Runs the bookkeeping for a side effect whose failure must never abort the
/// enclosing request: the failure is logged and the caller gets `None`.
pub fn advisory<T, E: Display>(operation: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!("{operation} failed, continuing: {error}");
            None
        }
    }
}

/// Advisory removal of a file. Returns whether something was deleted; a
/// missing file is not a failure.
pub async fn remove_file(operation: &str, path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(error) if error.kind() == ErrorKind::NotFound => false,
        Err(error) => {
            advisory::<(), _>(operation, Err(format!("{}: {error}", path.display())));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_success_through() {
        assert_eq!(advisory::<_, String>("noop", Ok(7)), Some(7));
    }

    #[test]
    fn swallows_failures() {
        assert_eq!(advisory::<u8, _>("explode", Err("boom")), None);
    }

    #[tokio::test]
    async fn remove_file_reports_what_happened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.mp4");
        std::fs::write(&path, b"x").unwrap();

        assert!(remove_file("pre-clean", &path).await);
        assert!(!path.exists());
        assert!(!remove_file("pre-clean", &path).await);
    }
}
