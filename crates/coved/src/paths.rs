//! Filesystem locations.
//!
//! The system app dir holds the config file, downloaded binaries, the
//! global bootstrap file, and (on non-Windows) the current-version
//! symlinks.

use std::path::PathBuf;

/// `$COVE_APP_DIR`, else `$XDG_DATA_HOME/cove`, else `~/.local/share/cove`.
pub fn system_app_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("COVE_APP_DIR") {
        return PathBuf::from(dir);
    }
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".local").join("share"))
        .join("cove")
}

fn home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_dir_ends_with_cove_without_override() {
        if std::env::var("COVE_APP_DIR").is_err() {
            assert!(system_app_dir().ends_with("cove"));
        }
    }
}
