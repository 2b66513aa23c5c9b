//! Binary update polling.
//!
//! Each tick refreshes the global bootstrap file, then asks the download
//! seam for a newer build of each application. A newer build lands in the
//! config directory and (except on Windows) the per-application symlink
//! in the system app dir is flipped to it. Failures are logged and never
//! disarm the loop.

use std::path::Path;

use cove_core::crypto::content_hash;

use crate::version::{
    self, find_latest_local_version, APPLICATION_NAME, VAULT_MANAGER_NAME, VAULT_NAME,
};

/// Name of the globally shared bootstrap contact file.
pub const BOOTSTRAP_GLOBAL: &str = "bootstrap-global.dat";

/// The HTTP download/verify seam.
///
/// `current` is either a plain filename (the bootstrap file) or a name in
/// the `{app}_{platform}_{version}` grammar. Returns the name of the newer
/// file placed in `target_dir`, or `None` when there is nothing newer (or
/// the attempt failed — failures are logged by the implementation).
#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    async fn update_and_verify(&self, current: &str, target_dir: &Path) -> Option<String>;
}

/// One update pass. Called once at bootstrap and then on every timer tick.
pub async fn check_for_updates(
    downloader: &dyn Downloader,
    config_dir: &Path,
    system_app_dir: &Path,
) {
    if downloader
        .update_and_verify(BOOTSTRAP_GLOBAL, config_dir)
        .await
        .is_none()
    {
        tracing::debug!("no newer {BOOTSTRAP_GLOBAL}");
    }

    for application in [APPLICATION_NAME, VAULT_NAME, VAULT_MANAGER_NAME] {
        let latest_local = find_latest_local_version(config_dir, application);
        tracing::debug!(application, latest_local, "checking for newer build");

        match downloader.update_and_verify(&latest_local, config_dir).await {
            Some(updated_file) => {
                tracing::info!(application, updated_file, "downloaded newer build");
                #[cfg(not(windows))]
                flip_symlink(config_dir, system_app_dir, application, &updated_file);
                #[cfg(windows)]
                let _ = system_app_dir;
            }
            None => tracing::debug!(application, "no newer build found"),
        }
    }
}

/// Point `<system_app_dir>/<application>` at the freshly downloaded file.
#[cfg(not(windows))]
fn flip_symlink(config_dir: &Path, system_app_dir: &Path, application: &str, updated_file: &str) {
    let link = system_app_dir.join(application);
    let target = config_dir.join(updated_file);

    if let Err(e) = std::fs::remove_file(&link) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(link = %link.display(), error = %e, "failed to remove symlink");
        }
    }
    match std::os::unix::fs::symlink(&target, &link) {
        Ok(()) => tracing::info!(link = %link.display(), target = %target.display(), "symlink updated"),
        Err(e) => tracing::warn!(link = %link.display(), error = %e, "failed to create symlink"),
    }
}

// ── HTTP implementation ───────────────────────────────────────────────────────

/// Fetches from `{base_url}/{file}`. For versioned names it first asks
/// `{base_url}/{app}_{platform}.latest` which release is current, then
/// downloads it. Downloads are verified against `{file}.b3` (hex BLAKE3)
/// and placed atomically.
pub struct HttpDownloader {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, name: &str) -> Option<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, name);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url, error = %e, "download request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "download refused");
            return None;
        }
        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                tracing::warn!(url, error = %e, "download body failed");
                None
            }
        }
    }

    async fn fetch_verified(&self, name: &str, target_dir: &Path) -> Option<String> {
        let body = self.fetch(name).await?;

        let digest_file = self.fetch(&format!("{name}.b3")).await?;
        let expected = String::from_utf8(digest_file).ok()?;
        if hex::encode(content_hash(&body)) != expected.trim() {
            tracing::warn!(name, "downloaded file failed hash verification");
            return None;
        }

        let target = target_dir.join(name);
        let tmp = target.with_extension("part");
        if std::fs::write(&tmp, &body).is_err() || std::fs::rename(&tmp, &target).is_err() {
            tracing::warn!(name, "failed to place downloaded file");
            return None;
        }
        Some(name.to_string())
    }
}

#[async_trait::async_trait]
impl Downloader for HttpDownloader {
    async fn update_and_verify(&self, current: &str, target_dir: &Path) -> Option<String> {
        match version::tokenise_file_name(current) {
            Some((application, platform, current_version)) => {
                let pointer = format!("{application}_{platform}.latest");
                let latest = String::from_utf8(self.fetch(&pointer).await?).ok()?;
                let latest = latest.trim();
                let (_, _, newest_version) = version::tokenise_file_name(latest)?;
                if newest_version <= current_version {
                    return None;
                }
                self.fetch_verified(latest, target_dir).await
            }
            None => {
                // Plain file: download and replace when the bytes differ.
                let body = self.fetch(current).await?;
                let target = target_dir.join(current);
                if let Ok(existing) = std::fs::read(&target) {
                    if content_hash(&existing) == content_hash(&body) {
                        return None;
                    }
                }
                let tmp = target.with_extension("part");
                if std::fs::write(&tmp, &body).is_err() || std::fs::rename(&tmp, &target).is_err()
                {
                    tracing::warn!(current, "failed to place downloaded file");
                    return None;
                }
                Some(current.to_string())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Downloader that serves a fixed set of "newer" files.
    struct FixedDownloader {
        serves: Vec<(String, Vec<u8>)>,
        requests: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Downloader for FixedDownloader {
        async fn update_and_verify(&self, current: &str, target_dir: &Path) -> Option<String> {
            self.requests.lock().unwrap().push(current.to_string());
            for (name, body) in &self.serves {
                let newer = match (
                    version::tokenise_file_name(current),
                    version::tokenise_file_name(name),
                ) {
                    (Some((app_a, _, v_a)), Some((app_b, _, v_b))) => app_a == app_b && v_b > v_a,
                    _ => name == current,
                };
                if newer {
                    std::fs::write(target_dir.join(name), body).unwrap();
                    return Some(name.clone());
                }
            }
            None
        }
    }

    #[tokio::test]
    async fn update_pass_asks_for_bootstrap_and_every_application() {
        let config_dir = tempfile::tempdir().unwrap();
        let system_dir = tempfile::tempdir().unwrap();
        let downloader = FixedDownloader {
            serves: Vec::new(),
            requests: Mutex::new(Vec::new()),
        };

        check_for_updates(&downloader, config_dir.path(), system_dir.path()).await;

        let requests = downloader.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0], BOOTSTRAP_GLOBAL);
        // With an empty config dir, every application asks from the floor.
        for (request, application) in requests[1..]
            .iter()
            .zip([APPLICATION_NAME, VAULT_NAME, VAULT_MANAGER_NAME])
        {
            assert!(request.starts_with(application));
            assert!(request.ends_with(version::SYNTHETIC_FLOOR_VERSION));
        }
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn newer_build_flips_the_symlink() {
        let config_dir = tempfile::tempdir().unwrap();
        let system_dir = tempfile::tempdir().unwrap();

        let newer = version::generate_file_name(VAULT_NAME, version::this_platform(), "0.01.00");
        let downloader = FixedDownloader {
            serves: vec![(newer.clone(), b"binary".to_vec())],
            requests: Mutex::new(Vec::new()),
        };

        check_for_updates(&downloader, config_dir.path(), system_dir.path()).await;

        let link = system_dir.path().join(VAULT_NAME);
        let target = std::fs::read_link(&link).unwrap();
        assert_eq!(target, config_dir.path().join(&newer));

        // A second pass with nothing newer leaves the link alone.
        check_for_updates(&downloader, config_dir.path(), system_dir.path()).await;
        assert_eq!(std::fs::read_link(&link).unwrap(), target);
    }
}
