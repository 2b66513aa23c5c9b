//! Binary filename grammar: `{application}_{platform}_{version}`.
//!
//! Versions are `M.mm.pp` with two-digit minor and patch. The synthetic
//! floor "0.00.00" stands in as the current version when no local copy
//! exists, so any real release compares newer.

use std::path::Path;

pub const APPLICATION_NAME: &str = "cove";
pub const VAULT_NAME: &str = "cove-vault";
pub const VAULT_MANAGER_NAME: &str = "cove-manager";

/// Version string for a host with no local copy at all.
pub const SYNTHETIC_FLOOR_VERSION: &str = "0.00.00";

pub fn this_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "win"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

pub fn generate_file_name(application: &str, platform: &str, version: &str) -> String {
    format!("{application}_{platform}_{version}")
}

/// Parse `app_platform_M.mm.pp` into its parts plus a comparable numeric
/// version. Returns `None` for names outside the grammar.
pub fn tokenise_file_name(name: &str) -> Option<(String, String, u32)> {
    let mut parts = name.rsplitn(3, '_');
    let version = parts.next()?;
    let platform = parts.next()?;
    let application = parts.next()?;
    if application.is_empty() || platform.is_empty() {
        return None;
    }
    Some((
        application.to_string(),
        platform.to_string(),
        parse_version(version)?,
    ))
}

fn parse_version(version: &str) -> Option<u32> {
    let mut fields = version.split('.');
    let major: u32 = fields.next()?.parse().ok()?;
    let minor = fields.next()?;
    let patch = fields.next()?;
    if fields.next().is_some() || minor.len() != 2 || patch.len() != 2 {
        return None;
    }
    let minor: u32 = minor.parse().ok()?;
    let patch: u32 = patch.parse().ok()?;
    Some(major * 10_000 + minor * 100 + patch)
}

/// Scan `dir` for the newest file matching `application` on this
/// platform. Falls back to the synthetic floor name when nothing matches.
pub fn find_latest_local_version(dir: &Path, application: &str) -> String {
    let platform = this_platform();
    let mut latest: Option<(u32, String)> = None;

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some((app, plat, version)) = tokenise_file_name(name) else {
                continue;
            };
            if app != application || plat != platform {
                continue;
            }
            if latest.as_ref().map(|(v, _)| version > *v).unwrap_or(true) {
                latest = Some((version, name.to_string()));
            }
        }
    }

    match latest {
        Some((_, name)) => name,
        None => {
            tracing::debug!(application, dir = %dir.display(), "no local version found");
            generate_file_name(application, platform, SYNTHETIC_FLOOR_VERSION)
        }
    }
}
