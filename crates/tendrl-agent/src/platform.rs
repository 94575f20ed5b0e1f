//! Host provisioning for the agent's state directory and socket.
//!
//! The agent shares its socket with co-resident applications through group
//! membership: the state directory is owned by the `tendrl` group and closed
//! to everyone else. Provisioning runs once at startup and any failure is
//! fatal.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

/// Local group granted access to the agent's socket directory.
pub const AGENT_GROUP: &str = "tendrl";

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create group '{0}'")]
    CreateGroup(String),
    #[error("failed to set group ownership for '{0}'")]
    GroupOwnership(String),
    #[error("failed to set permissions for '{path}': {source}")]
    Permissions {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Creates the state directory with restricted, group-shared permissions.
#[cfg(unix)]
pub fn ensure_dirs(dir: &Path) -> Result<(), ProvisionError> {
    use std::fs;
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    ensure_group(AGENT_GROUP)?;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o750)
        .create(dir)
        .map_err(|source| ProvisionError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

    let chown = Command::new("chown")
        .arg(format!(":{AGENT_GROUP}"))
        .arg(dir)
        .status()
        .map_err(|source| ProvisionError::Spawn {
            command: "chown",
            source,
        })?;
    if !chown.success() {
        return Err(ProvisionError::GroupOwnership(dir.display().to_string()));
    }

    fs::set_permissions(dir, fs::Permissions::from_mode(0o770)).map_err(|source| {
        ProvisionError::Permissions {
            path: dir.display().to_string(),
            source,
        }
    })?;

    info!("directory setup complete: {}", dir.display());
    Ok(())
}

/// Creates the agent group if it does not already exist.
#[cfg(unix)]
fn ensure_group(name: &str) -> Result<(), ProvisionError> {
    let exists = Command::new("getent")
        .args(["group", name])
        .status()
        .map_err(|source| ProvisionError::Spawn {
            command: "getent",
            source,
        })?;
    if exists.success() {
        debug!("group '{name}' already exists");
        return Ok(());
    }

    let added = Command::new("groupadd")
        .arg(name)
        .status()
        .map_err(|source| ProvisionError::Spawn {
            command: "groupadd",
            source,
        })?;
    if !added.success() {
        return Err(ProvisionError::CreateGroup(name.to_string()));
    }
    info!("group '{name}' created");
    Ok(())
}

/// Creates the state directory and applies a restrictive DACL: inherited
/// access is stripped, the agent group gets modify, Administrators keep full
/// control.
#[cfg(windows)]
pub fn ensure_dirs(dir: &Path) -> Result<(), ProvisionError> {
    use std::fs;

    ensure_group(AGENT_GROUP)?;

    fs::create_dir_all(dir).map_err(|source| ProvisionError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let acl = Command::new("icacls")
        .arg(dir)
        .args([
            "/inheritance:r",
            &format!("/grant:r {AGENT_GROUP}:(OI)(CI)M"),
            "/grant:r Administrators:(OI)(CI)F",
        ])
        .status()
        .map_err(|source| ProvisionError::Spawn {
            command: "icacls",
            source,
        })?;
    if !acl.success() {
        return Err(ProvisionError::GroupOwnership(dir.display().to_string()));
    }

    info!("directory setup complete: {}", dir.display());
    Ok(())
}

#[cfg(windows)]
fn ensure_group(name: &str) -> Result<(), ProvisionError> {
    let exists = Command::new("net")
        .args(["localgroup", name])
        .status()
        .map_err(|source| ProvisionError::Spawn {
            command: "net",
            source,
        })?;
    if exists.success() {
        debug!("group '{name}' already exists");
        return Ok(());
    }

    let added = Command::new("net")
        .args(["localgroup", name, "/add"])
        .status()
        .map_err(|source| ProvisionError::Spawn {
            command: "net",
            source,
        })?;
    if !added.success() {
        return Err(ProvisionError::CreateGroup(name.to_string()));
    }
    info!("group '{name}' created");
    Ok(())
}

/// Windows AF_UNIX support probe.
#[cfg(windows)]
pub mod afunix {
    /// Structurally verifies AF_UNIX support by binding and immediately
    /// closing a throwaway socket in the temp directory. The probe file is
    /// removed even when the bind fails.
    #[must_use]
    pub fn is_supported() -> bool {
        let probe_path = std::env::temp_dir().join(format!(
            "tendrl-afunix-probe-{}.sock",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&probe_path);
        let supported = match uds_windows::UnixListener::bind(&probe_path) {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(_) => false,
        };
        let _ = std::fs::remove_file(&probe_path);
        supported
    }
}
