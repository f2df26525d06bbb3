//! Discovery and spawn protocol (§4.6).
//!
//! Locates a running hub by walking up from a starting directory for a
//! workspace marker, then reads the connection descriptor inside it. Spawn
//! is a synchronous, one-time startup action (not a steady-state operation),
//! so this module uses blocking `std::process`/`std::thread::sleep` rather
//! than tokio, the same way the teacher keeps its own one-shot discovery
//! (`forwarder::discovery::expand_target`) free of async machinery.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Duration;

/// Directory name marking the root of a workspace (walked up to from any
/// subdirectory, the same way `.git` anchors a repository).
pub const WORKSPACE_DIR_NAME: &str = ".agent-hub";
pub const DESCRIPTOR_FILE_NAME: &str = "server.json";
pub const LOCK_FILE_NAME: &str = "hub.lock";
/// Daemon exit code signalling "another daemon already holds the store lock".
pub const EXIT_CODE_LOCK_CONFLICT: i32 = 10;

const SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(20);
const MAX_SPAWN_ATTEMPTS: u32 = 20;

/// The connection descriptor written by a running hub (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub instance_id: String,
    pub db_id: String,
    pub host: String,
    pub port: u16,
    pub auth_token: String,
    pub pid: u32,
    pub started_at: String,
    pub protocol_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no workspace marker found above {0}")]
    WorkspaceNotFound(PathBuf),
    #[error("protocol version mismatch: hub={hub}, client expects={expected}")]
    ProtocolMismatch { hub: u32, expected: u32 },
    #[error("schema version {0} is below 1")]
    SchemaTooOld(i64),
    #[error("daemon exited during startup with status {0:?}")]
    SpawnFailed(Option<i32>),
    #[error("gave up spawning a hub after {0} attempts")]
    SpawnAttemptsExhausted(u32),
}

/// Walk up from `start` looking for a `WORKSPACE_DIR_NAME` directory.
pub fn find_workspace_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(WORKSPACE_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

pub fn descriptor_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(DESCRIPTOR_FILE_NAME)
}

pub fn lock_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(LOCK_FILE_NAME)
}

pub fn read_descriptor(workspace_dir: &Path) -> Result<ServerDescriptor, DiscoveryError> {
    let text = std::fs::read_to_string(descriptor_path(workspace_dir))?;
    Ok(serde_json::from_str(&text)?)
}

/// Writes the descriptor with `0600` permissions (§6: it carries the
/// bearer token).
pub fn write_descriptor(
    workspace_dir: &Path,
    descriptor: &ServerDescriptor,
) -> Result<(), DiscoveryError> {
    std::fs::create_dir_all(workspace_dir)?;
    let text = serde_json::to_string_pretty(descriptor)?;
    let path = descriptor_path(workspace_dir);
    std::fs::write(&path, text)?;
    set_owner_only_permissions(&path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Rejects protocol-version mismatches and schema versions below 1 (§4.6).
pub fn validate_health(descriptor: &ServerDescriptor) -> Result<(), DiscoveryError> {
    if descriptor.protocol_version != hub_protocol::PROTOCOL_VERSION {
        return Err(DiscoveryError::ProtocolMismatch {
            hub: descriptor.protocol_version,
            expected: hub_protocol::PROTOCOL_VERSION,
        });
    }
    if let Some(schema_version) = descriptor.schema_version {
        if schema_version < 1 {
            return Err(DiscoveryError::SchemaTooOld(schema_version));
        }
    }
    Ok(())
}

/// Locates a healthy hub under `start_dir`'s workspace, spawning one via
/// `spawn` if the descriptor is missing or unhealthy.
///
/// Race-safe: if two processes spawn concurrently, the loser's daemon exits
/// with [`EXIT_CODE_LOCK_CONFLICT`] without ever opening the store; this
/// function detects that exit code, waits a short jittered backoff, and
/// re-enters discovery rather than treating it as a hard failure. A process
/// only claims "I started the hub" when the descriptor it re-reads names its
/// own child's pid, so two racing spawners never both believe they won.
pub fn ensure_hub_running(
    start_dir: &Path,
    spawn: impl Fn(&Path) -> std::io::Result<Child>,
) -> Result<ServerDescriptor, DiscoveryError> {
    for attempt in 0..MAX_SPAWN_ATTEMPTS {
        let workspace_dir = find_workspace_dir(start_dir)
            .ok_or_else(|| DiscoveryError::WorkspaceNotFound(start_dir.to_path_buf()))?;

        if let Ok(descriptor) = read_descriptor(&workspace_dir) {
            if validate_health(&descriptor).is_ok() {
                return Ok(descriptor);
            }
        }

        let mut child = spawn(&workspace_dir)?;
        let my_pid = child.id();

        loop {
            if let Some(status) = child.try_wait()? {
                if status.code() == Some(EXIT_CODE_LOCK_CONFLICT) {
                    std::thread::sleep(spawn_retry_jitter());
                    break; // outer loop re-enters discovery
                }
                return Err(DiscoveryError::SpawnFailed(status.code()));
            }
            if let Ok(descriptor) = read_descriptor(&workspace_dir) {
                if descriptor.pid == my_pid && validate_health(&descriptor).is_ok() {
                    return Ok(descriptor);
                }
            }
            std::thread::sleep(SPAWN_POLL_INTERVAL);
        }
        let _ = attempt;
    }
    Err(DiscoveryError::SpawnAttemptsExhausted(MAX_SPAWN_ATTEMPTS))
}

/// 50-100 ms of jitter (§4.6).
fn spawn_retry_jitter() -> Duration {
    Duration::from_millis(50 + rand::random::<u64>() % 50)
}
