//! Reconnecting WebSocket client engine and workspace discovery/spawn
//! protocol for agent-hub (§4.5-4.6).

pub mod discovery;
pub mod session;

pub use discovery::{
    descriptor_path, ensure_hub_running, find_workspace_dir, lock_path, read_descriptor,
    validate_health, write_descriptor, DiscoveryError, ServerDescriptor,
    DESCRIPTOR_FILE_NAME, EXIT_CODE_LOCK_CONFLICT, LOCK_FILE_NAME, WORKSPACE_DIR_NAME,
};
pub use session::{ClientConfig, ClientError, ClientHandle};
