use hub::state::AppState;
use hub_client::discovery::{self, ServerDescriptor};
use hub_store::Store;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let workspace_root = env::var("AGENT_HUB_WORKSPACE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::current_dir().expect("cwd must be readable"));
    let workspace_dir = workspace_root.join(discovery::WORKSPACE_DIR_NAME);
    std::fs::create_dir_all(&workspace_dir).expect("failed to create workspace directory");

    // Single-writer enforcement (§4.6): a losing process exits before ever
    // opening the store.
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(discovery::lock_path(&workspace_dir))
        .expect("failed to open lock file");
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _lock_guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(_) => {
            error!("another hub instance already holds the workspace lock");
            std::process::exit(discovery::EXIT_CODE_LOCK_CONFLICT);
        }
    };

    let auth_token = env::var("AGENT_HUB_TOKEN").unwrap_or_else(|_| mint_token());
    let instance_id = uuid::Uuid::new_v4().to_string();

    let db_path = workspace_dir.join("store.sqlite3");
    info!(path = %db_path.display(), "opening store");
    let store = Store::open(&db_path).expect("failed to open store");
    let state = AppState::new(store, instance_id.clone(), auth_token.clone())
        .expect("failed to initialise hub state");

    let bind_addr = env::var("AGENT_HUB_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:0".to_owned());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    let local_addr = listener.local_addr().expect("listener has no local addr");

    let descriptor = ServerDescriptor {
        instance_id: instance_id.clone(),
        db_id: state.db_id.clone(),
        host: local_addr.ip().to_string(),
        port: local_addr.port(),
        auth_token,
        pid: std::process::id(),
        started_at: chrono::Utc::now().to_rfc3339(),
        protocol_version: hub_protocol::PROTOCOL_VERSION,
        schema_version: Some(state.schema_version),
    };
    discovery::write_descriptor(&workspace_dir, &descriptor)
        .expect("failed to write connection descriptor");
    info!(addr = %local_addr, instance_id, "hub listening");

    let router = hub::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("hub shut down gracefully");
}

fn mint_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| format!("{:x}", rng.gen_range(0..16u8)))
        .collect()
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
