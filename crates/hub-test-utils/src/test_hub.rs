use hub::state::AppState;
use hub_store::Store;
use std::net::SocketAddr;

/// An in-process hub bound to a random loopback port, backed by a temp-file
/// store (so `tests/integration` suites can also reopen the same path to
/// assert on-disk persistence). Dropping the handle aborts the server task;
/// the temp directory is removed when `_workspace` drops.
pub struct TestHub {
    pub addr: SocketAddr,
    pub instance_id: String,
    pub auth_token: String,
    _workspace: tempfile::TempDir,
    _server: tokio::task::JoinHandle<()>,
}

impl TestHub {
    /// Spawns a fresh hub with a brand-new temp workspace and a random
    /// auth token.
    pub async fn spawn() -> Self {
        let workspace = tempfile::tempdir().expect("failed to create temp workspace");
        let db_path = workspace.path().join("store.sqlite3");
        Self::spawn_at(workspace, &db_path).await
    }

    async fn spawn_at(workspace: tempfile::TempDir, db_path: &std::path::Path) -> Self {
        let store = Store::open(db_path).expect("failed to open test store");
        let instance_id = uuid::Uuid::new_v4().to_string();
        let auth_token = uuid::Uuid::new_v4().to_string();
        let state = AppState::new(store, instance_id.clone(), auth_token.clone())
            .expect("failed to initialise hub state");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener has no local addr");

        let router = hub::build_router(state);
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("test hub server error");
        });

        Self {
            addr,
            instance_id,
            auth_token,
            _workspace: workspace,
            _server: server,
        }
    }

    pub fn http_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self._server.abort();
    }
}
