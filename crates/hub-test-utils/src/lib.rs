//! Shared test utilities for agent-hub: an in-process hub spawn helper and a
//! raw WebSocket test client, mirroring the teacher's `rt-test-utils` split
//! (`mock_ws_server` / `mock_ws_client`) but driving the real router instead
//! of a protocol stub, since the hub's wire protocol is simple enough that a
//! real in-process server is cheaper to keep honest than a hand-rolled mock.

pub mod test_hub;
pub mod ws_client;

pub use test_hub::TestHub;
pub use ws_client::RawWsClient;
