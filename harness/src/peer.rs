//! The DHT peer as seen by the harness: a black box that stores and looks up
//! values asynchronously and reports back through callbacks.

use std::sync::Arc;

pub use churnbench_lib::workbench_messages::RespondingNode;
use churnbench_lib::{InfoHash, NodeId, Value};

/// Called once when a put finishes, with the nodes that acknowledged it.
pub type PutDoneCallback = Box<dyn FnOnce(bool, Vec<NodeId>) + Send + 'static>;

/// Called for every value a lookup receives. Returning false asks the peer to
/// stop searching. May run concurrently for different response sources.
pub type ValueCallback = Arc<dyn Fn(&Value) -> bool + Send + Sync + 'static>;

/// Called once when a lookup finishes, after every value callback.
pub type GetDoneCallback = Box<dyn FnOnce(bool, Vec<RespondingNode>) + Send + 'static>;

/// One live DHT node. Callbacks may fire on any thread, including the
/// caller's own before `put`/`get` returns.
pub trait DhtPeer: Send + Sync {
    fn id(&self) -> NodeId;

    fn put(&self, key: &InfoHash, value: Value, on_done: PutDoneCallback);

    fn get(&self, key: &InfoHash, on_value: ValueCallback, on_done: GetDoneCallback);
}
