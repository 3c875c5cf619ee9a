pub mod observers;
pub mod signal;
pub mod store;
pub mod toggle;

pub use observers::{ObserverRegistry, ObserverSender};
pub use signal::ChangeSignal;
pub use store::{LogEvent, Store, WriteHandle};

use tokio::sync::Mutex;

use crate::engine::Engine;

/// Shared state across all connections and background tasks.
///
/// Each subsystem carries its own synchronization: the engine serializes
/// writers through the store's write lock, the change signal is lock-free,
/// and the observer registry has its own mutex so broadcasting never
/// contends with command processing. The command lock additionally
/// serializes whole inbound command messages against each other.
pub struct AppState {
    pub engine: Engine,
    pub observers: Mutex<ObserverRegistry>,
    pub command_lock: Mutex<()>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            observers: Mutex::new(ObserverRegistry::new()),
            command_lock: Mutex::new(()),
        }
    }
}
