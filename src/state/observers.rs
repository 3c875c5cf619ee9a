use std::collections::HashMap;

use hyper_tungstenite::tungstenite::Message;
use log::warn;
use tokio::sync::mpsc;

use crate::messages::{ErrorNotice, ServerMessage};

/// Channel end used to push frames at a single connected observer.
pub type ObserverSender = mpsc::UnboundedSender<Message>;

/// Connected dashboards plus the process-lifetime error notice buffer.
///
/// The buffer is append-only and replayed to every newly connected observer
/// so late joiners see the same operational history. It is intentionally
/// unbounded at this appliance's scale.
pub struct ObserverRegistry {
    senders: HashMap<String, ObserverSender>,
    errors: Vec<ErrorNotice>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn register(&mut self, id: String, sender: ObserverSender) {
        self.senders.insert(id, sender);
    }

    pub fn unregister(&mut self, id: &str) {
        self.senders.remove(id);
    }

    pub fn observer_count(&self) -> usize {
        self.senders.len()
    }

    /// Push one message to every connected observer. Send failures are
    /// ignored; a dead connection is cleaned up by its own handler.
    pub fn broadcast(&self, message: &ServerMessage) {
        let Ok(json) = serde_json::to_string(message) else {
            return;
        };
        for sender in self.senders.values() {
            let _ = sender.send(Message::Text(json.clone()));
        }
    }

    /// Append an error notice to the buffer and broadcast it.
    pub fn push_error(&mut self, message: String) {
        warn!("{message}");
        let notice = ErrorNotice::new(message);
        self.errors.push(notice.clone());
        self.broadcast(&ServerMessage::LogError(notice));
    }

    /// Replay the buffered notices, in order, to one newly connected
    /// observer.
    pub fn replay_errors(&self, sender: &ObserverSender) {
        for notice in &self.errors {
            send_message(sender, &ServerMessage::LogError(notice.clone()));
        }
    }

    pub fn errors(&self) -> &[ErrorNotice] {
        &self.errors
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize and push one message at a single observer.
pub fn send_message(sender: &ObserverSender, message: &ServerMessage) {
    let Ok(json) = serde_json::to_string(message) else {
        return;
    };
    let _ = sender.send(Message::Text(json));
}
