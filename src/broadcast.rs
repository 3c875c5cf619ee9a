use std::sync::Arc;

use log::{debug, info};

use crate::error::AppError;
use crate::messages::{event_table_update, user_table_update};
use crate::state::observers::send_message;
use crate::state::{AppState, ObserverSender};

/// Observer broadcast loop.
///
/// Waits on the change signal, then pushes full current state to every
/// connected observer. Bursts of writes landing before a wake are collapsed
/// by the signal into a single broadcast cycle carrying the cumulative
/// state, so observers never miss an update — only redundant intermediate
/// snapshots. Returns only on storage failure, which the caller treats as
/// fatal.
pub async fn run(state: Arc<AppState>) -> Result<(), AppError> {
    info!("Broadcast loop started");
    loop {
        state.engine.signal().wait_then_clear().await;

        let logs = state.engine.store().all_logs().await?;
        let users = state.engine.store().all_users().await?;

        let observers = state.observers.lock().await;
        debug!(
            "Broadcasting snapshot ({} log entries, {} users) to {} observers",
            logs.len(),
            users.len(),
            observers.observer_count()
        );
        observers.broadcast(&event_table_update(&logs));
        observers.broadcast(&user_table_update(&users));
    }
}

/// Push one fresh snapshot pair to a single observer, used to catch up a
/// newly connected dashboard without waking everyone else.
pub async fn send_snapshot(state: &AppState, sender: &ObserverSender) -> Result<(), AppError> {
    let logs = state.engine.store().all_logs().await?;
    let users = state.engine.store().all_users().await?;
    send_message(sender, &event_table_update(&logs));
    send_message(sender, &user_table_update(&users));
    Ok(())
}
