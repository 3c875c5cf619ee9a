use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::info;

use crate::error::AppError;
use crate::messages::CommandRequest;
use crate::state::AppState;

/// Handle one inbound command message.
///
/// Whole messages are serialized against each other by the command lock, on
/// top of the store's own write lock. Nothing propagates back to the sending
/// peer: every rejected command becomes exactly one error notice broadcast
/// and every accepted mutation raises the change signal.
pub async fn handle_command(text: &str, state: &AppState) {
    let _serial = state.command_lock.lock().await;

    let request: CommandRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            report(state, format!("Invalid command message: {e}")).await;
            return;
        }
    };

    match request.request_type.as_str() {
        // Signal commands address the external arbiter; acknowledged only.
        "SIGNAL" => info!("Arbiter signal command {} acknowledged", request.command),
        "PAYLOAD" => {
            if let Err(e) = dispatch_payload(&request, state).await {
                report(state, e.to_string()).await;
            }
        }
        other => {
            report(
                state,
                format!(
                    "Received invalid requestType, expected \"SIGNAL\" or \"PAYLOAD\", \
                     got {other}. Request ignored."
                ),
            )
            .await;
        }
    }
}

async fn dispatch_payload(request: &CommandRequest, state: &AppState) -> Result<(), AppError> {
    let payload = request.payload.as_deref().ok_or_else(|| {
        AppError::InvalidCommand(format!(
            "Payload command {} is missing its payload.",
            request.command
        ))
    })?;

    match request.command.as_str() {
        "ADD_USER" => state.engine.add_user(payload).await,
        "REMOVE_USER" => state.engine.remove_user(payload).await,
        "LOG_IMAGE" => {
            let image = decode_image_payload(payload)?;
            let identity = state.engine.decode_identity(&image);
            state.engine.log_event(identity).await
        }
        other => Err(AppError::InvalidCommand(format!(
            "Payload command {other} is invalid."
        ))),
    }
}

/// Decode a base64 image payload, stripping an optional data-URI header.
fn decode_image_payload(payload: &str) -> Result<Vec<u8>, AppError> {
    let encoded = if payload.starts_with("data:") {
        payload.split_once(',').map(|(_, rest)| rest).unwrap_or(payload)
    } else {
        payload
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::InvalidCommand(format!("Image payload is not valid base64: {e}")))
}

async fn report(state: &AppState, message: String) {
    state.observers.lock().await.push_error(message);
}
