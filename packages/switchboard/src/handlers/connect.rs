use axum::{
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use switchboard_core::Role;
use tracing::{debug, warn};

use crate::AppState;
use crate::ws_transport::WsTransport;

pub const NAME_HEADER: &str = "Name";
pub const TYPE_HEADER: &str = "Type";

const ANONYMOUS: &str = "Anonymous";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Display name from the `Name` header, falling back to a placeholder.
pub fn display_name(headers: &HeaderMap) -> String {
    header_str(headers, NAME_HEADER)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

/// WebSocket endpoint for both agents (`Type: S`) and customers.
pub async fn connect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let role = Role::from_type_header(header_str(&headers, TYPE_HEADER));
    let name = display_name(&headers);
    debug!(role = %role, name = %name, "Upgrading connection");

    ws.on_upgrade(move |socket| async move {
        let transport = WsTransport::new(socket).with_metrics(state.metrics.clone());
        match state.intake.admit(transport, role, name).await {
            Ok(_) => state.metrics.session_accepted(role),
            Err(e) => {
                // The transport was dropped unsplit, so its writer never counted the close
                warn!(role = %role, "Rejecting connection: {}", e);
                state.metrics.admission_rejected();
                state.metrics.connection_closed();
            }
        }
    })
}
