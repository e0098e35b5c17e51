//! WebSocket connection handler
//!
//! Performs the WebSocket handshake for a new TCP connection, builds the
//! client's identity, joins it to the main room and runs it until it stops.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, info};

use crate::client::Client;
use crate::config::BrokerConfig;
use crate::connection::WsConnection;
use crate::error::AppError;
use crate::rooms::Rooms;
use crate::types::{ClientId, Identity, MAIN_ROOM};

/// Display name used when the upgrade request carries none
const ANONYMOUS: &str = "anonymous";

/// Handle a new TCP connection
///
/// Returns once the client has shut down.
pub async fn handle_connection(
    stream: TcpStream,
    rooms: Rooms,
    config: BrokerConfig,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, picking the display name off the request URI
    let mut display_name = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        display_name = req.uri().query().and_then(name_from_query);
        Ok(resp)
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;

    let identity = Identity::new(
        ClientId::generate(),
        display_name.unwrap_or_else(|| ANONYMOUS.to_string()),
    );
    info!(
        "Client {} ({}) connected from {}",
        identity.id, identity.name, peer_addr
    );

    let connection = WsConnection::new(ws_stream);
    let client = Client::new(identity, rooms.clone(), connection, config.client_queue_capacity);

    rooms
        .add_client_to_room(MAIN_ROOM, client.recipient())
        .await?;
    client.start().await;

    info!("Client from {} disconnected", peer_addr);

    Ok(())
}

/// Extract a non-empty, percent-decoded `name` parameter from a query string
fn name_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next()?;
        if key != "name" {
            return None;
        }
        urlencoding::decode(value)
            .ok()
            .map(|name| name.into_owned())
            .filter(|name| !name.is_empty())
    })
}
