//! Client actor
//!
//! A client owns one connection and runs two tasks over it:
//! - the send task drains the bounded outbound queue into `Connection::send`
//! - the receive task reads frames, stamps the sender and dispatches them
//!   through the client's `Router`
//!
//! Transport failure, `ClientHandle::stop` and a LOGOUT all converge on the
//! send task, which leaves every room once and ends the client.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::SendError;
use crate::message::{Message, MessageType};
use crate::recipient::{Recipient, RecipientRef, Stop};
use crate::rooms::Rooms;
use crate::router::Router;
use crate::types::{ClientId, Identity};

/// Cloneable handle used to reach a client from anywhere
#[derive(Debug, Clone)]
pub struct ClientHandle {
    identity: Arc<Identity>,
    outbound: mpsc::Sender<Message>,
    stop: Arc<watch::Sender<bool>>,
}

impl ClientHandle {
    pub fn id(&self) -> &ClientId {
        &self.identity.id
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Queue a message for this client without waiting
    ///
    /// Fails if the queue is full or the client has stopped.
    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        debug!("Client {}: queueing {}", self.identity.name, msg.msg_type);
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Ask the client to shut down. Safe to call any number of times.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

impl Recipient for ClientHandle {
    fn id(&self) -> &ClientId {
        ClientHandle::id(self)
    }

    fn send(&self, msg: Message) -> Result<(), SendError> {
        ClientHandle::send(self, msg)
    }
}

impl Stop for ClientHandle {
    fn stop(&self) {
        ClientHandle::stop(self)
    }
}

/// A connected client
pub struct Client<C> {
    handle: ClientHandle,
    rooms: Rooms,
    connection: C,
    outbound: mpsc::Receiver<Message>,
    stop: watch::Receiver<bool>,
}

impl<C: Connection> Client<C> {
    pub fn new(identity: Identity, rooms: Rooms, connection: C, queue_capacity: usize) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = ClientHandle {
            identity: Arc::new(identity),
            outbound: outbound_tx,
            stop: Arc::new(stop_tx),
        };
        Self {
            handle,
            rooms,
            connection,
            outbound: outbound_rx,
            stop: stop_rx,
        }
    }

    pub fn id(&self) -> &ClientId {
        self.handle.id()
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// The client as a room member
    pub fn recipient(&self) -> RecipientRef {
        Arc::new(self.handle.clone())
    }

    /// Run both tasks and wait until the client has shut down
    ///
    /// The connection is closed exactly once on the way out.
    pub async fn start(self) {
        let Client {
            handle,
            rooms,
            connection,
            outbound,
            stop,
        } = self;
        let name = handle.name().to_string();
        info!("Client {}: starting", name);

        let connection = Arc::new(connection);
        let router = Router::for_client(
            &rooms,
            Arc::new(handle.clone()),
            Arc::new(handle.clone()),
        );

        let send_task = tokio::spawn(send_loop(
            handle.clone(),
            rooms,
            connection.clone(),
            outbound,
            stop.clone(),
        ));
        let receive_task = tokio::spawn(receive_loop(
            handle.clone(),
            router,
            connection.clone(),
            stop,
        ));

        // The send task ending is the shutdown signal
        if let Err(e) = send_task.await {
            warn!("Client {}: send task failed: {}", name, e);
        }
        handle.stop();
        if let Err(e) = receive_task.await {
            warn!("Client {}: receive task failed: {}", name, e);
        }

        info!("Client {}: closing connection", name);
        if let Err(e) = connection.close().await {
            warn!("Client {}: error while closing connection: {}", name, e);
        }
        info!("Client {}: stopped", name);
    }
}

/// Resolves once a stop has been requested
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *stop.borrow_and_update();
        if stopped || stop.changed().await.is_err() {
            return;
        }
    }
}

/// Drain the outbound queue into the connection until told to stop
async fn send_loop<C: Connection>(
    handle: ClientHandle,
    rooms: Rooms,
    connection: Arc<C>,
    mut outbound: mpsc::Receiver<Message>,
    mut stop: watch::Receiver<bool>,
) {
    let name = handle.name();
    debug!("Client {}: send task started", name);

    loop {
        tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => {
                debug!("Client {}: stop requested", name);
                break;
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    break;
                };
                debug!("Client {}: sending {}", name, msg.msg_type);
                if let Err(e) = connection.send(&msg).await {
                    warn!("Client {}: error while sending message: {}", name, e);
                    break;
                }
                if msg.msg_type == MessageType::Logout {
                    info!("Client {}: logged out", name);
                    break;
                }
            }
        }
    }

    // Refuse further deliveries before leaving the rooms
    outbound.close();
    if let Err(e) = rooms.remove_client(handle.id().clone()).await {
        warn!("Client {}: cannot leave rooms: {}", name, e);
    }
    debug!("Client {}: send task ended", name);
}

/// Read frames and dispatch them until the transport ends or a stop is requested
async fn receive_loop<C: Connection>(
    handle: ClientHandle,
    router: Router,
    connection: Arc<C>,
    mut stop: watch::Receiver<bool>,
) {
    let name = handle.name();
    debug!("Client {}: receive task started", name);

    loop {
        let received = tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => break,
            received = connection.receive() => received,
        };

        let mut msg = match received {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Client {}: receive ended: {}", name, e);
                handle.stop();
                break;
            }
        };

        msg.sender_id = handle.id().to_string();
        msg.sender_name = handle.name().to_string();
        debug!("Client {}: received {}", name, msg.msg_type);

        let Some(route) = router.find_route(&msg.msg_type) else {
            warn!("Client {}: no route for message type {}", name, msg.msg_type);
            continue;
        };
        if let Err(e) = route.handle(msg).await {
            warn!("Client {}: error while handling message: {}", name, e);
        }
    }

    debug!("Client {}: receive task ended", name);
}
