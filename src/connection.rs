//! Transport abstraction
//!
//! A `Connection` exchanges whole `Message`s with one peer. The broker only
//! writes through the owning client's send task, so implementations can
//! assume a single writer and a single reader.

use std::future::Future;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::error::ConnectionError;
use crate::message::Message;

pub trait Connection: Send + Sync + 'static {
    fn send(&self, msg: &Message) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Wait for the next message. Fails once the transport has ended.
    fn receive(&self) -> impl Future<Output = Result<Message, ConnectionError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}

/// JSON-over-WebSocket connection
///
/// The socket is split so a pending `receive` never holds up `send`.
pub struct WsConnection<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(ws_stream: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws_stream.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, msg: &Message) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(msg)?;
        self.sink.lock().await.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Message, ConnectionError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Message>(&text) {
                    Ok(msg) => return Ok(msg),
                    Err(e) => {
                        // Malformed frames are skipped, the connection stays up
                        warn!("Dropping malformed frame: {}", e);
                    }
                },
                Some(Ok(WsMessage::Close(_))) | None => return Err(ConnectionError::Closed),
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {
                    // Pong is handled automatically by tungstenite
                }
                Some(Ok(_)) => {
                    debug!("Ignoring non-text frame");
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        match self.sink.lock().await.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    /// In-memory connection driven by a test through `MockPeer`
    pub(crate) struct MockConnection {
        inbound: Mutex<mpsc::Receiver<Message>>,
        outbound: mpsc::UnboundedSender<Message>,
        fail_sends: bool,
        send_delay: Option<Duration>,
        closes: Arc<AtomicUsize>,
    }

    /// The test's end of a `MockConnection`
    pub(crate) struct MockPeer {
        /// Dropping this ends the connection's receive side
        pub(crate) inbound: mpsc::Sender<Message>,
        pub(crate) outbound: mpsc::UnboundedReceiver<Message>,
        closes: Arc<AtomicUsize>,
    }

    impl MockPeer {
        pub(crate) fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn mock_connection() -> (MockConnection, MockPeer) {
        build(false, None)
    }

    /// A connection whose every `send` fails
    pub(crate) fn broken_connection() -> (MockConnection, MockPeer) {
        build(true, None)
    }

    /// A connection that takes `delay` to write each frame
    pub(crate) fn slow_connection(delay: Duration) -> (MockConnection, MockPeer) {
        build(false, Some(delay))
    }

    fn build(fail_sends: bool, send_delay: Option<Duration>) -> (MockConnection, MockPeer) {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        let connection = MockConnection {
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            fail_sends,
            send_delay,
            closes: closes.clone(),
        };
        let peer = MockPeer {
            inbound: in_tx,
            outbound: out_rx,
            closes,
        };
        (connection, peer)
    }

    impl Connection for MockConnection {
        async fn send(&self, msg: &Message) -> Result<(), ConnectionError> {
            if self.fail_sends {
                return Err(ConnectionError::Closed);
            }
            if let Some(delay) = self.send_delay {
                tokio::time::sleep(delay).await;
            }
            self.outbound
                .send(msg.clone())
                .map_err(|_| ConnectionError::Closed)
        }

        async fn receive(&self) -> Result<Message, ConnectionError> {
            self.inbound
                .lock()
                .await
                .recv()
                .await
                .ok_or(ConnectionError::Closed)
        }

        async fn close(&self) -> Result<(), ConnectionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
