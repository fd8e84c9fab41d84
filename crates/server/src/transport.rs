//! Bidirectional JSON message transports.
//!
//! The session only needs send/receive/close semantics; everything else
//! (framing, sockets) lives here. Two implementations:
//!
//! - [`PipeTransport`]: length-prefixed JSON over a byte pipe. Framing is a
//!   4-byte little-endian length followed by the JSON bytes.
//! - [`WebSocketTransport`]: JSON text frames over an accepted WebSocket.
//!
//! [`loopback`] builds an in-memory pair for tests.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{Error, Result};

/// Writer half of a transport.
pub trait TransportSender: Send {
    /// Sends one message to the peer.
    fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>>;

    /// Closes the channel; further sends fail.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Reader half of a transport. `run` pumps inbound messages into the
/// channel handed out at construction until EOF or error.
pub trait TransportReceiver: Send {
    fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// A transport split into its working parts.
pub struct TransportParts {
    pub sender: Box<dyn TransportSender>,
    pub receiver: Box<dyn TransportReceiver>,
    pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// A transport that can be split into sender/receiver parts.
pub trait Transport: Send {
    fn into_parts(self: Box<Self>) -> TransportParts;
}

// ---------------------------------------------------------------------------
// Pipe transport
// ---------------------------------------------------------------------------

/// Length-prefixed JSON transport over a byte pipe.
pub struct PipeTransport<W, R> {
    writer: W,
    reader: R,
    message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        (
            Self {
                writer,
                reader,
                message_tx,
            },
            message_rx,
        )
    }

    pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
        TransportParts {
            sender: Box::new(PipeTransportSender {
                writer: self.writer,
            }),
            receiver: Box::new(PipeTransportReceiver {
                reader: self.reader,
                message_tx: self.message_tx,
            }),
            message_rx,
        }
    }
}

impl<W, R> Transport for PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    fn into_parts(self: Box<Self>) -> TransportParts {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let mut this = *self;
        this.message_tx = message_tx;
        this.into_transport_parts(message_rx)
    }
}

pub struct PipeTransportSender<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> TransportSender for PipeTransportSender<W> {
    fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let bytes = serde_json::to_vec(&message)?;
            let length = (bytes.len() as u32).to_le_bytes();
            self.writer.write_all(&length).await?;
            self.writer.write_all(&bytes).await?;
            self.writer.flush().await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.writer.shutdown().await?;
            Ok(())
        })
    }
}

pub struct PipeTransportReceiver<R> {
    reader: R,
    message_tx: mpsc::UnboundedSender<Value>,
}

impl<R: AsyncRead + Unpin + Send + 'static> TransportReceiver for PipeTransportReceiver<R> {
    fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            loop {
                let mut length_buf = [0u8; 4];
                match self.reader.read_exact(&mut length_buf).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => {
                        return Err(Error::Transport(format!(
                            "Failed to read length prefix: {e}"
                        )));
                    }
                }
                let length = u32::from_le_bytes(length_buf) as usize;

                let mut message_buf = vec![0u8; length];
                self.reader
                    .read_exact(&mut message_buf)
                    .await
                    .map_err(|e| Error::Transport(format!("Failed to read message body: {e}")))?;

                let message: Value = serde_json::from_slice(&message_buf)?;
                if self.message_tx.send(message).is_err() {
                    // Session dropped its receiver; normal shutdown.
                    return Ok(());
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

/// JSON text frames over an accepted WebSocket connection.
pub struct WebSocketTransport {
    stream: WebSocketStream<TcpStream>,
}

impl WebSocketTransport {
    /// Performs the server-side WebSocket handshake on an accepted socket.
    pub async fn accept(stream: TcpStream) -> Result<Self> {
        let stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::Transport(format!("WebSocket handshake failed: {e}")))?;
        Ok(Self { stream })
    }
}

impl Transport for WebSocketTransport {
    fn into_parts(self: Box<Self>) -> TransportParts {
        let (sink, source) = self.stream.split();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        TransportParts {
            sender: Box::new(WebSocketSender { sink }),
            receiver: Box::new(WebSocketReceiver { source, message_tx }),
            message_rx,
        }
    }
}

struct WebSocketSender {
    sink: futures_util::stream::SplitSink<WebSocketStream<TcpStream>, WsMessage>,
}

impl TransportSender for WebSocketSender {
    fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let text = serde_json::to_string(&message)?;
            self.sink
                .send(WsMessage::Text(text))
                .await
                .map_err(|e| Error::Transport(format!("WebSocket send failed: {e}")))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.sink
                .send(WsMessage::Close(None))
                .await
                .map_err(|e| Error::Transport(format!("WebSocket close failed: {e}")))
        })
    }
}

struct WebSocketReceiver {
    source: futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketReceiver {
    fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            while let Some(frame) = self.source.next().await {
                let frame =
                    frame.map_err(|e| Error::Transport(format!("WebSocket read failed: {e}")))?;
                match frame {
                    WsMessage::Text(text) => {
                        let message: Value = serde_json::from_str(&text)?;
                        if self.message_tx.send(message).is_err() {
                            return Ok(());
                        }
                    }
                    WsMessage::Close(_) => return Ok(()),
                    _ => {}
                }
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory loopback for tests
// ---------------------------------------------------------------------------

/// Client-side handle of a [`loopback`] transport pair.
pub struct LoopbackClient {
    /// Sends messages the session will receive as inbound.
    pub to_server: mpsc::UnboundedSender<Value>,
    /// Receives everything the session sends out.
    pub from_server: mpsc::UnboundedReceiver<Value>,
}

struct LoopbackSender {
    tx: mpsc::UnboundedSender<Value>,
}

impl TransportSender for LoopbackSender {
    fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
        let result = self
            .tx
            .send(message)
            .map_err(|_| Error::ChannelClosed);
        Box::pin(async move { result })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }
}

struct LoopbackReceiver {
    rx: mpsc::UnboundedReceiver<Value>,
    message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for LoopbackReceiver {
    fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            while let Some(message) = self.rx.recv().await {
                if self.message_tx.send(message).is_err() {
                    break;
                }
            }
            Ok(())
        })
    }
}

/// Builds an in-memory transport pair: server-side parts plus the client
/// handle driving them.
pub fn loopback() -> (TransportParts, LoopbackClient) {
    let (client_tx, server_inbound_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();

    let parts = TransportParts {
        sender: Box::new(LoopbackSender { tx: server_tx }),
        receiver: Box::new(LoopbackReceiver {
            rx: server_inbound_rx,
            message_tx,
        }),
        message_rx,
    };

    (
        parts,
        LoopbackClient {
            to_server: client_tx,
            from_server: client_rx,
        },
    )
}
