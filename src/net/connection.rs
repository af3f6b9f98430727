// Copyright 2022. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use futures::{SinkExt, StreamExt};
use log::*;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::ConnectionEvents;
use crate::{error::RpcError, framing::MessageCodec, message::Message};

const LOG_TARGET: &str = "jsonrpc::net::connection";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a live connection within this process. Manager tables key their per-connection
/// records by this id rather than holding on to each other's records directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A handle to an established transport connection.
///
/// Sending queues the message for the writer task and returns immediately. Shutting down stops
/// both I/O tasks; the close notification is fired (once) by the reader task on its way out.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Message>,
    connected: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queues a message for delivery to the peer.
    pub fn send(&self, msg: Message) -> Result<(), RpcError> {
        if !self.is_connected() {
            return Err(RpcError::Disconnected);
        }
        self.outbound.send(msg).map_err(|_| RpcError::Disconnected)
    }

    /// Tears the connection down. Idempotent.
    pub fn shutdown(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Wraps an established socket in a [`Connection`] and spawns its reader and writer tasks.
/// `events.on_connect` fires before any message can be delivered.
pub(crate) fn spawn_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    max_frame_size: usize,
    events: Arc<dyn ConnectionEvents>,
) -> Arc<Connection> {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let conn = Arc::new(Connection {
        id: ConnectionId::next(),
        peer_addr,
        outbound: outbound_tx,
        connected: AtomicBool::new(true),
        shutdown: shutdown_tx,
    });

    events.on_connect(&conn);

    let (read_half, write_half) = stream.into_split();
    let writer = FramedWrite::new(write_half, MessageCodec::with_max_frame_size(max_frame_size));
    let reader = FramedRead::new(read_half, MessageCodec::with_max_frame_size(max_frame_size));
    tokio::spawn(write_loop(writer, outbound_rx, shutdown_rx.clone(), conn.clone()));
    tokio::spawn(read_loop(reader, shutdown_rx, conn.clone(), events));

    conn
}

async fn read_loop(
    mut reader: FramedRead<tokio::net::tcp::OwnedReadHalf, MessageCodec>,
    mut shutdown_rx: watch::Receiver<bool>,
    conn: Arc<Connection>,
    events: Arc<dyn ConnectionEvents>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            next = reader.next() => match next {
                Some(Ok(msg)) => events.on_message(&conn, msg),
                Some(Err(err)) => {
                    error!(target: LOG_TARGET, "{} read failed: {}", conn.id(), err);
                    break;
                },
                None => {
                    debug!(target: LOG_TARGET, "{} closed by peer", conn.id());
                    break;
                },
            },
        }
    }

    conn.shutdown();
    events.on_close(&conn);
}

async fn write_loop(
    mut writer: FramedWrite<tokio::net::tcp::OwnedWriteHalf, MessageCodec>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
    conn: Arc<Connection>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            maybe_msg = outbound_rx.recv() => match maybe_msg {
                Some(msg) => {
                    if let Err(err) = writer.send(msg).await {
                        warn!(target: LOG_TARGET, "{} write failed: {}", conn.id(), err);
                        conn.shutdown();
                        break;
                    }
                },
                None => break,
            },
        }
    }
}
