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

use std::{net::SocketAddr, sync::Arc};

use log::*;
use tokio::net::TcpStream;

use super::{connection::spawn_connection, Connection, ConnectionEvents, NetConfig};
use crate::error::RpcError;

const LOG_TARGET: &str = "jsonrpc::net::client";

/// An outbound transport endpoint holding a single connection.
pub struct TcpClient {
    conn: Arc<Connection>,
}

impl TcpClient {
    /// Dials `addr` and resolves once the transport reports the connection established.
    pub async fn connect(
        addr: SocketAddr,
        config: NetConfig,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(target: LOG_TARGET, "failed to set nodelay on {}: {}", addr, err);
        }
        let peer_addr = stream.peer_addr()?;
        let conn = spawn_connection(stream, peer_addr, config.max_frame_size, events);
        debug!(target: LOG_TARGET, "connected {} to {}", conn.id(), peer_addr);
        Ok(Self { conn })
    }

    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn shutdown(&self) {
        self.conn.shutdown();
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.conn.shutdown();
    }
}
