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
use tokio::net::TcpListener;

use super::{connection::spawn_connection, ConnectionEvents, NetConfig};
use crate::error::RpcError;

const LOG_TARGET: &str = "jsonrpc::net::server";

/// A listening transport endpoint.
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: NetConfig,
}

impl TcpServer {
    /// Binds the listener. Port 0 binds an ephemeral port, reported by [`TcpServer::local_addr`].
    pub async fn bind(addr: SocketAddr, config: NetConfig) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(target: LOG_TARGET, "listening on {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the listener fails. Each accepted connection runs on its own
    /// reader and writer tasks and reports through `events`.
    pub async fn serve(self, events: Arc<dyn ConnectionEvents>) -> Result<(), RpcError> {
        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            if let Err(err) = stream.set_nodelay(true) {
                warn!(target: LOG_TARGET, "failed to set nodelay on {}: {}", peer_addr, err);
            }
            let conn = spawn_connection(stream, peer_addr, self.config.max_frame_size, events.clone());
            debug!(target: LOG_TARGET, "accepted {} from {}", conn.id(), peer_addr);
        }
    }
}
