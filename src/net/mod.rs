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

//! TCP transport: listening and dialing endpoints and the per-connection I/O tasks.
//!
//! Each established connection runs a reader task and a writer task. The reader decodes frames
//! and delivers them one at a time, so handlers observe messages in arrival order. The writer
//! drains a queue fed by [`Connection::send`], which never blocks and never holds a lock across
//! I/O. Close notifications fire exactly once per connection, whether the peer disconnected, a
//! protocol error tore the connection down, or [`Connection::shutdown`] was called locally.

use std::sync::Arc;

use crate::{framing::MAX_FRAME_SIZE, message::Message};

mod connection;
pub use connection::{Connection, ConnectionId};
#[cfg(test)]
pub(crate) use connection::test_support;

mod client;
pub use client::TcpClient;

mod server;
pub use server::TcpServer;

/// Transport tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct NetConfig {
    /// Upper bound on a whole wire frame, header included.
    pub max_frame_size: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Callbacks fired by a connection's I/O tasks.
///
/// `on_message` runs on the connection's reader task; long-running work should be handed off.
pub trait ConnectionEvents: Send + Sync + 'static {
    fn on_connect(&self, _conn: &Arc<Connection>) {}

    fn on_close(&self, _conn: &Arc<Connection>) {}

    fn on_message(&self, conn: &Arc<Connection>, msg: Message);
}
