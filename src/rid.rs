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

//! Request id generation.
//!
//! A request id is a 36 character text uuid in `8-4-4-4-12` form. The first 8 bytes are drawn
//! from the OS CSPRNG and the last 8 bytes encode a process-wide monotonic counter, high byte
//! first. The counter half keeps ids generated in quick succession distinct even if the random
//! half were ever to collide.

use std::{
    fmt::Write,
    sync::atomic::{AtomicU64, Ordering},
};

use rand::{rngs::OsRng, RngCore};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Generates a fresh request id.
pub fn generate() -> String {
    let mut random = [0u8; 8];
    OsRng.fill_bytes(&mut random);
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed).to_be_bytes();

    let mut rid = String::with_capacity(36);
    for (i, byte) in random.iter().enumerate() {
        if i == 4 || i == 6 {
            rid.push('-');
        }
        write!(rid, "{:02x}", byte).expect("writing to a String cannot fail");
    }
    rid.push('-');
    for (i, byte) in sequence.iter().enumerate() {
        if i == 2 {
            rid.push('-');
        }
        write!(rid, "{:02x}", byte).expect("writing to a String cannot fail");
    }

    rid
}
