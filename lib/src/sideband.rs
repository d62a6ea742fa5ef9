// Copyright 2025 The Got Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sideband framing: multiplexing pack data with progress and error text.
//!
//! A frame is one channel byte, a 16-bit big-endian payload length, and the
//! payload. Servers that stream pack bodies interleave data frames with
//! progress frames; an error frame carries a human-readable message.

use crate::error::GotError;
use crate::error::GotResult;

/// Largest payload one frame can carry.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Which stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebandChannel {
    /// Pack bytes.
    Data,
    /// Progress text for the user.
    Progress,
    /// Fatal error text; the stream ends after this frame.
    Error,
}

impl SidebandChannel {
    fn code(self) -> u8 {
        match self {
            Self::Data => 1,
            Self::Progress => 2,
            Self::Error => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Data),
            2 => Some(Self::Progress),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Encodes one frame. The payload must fit in a 16-bit length.
pub fn encode_frame(channel: SidebandChannel, payload: &[u8]) -> GotResult<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| {
        GotError::InvalidInput(format!("sideband payload of {} bytes", payload.len()))
    })?;
    let mut out = Vec::with_capacity(3 + payload.len());
    out.push(channel.code());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Encodes a payload of any size as consecutive frames on one channel.
pub fn encode_frames(channel: SidebandChannel, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 3);
    for chunk in payload.chunks(MAX_FRAME_PAYLOAD.max(1)) {
        out.push(channel.code());
        out.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
        out.extend_from_slice(chunk);
    }
    out
}

/// Iterates the frames of a sideband stream.
#[derive(Debug)]
pub struct SidebandDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SidebandDecoder<'a> {
    /// Decodes the frames of `data` from the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for SidebandDecoder<'a> {
    type Item = GotResult<(SidebandChannel, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        const WHAT: &str = "sideband stream";
        if self.pos == self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        if rest.len() < 3 {
            self.pos = self.data.len();
            return Some(Err(GotError::format(WHAT, "truncated frame header")));
        }
        let Some(channel) = SidebandChannel::from_code(rest[0]) else {
            self.pos = self.data.len();
            return Some(Err(GotError::format(
                WHAT,
                format!("unknown channel {}", rest[0]),
            )));
        };
        let len = usize::from(u16::from_be_bytes([rest[1], rest[2]]));
        let Some(payload) = rest.get(3..3 + len) else {
            self.pos = self.data.len();
            return Some(Err(GotError::format(WHAT, "truncated frame payload")));
        };
        self.pos += 3 + len;
        Some(Ok((channel, payload)))
    }
}

/// Reassembles the data channel of a stream, failing on an error frame.
pub fn collect_data(stream: &[u8]) -> GotResult<Vec<u8>> {
    let mut data = Vec::new();
    for frame in SidebandDecoder::new(stream) {
        let (channel, payload) = frame?;
        match channel {
            SidebandChannel::Data => data.extend_from_slice(payload),
            SidebandChannel::Progress => {}
            SidebandChannel::Error => {
                return Err(GotError::format(
                    "sideband stream",
                    format!("remote error: {}", String::from_utf8_lossy(payload)),
                ));
            }
        }
    }
    Ok(data)
}
