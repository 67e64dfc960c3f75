//! Per-datagram socket: one logical request/response turn.
//!
//! A `DatagramSocket` is a logical view over the single shared UDP file
//! descriptor plus the captured sender address and payload. It is created
//! when a datagram is accepted, read and written during dispatch, and
//! destroyed after flush; it is never reused across datagrams.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::cache::ReplyCache;
use crate::error::Result;
use crate::protocol::{BinaryReader, BinaryWriter};

/// One inbound UDP datagram with an input cursor, an output accumulation
/// buffer, and the sender's address.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    /// Raw request bytes, kept verbatim for the duplicate-suppression key.
    request: Bytes,
    reader: BinaryReader,
    writer: BinaryWriter,
    cache: Option<Arc<ReplyCache>>,
}

impl DatagramSocket {
    /// Normally produced by `RpcListener::accept`; public so tests and
    /// custom listeners can build sockets directly.
    pub fn new(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        payload: Bytes,
        cache: Option<Arc<ReplyCache>>,
    ) -> Self {
        Self {
            socket,
            peer,
            reader: BinaryReader::new(payload.clone()),
            request: payload,
            writer: BinaryWriter::new(),
            cache,
        }
    }

    /// Remote address the reply will be sent to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Raw bytes of the inbound datagram.
    pub fn raw_request(&self) -> &Bytes {
        &self.request
    }

    /// Input cursor over the captured payload. Never reads the network.
    pub fn reader(&mut self) -> &mut BinaryReader {
        &mut self.reader
    }

    /// Output buffer; nothing is sent until [`flush`](Self::flush).
    pub fn writer(&mut self) -> &mut BinaryWriter {
        &mut self.writer
    }

    /// Send the accumulated buffer as one outbound datagram.
    ///
    /// When duplicate suppression is enabled the reply is stored in the
    /// cache first, keyed by (sender, original raw request), so a
    /// retransmission replays byte-identical output. The write buffer is
    /// cleared afterwards; a flush with zero writes sends an empty datagram.
    pub async fn flush(&mut self) -> Result<()> {
        let out = self.writer.take();
        if let Some(cache) = &self.cache {
            cache.put(self.peer, &self.request, out.clone());
        }
        self.socket.send_to(&out, self.peer).await?;
        trace!(peer = %self.peer, bytes = out.len(), "flushed datagram");
        Ok(())
    }
}
