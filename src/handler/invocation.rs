//! Invocation context handed to method handlers.
//!
//! Owns the per-datagram socket for the duration of one call. Handlers read
//! their typed argument fields through [`reader`](Invocation::reader), write
//! a Reply or Exception envelope plus result fields, and flush exactly once.
//! The subscription pattern is the exception: it may move the invocation
//! into a background task and flush once per push.

use tokio::sync::watch;

use crate::error::{AppException, Result};
use crate::protocol::{BinaryReader, BinaryWriter, Envelope};
use crate::transport::DatagramSocket;

/// One decoded call bound to its datagram socket.
#[derive(Debug)]
pub struct Invocation {
    method: String,
    seq_id: i32,
    socket: DatagramSocket,
    shutdown: watch::Receiver<bool>,
}

impl Invocation {
    pub fn new(
        method: impl Into<String>,
        seq_id: i32,
        socket: DatagramSocket,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            method: method.into(),
            seq_id,
            socket,
            shutdown,
        }
    }

    /// Method name from the call envelope, echoed back in replies.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Sender of the request datagram.
    pub fn peer(&self) -> std::net::SocketAddr {
        self.socket.peer()
    }

    /// Caller-chosen sequence ID; pushes reuse it verbatim.
    pub fn seq_id(&self) -> i32 {
        self.seq_id
    }

    /// Server shutdown signal. Long-lived subscriptions must poll this on
    /// every tick so they terminate promptly during drain.
    pub fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    pub fn reader(&mut self) -> &mut BinaryReader {
        self.socket.reader()
    }

    pub fn writer(&mut self) -> &mut BinaryWriter {
        self.socket.writer()
    }

    /// Begin a Reply envelope for this call's method name and sequence ID.
    pub fn write_reply_begin(&mut self) -> Result<()> {
        let envelope = Envelope::reply(self.method.clone(), self.seq_id);
        self.socket.writer().write_message_begin(&envelope)
    }

    /// Write a complete Exception envelope plus the encoded exception.
    pub fn write_exception(&mut self, exc: &AppException) -> Result<()> {
        let envelope = Envelope::exception(self.method.clone(), self.seq_id);
        self.socket.writer().write_message_begin(&envelope)?;
        exc.write_fields(self.socket.writer())
    }

    /// Send the accumulated reply as one datagram (and cache it when
    /// duplicate suppression is enabled).
    pub async fn flush(&mut self) -> Result<()> {
        self.socket.flush().await
    }

    /// Convenience: exception envelope, encoded exception, flush.
    pub async fn reply_exception(&mut self, exc: &AppException) -> Result<()> {
        self.write_exception(exc)?;
        self.flush().await
    }

    /// Convenience: reply envelope with an empty result struct, flushed.
    pub async fn reply_empty(&mut self) -> Result<()> {
        self.write_reply_begin()?;
        self.writer().write_field_stop();
        self.flush().await
    }
}
