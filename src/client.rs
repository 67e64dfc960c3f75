//! UDP RPC client.
//!
//! Every call encodes a `Call` envelope plus caller-written argument fields
//! into one datagram and waits for the matching reply. Lost datagrams are
//! covered by retransmitting the identical bytes, so the server side can
//! recognize the retry through its duplicate cache and replay the original
//! reply instead of re-executing the handler.

use std::time::Duration;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, warn};

use crate::error::{
    AppErrorKind, AppException, ProtocolErrorKind, Result, RpcError, TransportErrorKind,
};
use crate::protocol::{BinaryReader, BinaryWriter, Envelope, MessageKind};
use crate::transport::MAX_DATAGRAM_SIZE;

/// Retry and timeout policy for a client.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// How long to wait for a reply before retransmitting.
    pub timeout: Duration,
    /// How many retransmissions to attempt after the first send.
    pub retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            retries: 3,
        }
    }
}

/// Client for one remote RPC endpoint.
pub struct RpcClient {
    socket: UdpSocket,
    config: ClientConfig,
    seq: i32,
}

impl RpcClient {
    /// Bind an ephemeral local socket aimed at `target`.
    pub async fn connect(target: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with(target, ClientConfig::default()).await
    }

    pub async fn connect_with(target: impl ToSocketAddrs, config: ClientConfig) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        // Connecting pins the peer and drops datagrams from anyone else.
        socket.connect(target).await?;
        Ok(Self {
            socket,
            config,
            seq: 0,
        })
    }

    fn next_seq(&mut self) -> i32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Issue a call and return a reader positioned over the reply fields.
    ///
    /// `write_args` appends the argument field stream; the field stop is
    /// written here. An `Exception` reply decodes into
    /// [`RpcError::Application`].
    pub async fn call<F>(&mut self, method: &str, write_args: F) -> Result<BinaryReader>
    where
        F: FnOnce(&mut BinaryWriter) -> Result<()>,
    {
        let seq = self.next_seq();
        let request = encode_call(method, seq, write_args)?;

        let mut attempts = 0u32;
        loop {
            self.socket.send(&request).await?;
            match self.recv_reply().await {
                Ok((envelope, reader)) => return finish_call(method, seq, envelope, reader),
                Err(RpcError::Transport {
                    kind: TransportErrorKind::TimedOut,
                    ..
                }) if attempts < self.config.retries => {
                    attempts += 1;
                    warn!(method, seq, attempt = attempts, "timed out, retransmitting");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a call without waiting for a reply. Returns the sequence ID so
    /// the caller can match pushed messages received via [`recv_push`].
    ///
    /// [`recv_push`]: Self::recv_push
    pub async fn send_call<F>(&mut self, method: &str, write_args: F) -> Result<i32>
    where
        F: FnOnce(&mut BinaryWriter) -> Result<()>,
    {
        let seq = self.next_seq();
        let request = encode_call(method, seq, write_args)?;
        self.socket.send(&request).await?;
        Ok(seq)
    }

    /// Wait for one server-pushed message, up to `timeout`.
    ///
    /// Returns the raw envelope and a reader over its fields; the caller
    /// inspects the kind to distinguish data pushes from the closing
    /// exception.
    pub async fn recv_push(&mut self, timeout: Duration) -> Result<(Envelope, BinaryReader)> {
        tokio::time::timeout(timeout, self.recv_reply())
            .await
            .map_err(|_| RpcError::transport(TransportErrorKind::TimedOut, "push receive timed out"))?
    }

    async fn recv_reply(&mut self) -> Result<(Envelope, BinaryReader)> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let fut = self.socket.recv(&mut buf);
        let n = tokio::time::timeout(self.config.timeout, fut)
            .await
            .map_err(|_| RpcError::transport(TransportErrorKind::TimedOut, "no reply from server"))??;
        debug!(bytes = n, "received datagram");
        let mut reader = BinaryReader::new(Bytes::copy_from_slice(&buf[..n]));
        let envelope = reader.read_message_begin()?;
        Ok((envelope, reader))
    }
}

fn encode_call<F>(method: &str, seq: i32, write_args: F) -> Result<Bytes>
where
    F: FnOnce(&mut BinaryWriter) -> Result<()>,
{
    let mut writer = BinaryWriter::new();
    writer.write_message_begin(&Envelope::call(method, seq))?;
    write_args(&mut writer)?;
    writer.write_field_stop();
    Ok(writer.take())
}

fn finish_call(
    method: &str,
    seq: i32,
    envelope: Envelope,
    mut reader: BinaryReader,
) -> Result<BinaryReader> {
    if envelope.seq_id != seq {
        return Err(RpcError::Application(AppException::new(
            AppErrorKind::BadSequenceId,
            format!("reply sequence {} does not match call {}", envelope.seq_id, seq),
        )));
    }
    if envelope.name != method {
        return Err(RpcError::Application(AppException::new(
            AppErrorKind::WrongMethodName,
            format!("reply for method {:?}, expected {:?}", envelope.name, method),
        )));
    }
    match envelope.kind {
        MessageKind::Reply => Ok(reader),
        MessageKind::Exception => {
            let exc = AppException::read_fields(&mut reader)?;
            Err(RpcError::Application(exc))
        }
        MessageKind::Call => Err(RpcError::protocol(
            ProtocolErrorKind::InvalidData,
            "unexpected call message from server",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_retransmits_until_reply() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = RpcClient::connect_with(
            addr,
            ClientConfig {
                timeout: Duration::from_millis(100),
                retries: 3,
            },
        )
        .await
        .unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            // Swallow the first attempt, answer the second.
            let _ = server.recv_from(&mut buf).await.unwrap();
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            let request = Bytes::copy_from_slice(&buf[..n]);
            let mut r = BinaryReader::new(request.clone());
            let env = r.read_message_begin().unwrap();

            let mut w = BinaryWriter::new();
            w.write_message_begin(&Envelope::reply(&env.name, env.seq_id)).unwrap();
            w.write_field_begin(crate::protocol::WireType::I32, 1);
            w.write_i32(42);
            w.write_field_stop();
            server.send_to(&w.take(), from).await.unwrap();
            request
        });

        let mut reply = client.call("echo", |_w| Ok(())).await.unwrap();
        let (_, id) = reply.read_field_begin().unwrap();
        assert_eq!(id, 1);
        assert_eq!(reply.read_i32().unwrap(), 42);

        // Both attempts carried identical bytes.
        let first_attempt = server_task.await.unwrap();
        let mut r = BinaryReader::new(first_attempt);
        let env = r.read_message_begin().unwrap();
        assert_eq!(env.name, "echo");
        assert_eq!(env.seq_id, 1);
    }

    #[tokio::test]
    async fn test_call_times_out_after_retry_budget() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = RpcClient::connect_with(
            addr,
            ClientConfig {
                timeout: Duration::from_millis(20),
                retries: 1,
            },
        )
        .await
        .unwrap();

        let err = client.call("void", |_w| Ok(())).await.unwrap_err();
        match err {
            RpcError::Transport { kind, .. } => assert_eq!(kind, TransportErrorKind::TimedOut),
            other => panic!("expected transport timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exception_reply_surfaces_as_application_error() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let mut client = RpcClient::connect(addr).await.unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            let mut r = BinaryReader::new(Bytes::copy_from_slice(&buf[..n]));
            let env = r.read_message_begin().unwrap();

            let mut w = BinaryWriter::new();
            w.write_message_begin(&Envelope::exception(&env.name, env.seq_id)).unwrap();
            AppException::unknown_method("nope").write_fields(&mut w).unwrap();
            server.send_to(&w.take(), from).await.unwrap();
        });

        let err = client.call("nope", |_w| Ok(())).await.unwrap_err();
        match err {
            RpcError::Application(exc) => {
                assert!(exc.display_message().contains("unknown method"));
            }
            other => panic!("expected application error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_seq_is_bad_sequence_error() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let mut client = RpcClient::connect(addr).await.unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            let mut r = BinaryReader::new(Bytes::copy_from_slice(&buf[..n]));
            let env = r.read_message_begin().unwrap();

            let mut w = BinaryWriter::new();
            w.write_message_begin(&Envelope::reply(&env.name, env.seq_id + 100)).unwrap();
            w.write_field_stop();
            server.send_to(&w.take(), from).await.unwrap();
        });

        let err = client.call("seqcheck", |_w| Ok(())).await.unwrap_err();
        match err {
            RpcError::Application(exc) => assert_eq!(exc.kind, AppErrorKind::BadSequenceId),
            other => panic!("expected bad sequence error, got {other:?}"),
        }
    }
}
