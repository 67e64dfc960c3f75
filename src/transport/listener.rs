//! Server-side UDP listener.
//!
//! Binds the shared UDP port and yields one [`DatagramSocket`] per truly new
//! inbound datagram. When duplicate suppression is enabled, a retransmitted
//! request is answered from the [`ReplyCache`] inside the accept loop and
//! never surfaces to the dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::debug;

use crate::cache::ReplyCache;
use crate::error::Result;

use super::datagram::DatagramSocket;

/// Largest datagram the listener will accept, matching the client's send
/// buffer. Anything longer is truncated by the OS.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Listening UDP socket plus the optional duplicate-suppression cache.
#[derive(Debug)]
pub struct RpcListener {
    socket: Arc<UdpSocket>,
    cache: Option<Arc<ReplyCache>>,
}

impl RpcListener {
    /// Bind the UDP port. Pass a cache to enable duplicate suppression.
    pub async fn bind(addr: impl ToSocketAddrs, cache: Option<Arc<ReplyCache>>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            cache,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn cache(&self) -> Option<&Arc<ReplyCache>> {
        self.cache.as_ref()
    }

    /// Await the next inbound datagram.
    ///
    /// Cache hits are replayed to the sender immediately and the loop keeps
    /// waiting; only a non-duplicate datagram yields a socket. The returned
    /// socket shares this listener's UDP descriptor and cache handle, so its
    /// flush both transmits and (when enabled) populates the cache.
    pub async fn accept(&self) -> Result<DatagramSocket> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (n, peer) = self.socket.recv_from(&mut buf).await?;
            let payload = Bytes::copy_from_slice(&buf[..n]);

            if let Some(cache) = &self.cache {
                if let Some(reply) = cache.get(peer, &payload) {
                    debug!(%peer, "replaying cached reply for retransmitted request");
                    self.socket.send_to(&reply, peer).await?;
                    continue;
                }
            }

            return Ok(DatagramSocket::new(
                self.socket.clone(),
                peer,
                payload,
                self.cache.clone(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_yields_socket_with_payload() {
        let listener = RpcListener::bind("127.0.0.1:0", None).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"\x00\x00\x00\x01", addr).await.unwrap();

        let sock = listener.accept().await.unwrap();
        assert_eq!(sock.peer(), client.local_addr().unwrap());
        assert_eq!(&sock.raw_request()[..], b"\x00\x00\x00\x01");
    }

    #[tokio::test]
    async fn test_cache_hit_replays_without_yielding_socket() {
        let cache = Arc::new(ReplyCache::new());
        let listener = RpcListener::bind("127.0.0.1:0", Some(cache.clone()))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = client.local_addr().unwrap();

        // Seed the cache as if "req" had already been answered.
        cache.put(peer, b"req", Bytes::from_static(b"cached-reply"));

        client.send_to(b"req", addr).await.unwrap();
        // A second, distinct datagram proves accept looped past the hit.
        client.send_to(b"fresh", addr).await.unwrap();

        let sock = listener.accept().await.unwrap();
        assert_eq!(&sock.raw_request()[..], b"fresh");

        let mut buf = [0u8; 64];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"cached-reply");
    }
}
