//! Client-side RPC (§4.3): `async_rpc`/`sync_rpc` over a single persistent
//! connection to one destination, demuxed by `xid` against an
//! [`OutstandingRpc`] table.
//!
//! Grounded in the original's `rpc.cpp` `Rpcc::sendRPC` plus a background
//! receive loop; `sync_rpc` is exactly "`async_rpc` whose callback resolves
//! a completion primitive" per §4.3, here a `tokio::sync::oneshot`.

use crate::frame::{pack_flags, Frame};
use dashmap::DashMap;
use gaia_core::{Error, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// A reply callback invoked once, with the reply payload (or an error if
/// the connection closed before a reply arrived). Owns its captured state;
/// `cbdata`-style C callback-plus-opaque-pointer pairs are unnecessary in
/// Rust — a `FnOnce` closure captures what it needs.
pub type ReplyCallback = Box<dyn FnOnce(Result<Vec<u8>>) + Send>;

enum Waiter {
    Callback(ReplyCallback),
    Oneshot(oneshot::Sender<Result<Vec<u8>>>),
}

/// One outstanding request, keyed by `xid` (§4.3 "records an
/// `OutstandingRPC` in a hash table keyed by xid").
struct OutstandingRpc {
    waiter: Waiter,
}

/// A client connection to one destination server.
pub struct RpcClient {
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    outstanding: Arc<DashMap<u32, OutstandingRpc>>,
    next_xid: AtomicU32,
}

impl RpcClient {
    /// Connects to `addr` and spawns the background receive-loop task that
    /// demuxes replies by `xid`.
    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        let client = Arc::new(RpcClient {
            writer: Mutex::new(BufWriter::new(write_half)),
            outstanding: Arc::new(DashMap::new()),
            next_xid: AtomicU32::new(1),
        });
        tokio::spawn(receive_loop(read_half, Arc::clone(&client.outstanding)));
        Ok(client)
    }

    /// §4.3 `async_rpc`: assigns a fresh `xid`, marshals `body` under
    /// `(handler_id, rpcno)`, writes it to the connection, and arranges for
    /// `callback` to run once the reply arrives (or the connection drops).
    /// Returns as soon as the frame is enqueued for writing.
    pub async fn async_rpc(
        self: &Arc<Self>,
        handler_id: u16,
        rpcno: u32,
        control_flags: u16,
        body: Vec<u8>,
        callback: ReplyCallback,
    ) -> Result<()> {
        let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
        self.outstanding.insert(xid, OutstandingRpc { waiter: Waiter::Callback(callback) });
        self.send_frame(handler_id, rpcno, control_flags, xid, body).await
    }

    /// §4.3 `sync_rpc`: `async_rpc` whose callback resolves a
    /// `tokio::sync::oneshot`, awaited here so the caller gets a
    /// request/response call without managing its own callback.
    pub async fn sync_rpc(self: &Arc<Self>, handler_id: u16, rpcno: u32, control_flags: u16, body: Vec<u8>) -> Result<Vec<u8>> {
        let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.outstanding.insert(xid, OutstandingRpc { waiter: Waiter::Oneshot(tx) });
        self.send_frame(handler_id, rpcno, control_flags, xid, body).await?;
        rx.await.map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection closed before reply")))?
    }

    async fn send_frame(&self, handler_id: u16, rpcno: u32, control_flags: u16, xid: u32, body: Vec<u8>) -> Result<()> {
        let frame = Frame::new(pack_flags(handler_id, control_flags), rpcno, xid, body);
        let bytes = frame.encode()?;
        let mut w = self.writer.lock().await;
        w.write_all(&bytes).await?;
        w.flush().await?;
        Ok(())
    }
}

async fn receive_loop(mut read_half: OwnedReadHalf, outstanding: Arc<DashMap<u32, OutstandingRpc>>) {
    let mut buf = Vec::new();
    loop {
        match read_one_frame(&mut read_half, &mut buf).await {
            Ok(Some(frame)) => {
                if let Some((_, entry)) = outstanding.remove(&frame.xid) {
                    match entry.waiter {
                        Waiter::Callback(cb) => cb(Ok(frame.payload)),
                        Waiter::Oneshot(tx) => {
                            let _ = tx.send(Ok(frame.payload));
                        }
                    }
                } else {
                    warn!(xid = frame.xid, "reply for unknown/already-completed xid");
                }
            }
            Ok(None) => {
                debug!("peer closed connection, failing every outstanding RPC");
                fail_all(&outstanding);
                return;
            }
            Err(e) => {
                warn!(error = %e, "connection error, failing every outstanding RPC");
                fail_all(&outstanding);
                return;
            }
        }
    }
}

fn fail_all(outstanding: &DashMap<u32, OutstandingRpc>) {
    for (_, entry) in outstanding.iter_mut().map(|mut e| (*e.key(), std::mem::replace(&mut e.waiter, Waiter::Oneshot(oneshot::channel().0)))) {
        match entry {
            Waiter::Callback(cb) => cb(Err(connection_closed())),
            Waiter::Oneshot(tx) => {
                let _ = tx.send(Err(connection_closed()));
            }
        }
    }
    outstanding.clear();
}

fn connection_closed() -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection closed"))
}

async fn read_one_frame(read_half: &mut OwnedReadHalf, buf: &mut Vec<u8>) -> Result<Option<Frame>> {
    use crate::frame::HEADER_LEN;
    buf.resize(HEADER_LEN, 0);
    if let Err(e) = read_half.read_exact(buf).await {
        return if e.kind() == std::io::ErrorKind::UnexpectedEof { Ok(None) } else { Err(e.into()) };
    }
    let header = Frame::decode_header(buf)?;
    let mut payload = vec![0u8; header.size as usize];
    read_half.read_exact(&mut payload).await?;
    Frame::decode_body(header, &payload[..]).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_LEN;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot as test_oneshot;

    #[tokio::test]
    async fn sync_rpc_round_trips_through_an_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut header_buf = vec![0u8; HEADER_LEN];
            tokio::io::AsyncReadExt::read_exact(&mut sock, &mut header_buf).await.unwrap();
            let header = Frame::decode_header(&header_buf).unwrap();
            let mut payload = vec![0u8; header.size as usize];
            tokio::io::AsyncReadExt::read_exact(&mut sock, &mut payload).await.unwrap();
            let reply = Frame::new(header.flags, header.req, header.xid, payload);
            sock.write_all(&reply.encode().unwrap()).await.unwrap();
        });

        let client = RpcClient::connect(addr).await.unwrap();
        let reply = client.sync_rpc(0, 3, 0, b"ping".to_vec()).await.unwrap();
        assert_eq!(reply, b"ping");
    }

    #[tokio::test]
    async fn dropped_connection_fails_outstanding_sync_rpc() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock); // close immediately without replying
        });
        let client = RpcClient::connect(addr).await.unwrap();
        let (done_tx, done_rx) = test_oneshot::channel();
        client
            .async_rpc(0, 3, 0, b"x".to_vec(), Box::new(move |r| { let _ = done_tx.send(r); }))
            .await
            .unwrap();
        let result = done_rx.await.unwrap();
        assert!(result.is_err());
    }
}
