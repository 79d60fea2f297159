//! Server-side RPC (§4.3, §5): a listener task accepting connections, one
//! worker owning each connection, and a dispatch table keyed by
//! `(handler_id, rpcno)` that produces the reply payload.
//!
//! Grounded in the original's `rpc.cpp` `Rpcs::listen`/per-connection
//! worker thread, and in `examples/harborgrid-justin-rusty-db`'s
//! `networking/transport/tcp.rs` for the tokio `TcpListener`/`TcpStream`
//! accept-loop shape (nodelay on accepted sockets, one task per
//! connection).

use crate::frame::{handler_id, Frame, HEADER_LEN};
use dashmap::DashMap;
use gaia_core::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// A registered RPC handler: given the raw request payload, returns the raw
/// reply payload (or an error, reported back to the caller as a non-2xx
/// style marker per §7's `is_client_status` — see `gaia-server`'s dispatch
/// wrapper for how errors are actually encoded on the wire).
pub type Handler = Arc<dyn Fn(u32, &[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// Dispatch table: one set of RPC handlers registered under a `handler_id`
/// (§4.3 "handler ids select which registered handler table serves this
/// call" — e.g. the storage-node handler table vs. the splitter handler
/// table sharing one listening port).
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: Arc<DashMap<u16, Handler>>,
}

impl HandlerTable {
    /// An empty table.
    pub fn new() -> Self {
        HandlerTable { handlers: Arc::new(DashMap::new()) }
    }

    /// Registers `handler` under `handler_id`, replacing any prior
    /// registration.
    pub fn register(&self, handler_id: u16, handler: Handler) {
        self.handlers.insert(handler_id, handler);
    }

    fn dispatch(&self, handler_id: u16, rpcno: u32, body: &[u8]) -> Result<Vec<u8>> {
        match self.handlers.get(&handler_id) {
            Some(h) => h(rpcno, body),
            None => Err(Error::Serialization(format!("no handler registered for handler_id {handler_id}"))),
        }
    }
}

/// A listening RPC server. Each accepted connection runs as its own tokio
/// task; §5's "worker pool" is tokio's own task scheduler rather than a
/// hand-managed thread pool, since the per-thread cooperative scheduler
/// (`gaia-scheduler`) models the storage engine's own task contract, not
/// socket I/O multiplexing.
pub struct RpcServer {
    listener: TcpListener,
    handlers: HandlerTable,
}

impl RpcServer {
    /// Binds `addr` and returns a server ready to [`RpcServer::serve`].
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs, handlers: HandlerTable) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(RpcServer { listener, handlers })
    }

    /// The address actually bound (useful when the caller requested an
    /// ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, spawning one task per connection.
    /// Returns only on an accept error from the underlying socket.
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            stream.set_nodelay(true).ok();
            let handlers = self.handlers.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handlers).await {
                    debug!(%peer, error = %e, "connection closed");
                }
            });
            info!(%peer, "accepted connection");
        }
    }
}

async fn handle_connection(mut stream: TcpStream, handlers: HandlerTable) -> Result<()> {
    loop {
        let mut header_buf = vec![0u8; HEADER_LEN];
        match stream.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let header = Frame::decode_header(&header_buf)?;
        let mut payload = vec![0u8; header.size as usize];
        stream.read_exact(&mut payload).await?;

        let hid = handler_id(header.flags);
        let rpcno = header.req;
        // Handlers may block waiting on a WAL completion (§4.8 Prepare); run
        // them on a blocking-pool thread so they never stall other
        // connections sharing this runtime's worker threads.
        let handlers_for_dispatch = handlers.clone();
        let dispatch_result = tokio::task::spawn_blocking(move || handlers_for_dispatch.dispatch(hid, rpcno, &payload))
            .await
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let reply_payload = match dispatch_result {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(handler_id = hid, rpcno, error = %e, "handler returned an error");
                encode_error(&e)
            }
        };
        let reply = Frame::new(header.flags, header.req, header.xid, reply_payload);
        stream.write_all(&reply.encode()?).await?;
        stream.flush().await?;
    }
}

/// Handlers that fail report the error back as a payload the client can
/// distinguish from a normal reply by its leading byte; `gaia-server`'s
/// client-facing wrapper decodes this back into an `Error` rather than
/// silently treating it as a successful reply.
fn encode_error(e: &Error) -> Vec<u8> {
    let mut out = vec![0xffu8];
    out.extend_from_slice(e.to_string().as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RpcClient;
    use crate::frame::pack_flags;

    #[tokio::test]
    async fn dispatches_to_the_registered_handler_and_replies() {
        let handlers = HandlerTable::new();
        handlers.register(7, Arc::new(|rpcno, body| {
            let mut out = body.to_vec();
            out.push(rpcno as u8);
            Ok(out)
        }));
        let server = RpcServer::bind("127.0.0.1:0", handlers).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());

        let client = RpcClient::connect(addr).await.unwrap();
        let reply = client
            .sync_rpc(7, 3, 0, b"hi".to_vec())
            .await
            .unwrap();
        assert_eq!(reply, b"hi\x03");
    }

    #[tokio::test]
    async fn unregistered_handler_id_reports_an_error_payload() {
        let handlers = HandlerTable::new();
        let server = RpcServer::bind("127.0.0.1:0", handlers).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());

        let client = RpcClient::connect(addr).await.unwrap();
        let reply = client
            .sync_rpc(99, 0, 0, vec![])
            .await
            .unwrap();
        assert_eq!(reply[0], 0xff);
    }

    #[test]
    fn pack_flags_matches_handler_dispatch() {
        let flags = pack_flags(7, 0);
        assert_eq!(handler_id(flags), 7);
    }
}
