//! Framed RPC/datagram transport (C4, §4.3, §6.2): the wire frame codec,
//! a client with `async_rpc`/`sync_rpc`, and a server accepting
//! connections and dispatching by `(handler_id, rpcno)`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod frame;
pub mod server;

pub use client::{ReplyCallback, RpcClient};
pub use frame::{control_flags, handler_id, pack_flags, Frame, FrameHeader, COOKIE, MAX_PAYLOAD_LEN};
pub use server::{Handler, HandlerTable, RpcServer};
