//! # plughost-rpc
//!
//! Wire protocol layer for the plugin host: JSON-RPC frame model, the
//! outstanding-request correlation table, the single WebSocket transport,
//! and the outbound RPC client plugins call the app through.

pub mod client;
pub mod correlation;
pub mod frame;
pub mod transport;

pub use client::RpcClient;
pub use correlation::CorrelationTable;
pub use frame::{Frame, FrameKind, RpcError};
pub use transport::{OutboundSender, Transport};
