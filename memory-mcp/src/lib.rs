//! Request Dispatcher: exposes `memory_core::Engine` over line-delimited
//! JSON-RPC 2.0, per `spec.md` §4.7/§6. Transport framing, per-method rate
//! limiting, and method routing/error-mapping live here; the binary entry
//! point in `src/bin/memory-mcp-server.rs` wires up storage, config, and
//! the stdio loop.

pub mod dispatcher;
pub mod jsonrpc;
pub mod maintenance;
pub mod rate_limit;

pub use dispatcher::Dispatcher;
