//! Line-delimited JSON-RPC relay between a stdio client and a
//! streamable-HTTP server.
//!
//! A host speaks JSON-RPC over this process's stdin/stdout, one message per
//! line. Each inbound line is forwarded as an HTTP POST to a fixed endpoint
//! and the response body is written back as one line. Every line in produces
//! exactly one line out: decode and forwarding failures are converted into
//! protocol error envelopes instead of escaping to the transport. Every
//! message that crosses the relay is recorded in a durable audit log.

pub mod cli;
pub mod diagnostics;
pub mod error;
pub mod jsonrpc;
pub mod lifecycle;
pub mod logfile;
pub mod relay;
