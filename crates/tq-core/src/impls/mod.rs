//! Impls - in-process implementations of the ports.
//!
//! # Included
//! - **InMemoryTaskQueue**: pull queue service for tests, demos and the CLI
//!
//! Production RPC clients (wrapping an authorized HTTP/gRPC session) live
//! outside this crate and implement `ports::TaskQueueRpc`.

pub mod inmem_service;

pub use self::inmem_service::{InMemoryTaskQueue, RpcOp};
