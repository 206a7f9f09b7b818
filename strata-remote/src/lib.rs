//! Live backend adapter for Strata.
//!
//! [`RemoteBackend`] implements the query contract by forwarding each
//! consumed [`strata_core::QuerySpec`] to an injected [`BackendClient`] and
//! normalizing the raw `{data, error}` reply. The remote protocol itself is
//! out of scope; any transport that can answer the reply shape plugs in.

pub mod adapter;
pub mod client;

pub use adapter::RemoteBackend;
pub use client::{BackendClient, BackendReply, BackendRequest};
