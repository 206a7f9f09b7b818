//! Core contracts for Strata.
//!
//! Three pieces live here:
//!
//! - [`response`]: the normalizer turning any backend/exception shape into
//!   the uniform [`Response`]/[`ErrorInfo`] pair every caller sees;
//! - [`spec`]: the explicit [`QuerySpec`] value a chain accumulates;
//! - [`query`]: the fluent [`Query`] builder, the [`QueryBackend`] seam
//!   backends implement, and the [`Datastore`] entry point.

pub mod query;
pub mod response;
pub mod spec;

pub use query::{Datastore, Query, QueryBackend};
pub use response::{fail, normalize, ok, ErrorCode, ErrorInfo, RawError, Response};
pub use spec::{
    Filter, FilterOp, OpKind, Operation, OrderKey, QuerySpec, Row, SelectItem, Selection,
};

pub mod prelude {
    //! Re-exports of the most commonly used core types.
    pub use crate::query::{Datastore, Query, QueryBackend};
    pub use crate::response::{fail, ok, ErrorCode, ErrorInfo, Response};
    pub use crate::spec::{FilterOp, QuerySpec, Row};
}
