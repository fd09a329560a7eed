//! # view-differ
//!
//! Refreshes a materialized database view and computes the
//! `(added, removed, modified)` triple against a twin `temp_*` table,
//! inside one transaction, then copies the view into its twin for the
//! next cycle. The set-theoretic diff itself ([`diff`]) is plain,
//! synchronous Rust so it can be property-tested without a database,
//! the same way `ip-manager` is tested against `sqlite::memory:` in
//! its own crate -- here there is no in-memory Postgres, so the pure
//! diff core is what gets the property test instead.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

mod differ;
mod pure;

pub use differ::{DiffError, RefreshResult, ViewDiffer, ViewSpec};
pub use pure::{diff, Diff};
