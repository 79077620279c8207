//! Transactional in-memory data layer for `jsonapi-atomic`.
//!
//! [`MemoryStore`] implements `DataLayer` with copy-on-begin transactions and
//! keeps inverse relationships consistent; [`MemoryView`] serves any resource
//! type on top of it.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod store;
pub mod tables;
pub mod view;

pub use store::{MemoryStore, MemoryTx};
pub use tables::{Link, Record, Tables};
pub use view::MemoryView;
