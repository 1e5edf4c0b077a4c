//! Record access for the tables exposed by the records API.
//!
//! Every resource shares one executor: a [`Resource`] describes the table, its
//! key and its fields, and [`RecordStore`] turns list/get/create/update/delete
//! requests into a single parameterized statement per call.

mod error;
pub mod resource;
mod statement;
mod store;
pub mod value;

pub use error::{StoreError, StoreResult};
pub use resource::{Column, ColumnKind, KeyColumn, Lookup, Messages, RESOURCES, Resource};
pub use store::{Deletion, RecordStore};

/// One row, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;
