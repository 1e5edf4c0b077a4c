//! Typed sea-orm models for the tables served by the records API.
//!
//! Column names match the JSON field names exposed over HTTP, so rows map to
//! response bodies without renaming.

pub mod employees;
pub mod products;
pub mod users;
