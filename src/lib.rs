//! Silo is a portable SQL access layer: a relation aware query
//! builder, nested transactions over savepoints and a bidirectional
//! type conversion pipeline, shared by the MySQL, PostgreSQL and
//! SQLite adapter crates.

pub use silo_core::*;
