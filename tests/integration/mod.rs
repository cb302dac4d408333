//! Integration tests for relation-to-struct.

pub mod postgres_test;
pub mod sqlite_test;
