//! Test modules for the executor crate.

pub mod bulk_write;
pub mod dispatch;
pub mod entities;
