//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` work across the crate.

pub mod dlq;
pub mod notification;
pub mod retry_marker;

pub use self::dlq::*;
pub use self::notification::*;
pub use self::retry_marker::*;
