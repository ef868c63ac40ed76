//! Database models split into separate files.
//! This module re-exports individual model modules so existing imports like
//! `use crate::db::models::*;` continue to work.

pub mod dead_letter;
pub mod notification;

pub use self::dead_letter::*;
pub use self::notification::*;
