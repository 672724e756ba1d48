//! HTTP handlers.

pub mod identity;
pub mod images;
