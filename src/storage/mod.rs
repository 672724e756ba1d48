//! Blob storage backends.
//!
//! The [`backend::BlobBackend`] trait abstracts over where image bytes
//! physically live.  Implementations: Azure Blob Storage and an
//! in-process memory store.

pub mod azure;
pub mod backend;
pub mod memory;
