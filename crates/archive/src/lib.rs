//! Zip containers laid out as packages: a manifest, a `content/` section and
//! one directory per library.
//!
//! Reading ([`Archive`]) and writing ([`ArchiveWriter`]) are synchronous and
//! meant to be driven from a blocking thread.

mod entry;
pub mod error;
mod read;
mod write;

pub use crate::entry::{Entry, Section};
pub use crate::read::Archive;
pub use crate::write::ArchiveWriter;
