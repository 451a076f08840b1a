//! Importing packages into storage and exporting stored content as packages.

pub mod error;
mod export;
mod import;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::export::{AllowAll, ExportSummary, PackageExporter, PermissionChecker};
pub use crate::import::{ImportOptions, ImportReport, PackageImporter};
