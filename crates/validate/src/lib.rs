//! Package validation.
//!
//! A package is untrusted until [`validate`] accepts it. Validation either
//! returns what was learned about the package, or fails with
//! [`ErrorKind::Invalid`](error::ErrorKind::Invalid) listing every
//! independent problem found before the chain stopped.

mod config;
pub mod error;
mod library;
mod report;
mod rules;

pub use crate::config::Config;
pub use crate::library::ValidatedLibrary;
pub use crate::report::{Category, Problem, ValidationErrors};
use crate::error::{ErrorKind, Result};
use crate::rules::{RULES, State};
use exn::ResultExt;
use parcel_model::ContentManifest;
use std::path::Path;
use tracing::instrument;

/// What a successful validation learned about a package.
#[derive(Clone, Debug)]
pub struct ValidatedPackage {
    pub manifest: ContentManifest,
    /// Library directories, sorted by directory name.
    pub libraries: Vec<ValidatedLibrary>,
}

/// Validate the package at `path` on a blocking thread.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn validate(path: &Path, config: &Config) -> Result<ValidatedPackage> {
    let (path, config) = (path.to_path_buf(), config.clone());
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(|| validate_blocking(&path, &config)))
        .await
        .or_raise(|| ErrorKind::Task)?
}

/// Run the whole rule chain on the current thread.
pub fn validate_blocking(path: &Path, config: &Config) -> Result<ValidatedPackage> {
    let mut state = State::new(path, config);
    let mut errors = ValidationErrors::new();
    rules::run(RULES, &mut state, &mut errors)?;
    let (manifest, libraries) = state.into_parts()?;
    tracing::debug!(libraries = libraries.len(), "package is valid");
    Ok(ValidatedPackage { manifest, libraries })
}
