//! Installed libraries: installing directories, patch upgrades, deletion,
//! upgrade checks against the hub catalog, dependency closures and asset
//! listing.

mod assets;
pub mod error;
mod install;
mod manager;
mod resolve;

pub use crate::assets::Assets;
pub use crate::install::{Install, InstallReport, MAX_INSTALL_CONCURRENCY, read_descriptor};
pub use crate::manager::{LibraryManager, Upgrade};
pub use crate::resolve::DependencyGraph;
