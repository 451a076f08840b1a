//! Domain model shared by every parcel crate: library identity and versions,
//! library descriptors, content manifests and hub catalog entries.

mod compare;
mod consts;
pub mod error;
pub mod hub;
pub mod lang;
pub mod library;
pub mod manifest;
pub mod name;
pub mod schema;
pub mod user;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::hub::{HubCatalog, HubContentType};
pub use crate::library::{AdditionalMetadata, InstalledLibrary, LibraryMetadata};
pub use crate::manifest::ContentManifest;
pub use crate::name::{ApiVersion, LibraryName, LibraryVersion, UbernameForm};
pub use crate::user::User;
