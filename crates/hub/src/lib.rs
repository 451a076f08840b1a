//! Content-type hub support for parcel.
//!
//! [`ReqwestHubClient`] registers this installation with the hub and fetches
//! its catalog; [`ContentTypeCache`] keeps the last good catalog in key-value
//! storage and decides when it needs refreshing.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;

pub use crate::cache::ContentTypeCache;
pub use crate::client::{HubClient, Registration, ReqwestHubClient, UsageStatistics};
pub use crate::config::Config;
pub use crate::error::{Error, ErrorKind, Result};
