//! Library identity: machine name plus major/minor version.

use crate::consts::{FULL_VERSION_REGEX, MACHINE_NAME_REGEX, UBERNAME_HYPHEN_REGEX, UBERNAME_WHITESPACE_REGEX};
use crate::error::{Error, ErrorKind, Result};
use regex::Captures;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Which textual encodings of a [`LibraryName`] a caller is willing to accept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UbernameForm {
    /// `Foo.Bar-1.0`, the form used for directory names and cache keys.
    #[default]
    Hyphen,
    /// `Foo.Bar 1.0`, the form used inside content parameters.
    Whitespace,
    /// Either of the above.
    Either,
}

/// Immutable identity of a library, ignoring its patch level.
///
/// Two installed libraries with the same `LibraryName` occupy the same slot;
/// installing a higher patch version replaces the previous one in place.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryName {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
}
impl LibraryName {
    pub fn new(machine_name: impl Into<String>, major_version: u32, minor_version: u32) -> Self {
        Self { machine_name: machine_name.into(), major_version, minor_version }
    }

    /// Parse an ubername, failing on anything that isn't unambiguously in
    /// one of the accepted forms.
    ///
    /// ```
    /// use parcel_model::{LibraryName, UbernameForm};
    ///
    /// let name = LibraryName::parse("H5P.Foo-Bar-1.12", UbernameForm::Hyphen).unwrap();
    /// assert_eq!(name.machine_name, "H5P.Foo-Bar");
    /// assert_eq!((name.major_version, name.minor_version), (1, 12));
    /// assert!(LibraryName::parse("H5P.Foo 1.12", UbernameForm::Hyphen).is_err());
    /// assert!(LibraryName::parse("H5P.Foo 1.12", UbernameForm::Either).is_ok());
    /// ```
    pub fn parse(ubername: &str, form: UbernameForm) -> Result<Self> {
        let captures = match form {
            UbernameForm::Hyphen => UBERNAME_HYPHEN_REGEX.captures(ubername),
            UbernameForm::Whitespace => UBERNAME_WHITESPACE_REGEX.captures(ubername),
            UbernameForm::Either => UBERNAME_HYPHEN_REGEX
                .captures(ubername)
                .or_else(|| UBERNAME_WHITESPACE_REGEX.captures(ubername)),
        };
        let Some(captures) = captures else {
            exn::bail!(ErrorKind::InvalidName(ubername.to_string()));
        };
        Ok(Self {
            machine_name: captures[1].to_string(),
            major_version: number(&captures, 2, ubername)?,
            minor_version: number(&captures, 3, ubername)?,
        })
    }

    /// Parse `machineName-major.minor.patch` into a name and its patch level.
    pub fn parse_with_patch(identifier: &str) -> Result<(Self, u32)> {
        let Some(captures) = FULL_VERSION_REGEX.captures(identifier) else {
            exn::bail!(ErrorKind::InvalidName(identifier.to_string()));
        };
        let name = Self {
            machine_name: captures[1].to_string(),
            major_version: number(&captures, 2, identifier)?,
            minor_version: number(&captures, 3, identifier)?,
        };
        Ok((name, number(&captures, 4, identifier)?))
    }

    /// Hyphen-form ubername, e.g. `H5P.Example-1.2`.
    pub fn ubername(&self) -> String {
        self.to_string()
    }

    /// Whitespace-form ubername, e.g. `H5P.Example 1.2`.
    pub fn whitespace_ubername(&self) -> String {
        format!("{} {}.{}", self.machine_name, self.major_version, self.minor_version)
    }

    /// `true` when `machine_name` only uses characters allowed in directory names.
    pub fn is_valid_machine_name(machine_name: &str) -> bool {
        MACHINE_NAME_REGEX.is_match(machine_name)
    }

    /// Directory names a library with this identity may be stored under
    /// inside a package: the bare machine name, or the full hyphen ubername.
    pub fn matches_directory(&self, directory: &str) -> bool {
        directory == self.machine_name || directory == self.ubername()
    }
}
impl Display for LibraryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}-{}.{}", self.machine_name, self.major_version, self.minor_version)
    }
}
impl FromStr for LibraryName {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, UbernameForm::Hyphen)
    }
}

fn number(captures: &Captures<'_>, group: usize, input: &str) -> Result<u32> {
    captures[group].parse().map_err(|_| exn::Exn::from(ErrorKind::InvalidName(input.to_string())))
}

/// Concrete version of an installed library, used for upgrade ordering.
///
/// Field order matters: the derived [`Ord`] compares `major`, then `minor`,
/// then `patch`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}
impl LibraryVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}
impl Display for LibraryVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A `major.minor` pair, used for core API compatibility checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}
impl ApiVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// `true` when something requiring `self` can run on a host that
    /// supports `supported`.
    ///
    /// A lower major version always passes; an equal major version requires
    /// the minor version to be no higher than the supported one.
    pub fn is_supported_by(&self, supported: &ApiVersion) -> bool {
        self <= supported
    }
}
impl Display for ApiVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
