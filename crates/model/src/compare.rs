//! Library Orderings
//!
//! Two different orderings are used for installed libraries: one for showing
//! them to people, and one for deciding whether a library is an upgrade.

use crate::library::{InstalledLibrary, LibraryMetadata};
use std::cmp::Ordering;

impl LibraryMetadata {
    /// Display ordering: title, then major version, then minor version.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.title
            .cmp(&other.title)
            .then(self.major_version.cmp(&other.major_version))
            .then(self.minor_version.cmp(&other.minor_version))
    }

    /// `true` when `self` is a strictly higher `(major, minor, patch)` of the
    /// same machine name.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.machine_name == other.machine_name && self.version() > other.version()
    }

    /// `true` when `self` is the same `major.minor` as `other` with a higher patch.
    pub fn is_patch_of(&self, other: &Self) -> bool {
        self.name() == other.name() && self.patch_version > other.patch_version
    }
}

impl InstalledLibrary {
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.metadata.display_cmp(&other.metadata)
    }
}

#[cfg(test)]
mod tests {
    use crate::library::LibraryMetadata;
    use crate::library::tests::DESCRIPTOR;
    use rstest::rstest;
    use std::cmp::Ordering;

    fn library(title: &str, machine_name: &str, major: u32, minor: u32, patch: u32) -> LibraryMetadata {
        let mut metadata = LibraryMetadata::from_json(DESCRIPTOR.as_bytes()).unwrap();
        metadata.title = title.to_string();
        metadata.machine_name = machine_name.to_string();
        (metadata.major_version, metadata.minor_version, metadata.patch_version) = (major, minor, patch);
        metadata
    }

    #[rstest]
    #[case(library("A", "X", 9, 9, 9), library("B", "X", 1, 0, 0), Ordering::Less)]
    #[case(library("A", "X", 1, 0, 0), library("A", "Y", 2, 0, 0), Ordering::Less)]
    #[case(library("A", "X", 1, 2, 0), library("A", "X", 1, 1, 9), Ordering::Greater)]
    #[case(library("A", "X", 1, 2, 0), library("A", "Y", 1, 2, 7), Ordering::Equal)]
    fn test_display_cmp(#[case] a: LibraryMetadata, #[case] b: LibraryMetadata, #[case] expected: Ordering) {
        assert_eq!(a.display_cmp(&b), expected);
    }

    #[test]
    fn test_upgrade_ordering() {
        let installed = library("A", "Foo.Bar", 1, 0, 2);
        assert!(library("A", "Foo.Bar", 1, 0, 3).is_newer_than(&installed));
        assert!(library("A", "Foo.Bar", 1, 1, 0).is_newer_than(&installed));
        assert!(!library("A", "Foo.Bar", 1, 0, 1).is_newer_than(&installed));
        assert!(!library("A", "Foo.Baz", 2, 0, 0).is_newer_than(&installed));
        assert!(library("A", "Foo.Bar", 1, 0, 3).is_patch_of(&installed));
        assert!(!library("A", "Foo.Bar", 1, 1, 3).is_patch_of(&installed));
    }
}
