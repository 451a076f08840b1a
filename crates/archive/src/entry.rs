//! Entry classification.
//!
//! A package has exactly two kinds of top-level directory: `content/`, and
//! one directory per library. The manifest sits next to them.

use std::path::Path;

const MANIFEST: &str = "h5p.json";
const CONTENT: &str = "content";

/// Metadata about one entry in the central directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    /// Uncompressed size as declared by the central directory.
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
}
impl Entry {
    /// Hidden files (`.gitignore`, `.DS_Store`, ...) and resource forks added
    /// by archiving tools.
    pub fn is_hidden(&self) -> bool {
        self.name.split('/').any(|part| part.starts_with('.') || part == "__MACOSX")
    }

    pub fn is_directory(&self) -> bool {
        self.is_dir || self.name.ends_with('/')
    }

    /// Lower-cased extension, if the entry has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name).extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
    }

    pub fn section(&self) -> Section<'_> {
        Section::of(&self.name)
    }
}

/// Where an entry lives inside a package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section<'a> {
    /// The top-level manifest.
    Manifest,
    /// A file at the top level that isn't the manifest.
    Root(&'a str),
    /// A path inside `content/`, relative to it.
    Content(&'a str),
    /// A path inside a library directory.
    Library { directory: &'a str, path: &'a str },
}
impl<'a> Section<'a> {
    pub fn of(name: &'a str) -> Self {
        let name = name.trim_end_matches('/');
        match name.split_once('/') {
            None if name == MANIFEST => Section::Manifest,
            None if name == CONTENT => Section::Content(""),
            None => Section::Root(name),
            Some((CONTENT, path)) => Section::Content(path),
            Some((directory, path)) => Section::Library { directory, path },
        }
    }

    /// The library directory an entry belongs to, if any.
    pub fn library(&self) -> Option<&'a str> {
        match self {
            Section::Library { directory, .. } => Some(directory),
            _ => None,
        }
    }
}
