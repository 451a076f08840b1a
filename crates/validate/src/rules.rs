//! The rule chain.
//!
//! Each rule inspects or extends the [`State`] and either records problems
//! and returns `Ok`, or raises immediately. Rules run strictly in order, so a
//! fail-fast rule always stops everything after it.

use crate::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::library::{ValidatedLibrary, validate_library};
use crate::report::{Problem, ValidationErrors};
use exn::{OptionExt, ResultExt};
use parcel_archive::error::ErrorKind as ArchiveErrorKind;
use parcel_archive::{Archive, Entry, Section};
use parcel_model::ContentManifest;
use parcel_model::manifest::{CONTENT_DIRECTORY, MANIFEST_FILE, PARAMETERS_FILE};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub(crate) type Rule = fn(&mut State<'_>, &mut ValidationErrors) -> Result<()>;

/// The full chain, in the order it must run.
pub(crate) const RULES: &[(&str, Rule)] = &[
    ("package extension", package_extension),
    ("open archive", open_archive),
    ("size limits", size_limits),
    ("skip hidden entries", skip_ignored_entries),
    ("file extensions", file_extensions),
    ("manifest exists", manifest_exists),
    ("manifest schema", manifest_schema),
    ("parameters exist", parameters_exist),
    ("parameters json", parameters_json),
    ("checkpoint", raise_if_any),
    ("content integrity", content_integrity),
    ("libraries", libraries),
    ("result", raise_if_any),
];

/// Everything the rules learn about a package as they go.
pub(crate) struct State<'a> {
    pub(crate) path: &'a Path,
    pub(crate) config: &'a Config,
    archive: Option<Archive<BufReader<File>>>,
    pub(crate) entries: Vec<Entry>,
    pub(crate) manifest: Option<ContentManifest>,
    pub(crate) libraries: Vec<ValidatedLibrary>,
}
impl<'a> State<'a> {
    pub(crate) fn new(path: &'a Path, config: &'a Config) -> Self {
        Self { path, config, archive: None, entries: Vec::new(), manifest: None, libraries: Vec::new() }
    }

    fn archive(&mut self) -> Result<&mut Archive<BufReader<File>>> {
        self.archive.as_mut().ok_or_raise(|| ErrorKind::OutOfOrder("archive not opened"))
    }

    pub(crate) fn into_parts(self) -> Result<(ContentManifest, Vec<ValidatedLibrary>)> {
        let manifest = self.manifest.ok_or_raise(|| ErrorKind::OutOfOrder("manifest not parsed"))?;
        Ok((manifest, self.libraries))
    }
}

/// Run `rules` in order, stopping at the first one that raises.
pub(crate) fn run(rules: &[(&str, Rule)], state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    for (name, rule) in rules {
        tracing::trace!(rule = name, "running validation rule");
        rule(state, errors)?;
    }
    Ok(())
}

/// Raise the aggregate as it stands; it is never touched again.
fn raise(errors: &mut ValidationErrors) -> Error {
    ErrorKind::Invalid(std::mem::take(errors)).into()
}

fn fail_fast(errors: &mut ValidationErrors, problem: Problem) -> Error {
    errors.push(problem);
    raise(errors)
}

fn parameters_path() -> String {
    format!("{CONTENT_DIRECTORY}/{PARAMETERS_FILE}")
}

/// Read a whole entry, turning archive failures into problems.
fn read_entry(state: &mut State<'_>, name: &str) -> Result<std::result::Result<Option<Vec<u8>>, Problem>> {
    let limit = state.config.max_file_size;
    Ok(match state.archive()?.read(name, limit) {
        Ok(data) => Ok(data),
        Err(err) => match &*err {
            ArchiveErrorKind::TooLarge(file) => {
                match state.entries.iter().find(|entry| &entry.name == file).map(|entry| entry.size) {
                    Some(size) if size > limit => Err(Problem::FileTooLarge { file: file.clone(), size, limit }),
                    // Declared small but inflating past the limit.
                    _ => Err(Problem::CorruptFile { file: file.clone() }),
                }
            },
            _ => Err(Problem::CorruptFile { file: name.to_string() }),
        },
    })
}

pub(crate) fn package_extension(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let extension = &state.config.package_extension;
    let matches = state
        .path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension));
    if !matches {
        let file = state.path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
        return Err(fail_fast(errors, Problem::WrongPackageExtension { file, extension: extension.clone() }));
    }
    Ok(())
}

pub(crate) fn open_archive(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let mut archive = match Archive::open(state.path) {
        Ok(archive) => archive,
        Err(err) if matches!(&*err, ArchiveErrorKind::Unreadable) => return Err(fail_fast(errors, Problem::Unreadable)),
        Err(err) => return Err(err).or_raise(|| ErrorKind::Io),
    };
    state.entries = match archive.entries() {
        Ok(entries) => entries,
        Err(_) => return Err(fail_fast(errors, Problem::Unreadable)),
    };
    state.archive = Some(archive);
    Ok(())
}

pub(crate) fn size_limits(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let (file_limit, total_limit) = (state.config.max_file_size, state.config.max_total_size);
    let mut total = 0u64;
    for entry in &state.entries {
        total = total.saturating_add(entry.size);
        if entry.size > file_limit {
            errors.push(Problem::FileTooLarge { file: entry.name.clone(), size: entry.size, limit: file_limit });
        }
    }
    if total > total_limit {
        errors.push(Problem::PackageTooLarge { size: total, limit: total_limit });
    }
    Ok(())
}

pub(crate) fn skip_ignored_entries(state: &mut State<'_>, _errors: &mut ValidationErrors) -> Result<()> {
    let before = state.entries.len();
    state.entries.retain(|entry| !entry.is_hidden() && !entry.is_directory());
    tracing::trace!(skipped = before - state.entries.len(), "ignoring hidden and directory entries");
    Ok(())
}

pub(crate) fn file_extensions(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let config = state.config;
    for entry in &state.entries {
        let allowed = match (entry.section(), entry.extension()) {
            (Section::Manifest, _) => true,
            (_, None) => false,
            (Section::Library { .. }, Some(extension)) => config.allows_in_library(&extension),
            (_, Some(extension)) => config.allows_in_content(&extension),
        };
        if !allowed {
            errors.push(Problem::ForbiddenExtension { file: entry.name.clone() });
        }
    }
    Ok(())
}

pub(crate) fn manifest_exists(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    if !state.entries.iter().any(|entry| entry.section() == Section::Manifest) {
        return Err(fail_fast(errors, Problem::MissingManifest));
    }
    Ok(())
}

pub(crate) fn manifest_schema(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let data = match read_entry(state, MANIFEST_FILE)? {
        Ok(Some(data)) => data,
        Ok(None) => return Err(fail_fast(errors, Problem::MissingManifest)),
        Err(problem) => return Err(fail_fast(errors, problem)),
    };
    match ContentManifest::from_json(&data) {
        Ok(manifest) => state.manifest = Some(manifest),
        Err(err) => return Err(fail_fast(errors, Problem::InvalidManifest((*err).to_string()))),
    }
    Ok(())
}

pub(crate) fn parameters_exist(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let path = parameters_path();
    if !state.entries.iter().any(|entry| entry.name == path) {
        return Err(fail_fast(errors, Problem::MissingParameters));
    }
    Ok(())
}

pub(crate) fn parameters_json(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let data = match read_entry(state, &parameters_path())? {
        Ok(Some(data)) => data,
        Ok(None) => return Err(fail_fast(errors, Problem::MissingParameters)),
        Err(problem) => return Err(fail_fast(errors, problem)),
    };
    if let Err(err) = parcel_model::schema::parse_value(&data) {
        return Err(fail_fast(errors, Problem::InvalidParameters((*err).to_string())));
    }
    Ok(())
}

pub(crate) fn raise_if_any(_state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    if errors.has_errors() {
        return Err(raise(errors));
    }
    Ok(())
}

pub(crate) fn content_integrity(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let names: Vec<String> = state
        .entries
        .iter()
        .filter(|entry| matches!(entry.section(), Section::Content(_) | Section::Root(_)))
        .map(|entry| entry.name.clone())
        .collect();
    let archive = state.archive()?;
    for name in names {
        if archive.verify(&name).is_err() {
            errors.push(Problem::CorruptFile { file: name });
        }
    }
    Ok(())
}

/// Every top-level directory other than `content/` is validated as a library,
/// each on its own archive handle so they can run in parallel.
pub(crate) fn libraries(state: &mut State<'_>, errors: &mut ValidationErrors) -> Result<()> {
    let mut directories: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for entry in &state.entries {
        if let Section::Library { directory, path } = entry.section() {
            directories.entry(directory).or_default().push(path);
        }
    }
    let (path, config) = (state.path, state.config);
    let outcomes = directories
        .par_iter()
        .map(|(directory, files)| {
            let _span = tracing::debug_span!("library", directory).entered();
            let mut archive = Archive::open(path).or_raise(|| ErrorKind::Io)?;
            Ok(validate_library(&mut archive, directory, files, config))
        })
        .collect::<Result<Vec<_>>>()?;
    for (problems, library) in outcomes {
        errors.extend(problems);
        state.libraries.extend(library);
    }
    Ok(())
}
