//! Checks for a single library directory inside a package.

use crate::Config;
use crate::report::Problem;
use parcel_archive::Archive;
use parcel_model::LibraryMetadata;
use parcel_model::lang::is_language_file;
use parcel_model::library::{LANGUAGE_DIRECTORY, LIBRARY_DESCRIPTOR, SEMANTICS_FILE};
use parcel_model::name::LibraryName;
use std::io::{Read, Seek};

/// A library directory that passed every check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedLibrary {
    /// Top-level directory holding the library inside the package.
    pub directory: String,
    pub metadata: LibraryMetadata,
}

fn read<R: Read + Seek>(
    archive: &mut Archive<R>,
    directory: &str,
    file: &str,
    limit: u64,
) -> Result<Option<Vec<u8>>, Problem> {
    let name = format!("{directory}/{file}");
    archive.read(&name, limit).map_err(|_| Problem::CorruptFile { file: name })
}

/// Validate one library directory. `files` are paths relative to it.
///
/// Problems are isolated to this library: a broken descriptor stops the
/// checks that need it, but never affects other libraries.
pub(crate) fn validate_library<R: Read + Seek>(
    archive: &mut Archive<R>,
    directory: &str,
    files: &[&str],
    config: &Config,
) -> (Vec<Problem>, Option<ValidatedLibrary>) {
    let mut problems = Vec::new();
    let library = directory.to_string();
    let limit = config.max_file_size;

    if !LibraryName::is_valid_machine_name(directory) {
        problems.push(Problem::InvalidLibraryName { directory: library });
        return (problems, None);
    }

    if files.contains(&SEMANTICS_FILE) {
        match read(archive, directory, SEMANTICS_FILE, limit) {
            Ok(Some(data)) => {
                if let Err(err) = parcel_model::schema::parse_value(&data) {
                    problems.push(Problem::InvalidSemantics { library: library.clone(), reason: (*err).to_string() });
                }
            },
            Ok(None) => {},
            Err(problem) => problems.push(problem),
        }
    }

    let metadata = match read(archive, directory, LIBRARY_DESCRIPTOR, limit) {
        Ok(Some(data)) => match LibraryMetadata::from_json(&data) {
            Ok(metadata) => metadata,
            Err(err) => {
                problems.push(Problem::InvalidDescriptor { library, reason: (*err).to_string() });
                return (problems, None);
            },
        },
        Ok(None) => {
            problems.push(Problem::MissingDescriptor { library });
            return (problems, None);
        },
        Err(problem) => {
            problems.push(problem);
            return (problems, None);
        },
    };

    if let Some(required) = metadata.required_api()
        && !required.is_supported_by(&config.core_api)
    {
        problems.push(Problem::UnsupportedApiVersion { library, required, supported: config.core_api });
        return (problems, None);
    }

    let name = metadata.name();
    if !name.matches_directory(directory) {
        problems.push(Problem::DirectoryNameMismatch { directory: library.clone(), expected: name.ubername() });
    }

    for file in metadata.preloaded_files() {
        if !files.contains(&file) {
            problems.push(Problem::MissingFile { library: library.clone(), file: file.to_string() });
        }
    }

    let language_prefix = format!("{LANGUAGE_DIRECTORY}/");
    for file in files.iter().filter(|file| file.starts_with(&language_prefix)) {
        let file_name = &file[language_prefix.len()..];
        let valid = is_language_file(file_name)
            && matches!(
                read(archive, directory, file, limit),
                Ok(Some(data)) if parcel_model::schema::parse_value(&data).is_ok()
            );
        if !valid {
            problems.push(Problem::InvalidLanguageFile { library: library.clone(), file: file.to_string() });
        }
    }

    (problems, Some(ValidatedLibrary { directory: library, metadata }))
}
