//! Border checks shared by descriptors and manifests.
//!
//! Documents are parsed in two steps: first as untyped JSON (a syntax error is
//! reported as [`ErrorKind::InvalidJson`]), then into the typed structure, and
//! finally checked field by field. Every failure after the syntax check is a
//! [`ErrorKind::Schema`] carrying the JSON path of the offending field.

use crate::consts::{FILE_PATH_REGEX, MAX_TITLE_LENGTH, MAX_VERSION_NUMBER};
use crate::error::{ErrorKind, Result};
use crate::name::LibraryName;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;
use std::path::{Component, Path};

/// Parse `bytes` as a JSON object and deserialize it into `T`.
pub(crate) fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ErrorKind::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        exn::bail!(ErrorKind::schema("$", "expected an object"));
    }
    Ok(serde_json::from_value(value).map_err(|e| ErrorKind::schema("$", e.to_string()))?)
}

/// Parse `bytes` as any JSON value; used for parameters, semantics and
/// language files whose structure is opaque here.
pub fn parse_value(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes).map_err(|e| ErrorKind::InvalidJson(e.to_string()))?)
}

pub(crate) fn check_title(path: &str, title: &str) -> Result<()> {
    if title.trim().is_empty() {
        exn::bail!(ErrorKind::schema(path, "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        exn::bail!(ErrorKind::schema(path, format!("must be at most {MAX_TITLE_LENGTH} characters")));
    }
    Ok(())
}

pub(crate) fn check_machine_name(path: &str, machine_name: &str) -> Result<()> {
    if !LibraryName::is_valid_machine_name(machine_name) {
        exn::bail!(ErrorKind::schema(path, format!("`{machine_name}` is not a valid machine name")));
    }
    Ok(())
}

pub(crate) fn check_version_number(path: &str, number: u32) -> Result<()> {
    if number > MAX_VERSION_NUMBER {
        exn::bail!(ErrorKind::schema(path, format!("must be at most {MAX_VERSION_NUMBER}")));
    }
    Ok(())
}

pub(crate) fn check_dependencies(path: &str, dependencies: &[LibraryName]) -> Result<()> {
    for (i, dependency) in dependencies.iter().enumerate() {
        check_machine_name(&format!("{path}[{i}].machineName"), &dependency.machine_name)?;
        check_version_number(&format!("{path}[{i}].majorVersion"), dependency.major_version)?;
        check_version_number(&format!("{path}[{i}].minorVersion"), dependency.minor_version)?;
    }
    Ok(())
}

/// File references must be relative paths that stay inside the library.
pub(crate) fn check_file_path(path: &str, file: &str) -> Result<()> {
    if !FILE_PATH_REGEX.is_match(file) {
        exn::bail!(ErrorKind::schema(path, "must be a non-empty path of at most 255 characters"));
    }
    let escapes = Path::new(file)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        exn::bail!(ErrorKind::schema(path, format!("`{file}` must be a relative path inside the library")));
    }
    Ok(())
}

pub(crate) fn check_embed_types(path: &str, embed_types: &[String]) -> Result<()> {
    for (i, embed_type) in embed_types.iter().enumerate() {
        if embed_type != "div" && embed_type != "iframe" {
            exn::bail!(ErrorKind::schema(format!("{path}[{i}]"), format!("`{embed_type}` is not one of: div, iframe")));
        }
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u64),
}

/// Descriptors written by hand use `0`/`1`; accept booleans too.
pub(crate) fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(n) => Err(D::Error::custom(format!("expected 0 or 1, found {n}"))),
    }
}

pub(crate) fn optional_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<bool>, D::Error> {
    flag(deserializer).map(Some)
}

pub(crate) fn flag_as_int<S: Serializer>(value: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

pub(crate) fn optional_flag_as_int<S: Serializer>(
    value: &Option<bool>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => flag_as_int(v, serializer),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("scripts/main.js", true)]
    #[case("main.js", true)]
    #[case("", false)]
    #[case("../escape.js", false)]
    #[case("/absolute.js", false)]
    #[case("a/../../b.js", false)]
    fn test_check_file_path(#[case] file: &str, #[case] ok: bool) {
        assert_eq!(check_file_path("$.preloadedJs[0].path", file).is_ok(), ok);
    }

    #[test]
    fn test_parse_distinguishes_syntax_from_schema() {
        #[derive(Debug, Deserialize)]
        struct Doc {
            #[allow(dead_code)]
            title: String,
        }
        let err = parse::<Doc>(b"{not json").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidJson(_)));
        let err = parse::<Doc>(b"[]").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Schema { .. }));
        let err = parse::<Doc>(br#"{"name": "x"}"#).unwrap_err();
        match &*err {
            ErrorKind::Schema { reason, .. } => assert!(reason.contains("title")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
