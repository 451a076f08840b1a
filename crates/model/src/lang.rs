//! Per-library language files (`language/{code}.json`).

use crate::consts::LANGUAGE_FILE_REGEX;
use crate::library::LANGUAGE_DIRECTORY;

/// `true` when `file_name` is a well-formed language file name, e.g. `nb.json`
/// or `pt-br.json`. `.en.json` is used by some editors as a template and is
/// accepted as well.
pub fn is_language_file(file_name: &str) -> bool {
    file_name == ".en.json" || LANGUAGE_FILE_REGEX.is_match(file_name)
}

/// Path of the language file for `language`, relative to the library directory.
pub fn language_file_path(language: &str) -> String {
    format!("{LANGUAGE_DIRECTORY}/{language}.json")
}

/// The language code encoded in a language file name.
pub fn language_code(file_name: &str) -> Option<&str> {
    is_language_file(file_name).then(|| file_name.trim_end_matches(".json").trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("en.json", Some("en"))]
    #[case("pt-br.json", Some("pt-br"))]
    #[case("de-formal.json", Some("de-formal"))]
    #[case(".en.json", Some("en"))]
    #[case("EN.json", None)]
    #[case("en.js", None)]
    #[case("en_US.json", None)]
    #[case("-.json", None)]
    fn test_language_code(#[case] file_name: &str, #[case] expected: Option<&str>) {
        assert_eq!(language_code(file_name), expected);
    }

    #[test]
    fn test_language_file_path() {
        assert_eq!(language_file_path("nb"), "language/nb.json");
    }
}
