use regex::Regex;
use std::sync::LazyLock;

/// Characters allowed in a machine name (and therefore a library directory).
const MACHINE_NAME: &str = r"[A-Za-z0-9_.\-]{1,255}";
const VERSION_NUMBER: &str = r"(0|[1-9][0-9]{0,8})";

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(MACHINE_NAME_REGEX, format!(r"^{MACHINE_NAME}$").as_str());
regex!(UBERNAME_HYPHEN_REGEX, format!(r"^({MACHINE_NAME})-{VERSION_NUMBER}\.{VERSION_NUMBER}$").as_str());
regex!(UBERNAME_WHITESPACE_REGEX, format!(r"^({MACHINE_NAME}) {VERSION_NUMBER}\.{VERSION_NUMBER}$").as_str());
regex!(
    FULL_VERSION_REGEX,
    format!(r"^({MACHINE_NAME})-{VERSION_NUMBER}\.{VERSION_NUMBER}\.{VERSION_NUMBER}$").as_str()
);
// Language files: `en.json`, `pt-br.json`, `de-formal.json`, ...
regex!(LANGUAGE_FILE_REGEX, r"^(-?[a-z]+){1,7}\.json$");
regex!(LANGUAGE_CODE_REGEX, r"^[-a-zA-Z]{1,10}$");
regex!(FILE_PATH_REGEX, r"^[^\x00]{1,255}$");

/// Upper bound on any single version component accepted in a descriptor.
pub(crate) const MAX_VERSION_NUMBER: u32 = 99_999;
/// Upper bound on free-text fields such as titles.
pub(crate) const MAX_TITLE_LENGTH: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert!(MACHINE_NAME_REGEX.is_match("H5P.Foo_bar-baz"));
        assert!(!MACHINE_NAME_REGEX.is_match("H5P Foo"));
        assert!(UBERNAME_HYPHEN_REGEX.is_match("H5P.Foo-1.0"));
        assert!(UBERNAME_WHITESPACE_REGEX.is_match("H5P.Foo 1.0"));
        assert!(FULL_VERSION_REGEX.is_match("H5P.Foo-1.0.3"));
        assert!(LANGUAGE_FILE_REGEX.is_match("pt-br.json"));
        assert!(LANGUAGE_CODE_REGEX.is_match("de-formal"));
        assert!(FILE_PATH_REGEX.is_match("scripts/main.js"));
    }

    #[test]
    fn test_machine_name_is_ascii() {
        assert!(!MACHINE_NAME_REGEX.is_match("H5P.Fö"));
    }
}
