//! Problems found in a package and their aggregate.

use derive_more::Display;
use parcel_model::ApiVersion;
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};

/// Whether the package is broken, or merely not allowed here.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Category {
    /// Bad archive, unparsable JSON, schema violation: fix the package.
    #[display("malformed")]
    Malformed,
    /// Size, extension, API version or permission limits: the package may be
    /// fine elsewhere.
    #[display("policy")]
    Policy,
}

/// One independent problem with a package.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Problem {
    #[display("`{file}` is not a .{extension} package")]
    WrongPackageExtension { file: String, extension: String },
    #[display("unable to unzip")]
    Unreadable,
    #[display("`{file}` is {size} bytes, more than the {limit} bytes allowed per file")]
    FileTooLarge { file: String, size: u64, limit: u64 },
    #[display("package contents are {size} bytes, more than the {limit} bytes allowed")]
    PackageTooLarge { size: u64, limit: u64 },
    #[display("`{file}` has a forbidden file extension")]
    ForbiddenExtension { file: String },
    #[display("missing h5p.json")]
    MissingManifest,
    #[display("invalid h5p.json: {_0}")]
    InvalidManifest(String),
    #[display("missing content/content.json")]
    MissingParameters,
    #[display("invalid content/content.json: {_0}")]
    InvalidParameters(String),
    #[display("corrupt file: {file}")]
    CorruptFile { file: String },
    #[display("`{directory}` is not a valid library directory name")]
    InvalidLibraryName { directory: String },
    #[display("{library}: missing library.json")]
    MissingDescriptor { library: String },
    #[display("{library}: invalid library.json: {reason}")]
    InvalidDescriptor { library: String, reason: String },
    #[display("{library}: invalid semantics.json: {reason}")]
    InvalidSemantics { library: String, reason: String },
    #[display("{library}: unsupported API version {required} (supported: {supported})")]
    UnsupportedApiVersion { library: String, required: ApiVersion, supported: ApiVersion },
    #[display("{directory}: directory name mismatch, expected {expected}")]
    DirectoryNameMismatch { directory: String, expected: String },
    #[display("{library}: missing file {file}")]
    MissingFile { library: String, file: String },
    #[display("{library}: invalid language file {file}")]
    InvalidLanguageFile { library: String, file: String },
    #[display("{library}: installing libraries is not permitted")]
    InstallNotPermitted { library: String },
    #[display("{library}: library is restricted")]
    Restricted { library: String },
}
impl Problem {
    pub fn category(&self) -> Category {
        match self {
            Self::WrongPackageExtension { .. }
            | Self::FileTooLarge { .. }
            | Self::PackageTooLarge { .. }
            | Self::ForbiddenExtension { .. }
            | Self::UnsupportedApiVersion { .. }
            | Self::InstallNotPermitted { .. }
            | Self::Restricted { .. } => Category::Policy,
            _ => Category::Malformed,
        }
    }
}

/// Ordered list of problems found so far.
///
/// Rules that can keep going push into it; rules that can't raise it as
/// [`ErrorKind::Invalid`](crate::error::ErrorKind::Invalid), after which the
/// list is never touched again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    problems: Vec<Problem>,
}
impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, problem: Problem) {
        tracing::debug!(category = %problem.category(), %problem, "validation problem");
        self.problems.push(problem);
    }

    pub fn has_errors(&self) -> bool {
        !self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    /// Problems of a single category, in the order they were found.
    pub fn of(&self, category: Category) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(move |problem| problem.category() == category)
    }
}
impl Extend<Problem> for ValidationErrors {
    fn extend<I: IntoIterator<Item = Problem>>(&mut self, iter: I) {
        for problem in iter {
            self.push(problem);
        }
    }
}
impl FmtDisplay for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.problems.as_slice() {
            [] => write!(f, "package is valid"),
            [only] => write!(f, "invalid package: {only}"),
            problems => {
                write!(f, "invalid package ({} problems)", problems.len())?;
                for problem in problems {
                    write!(f, "\n- [{}] {problem}", problem.category())?;
                }
                Ok(())
            },
        }
    }
}
