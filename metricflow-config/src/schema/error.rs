//! Validation failures and their report format

use std::fmt;

/// One segment of the path leading to a failing value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Path from the document root to a value
pub type Path = Vec<PathSegment>;

/// Category of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidKind {
    /// A required key is missing
    RequiredKey,
    /// A key the schema does not know
    ExtraKey,
    /// The value has the wrong type
    InvalidType,
    /// The value has the right type but is not acceptable
    InvalidValue,
    /// Environment expansion did not settle
    EnvDepth,
    /// The referenced module type is not registered
    UnknownModule,
}

impl fmt::Display for InvalidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvalidKind::RequiredKey => "RequiredKeyInvalid",
            InvalidKind::ExtraKey => "ExtraKeyInvalid",
            InvalidKind::InvalidType => "TypeInvalid",
            InvalidKind::InvalidValue => "ValueInvalid",
            InvalidKind::EnvDepth => "EnvDepthInvalid",
            InvalidKind::UnknownModule => "UnknownModuleInvalid",
        };
        f.write_str(name)
    }
}

/// A single failing value
#[derive(Debug, Clone, PartialEq)]
pub struct Invalid {
    pub path: Path,
    pub kind: InvalidKind,
    pub message: String,
}

impl Invalid {
    pub fn new(path: &[PathSegment], kind: InvalidKind, message: impl Into<String>) -> Self {
        Self {
            path: path.to_vec(),
            kind,
            message: message.into(),
        }
    }

    /// Render the path as `[<>][p1][p2] > key`
    pub fn field(&self) -> String {
        let Some((key, parents)) = self.path.split_last() else {
            return "No error path found!".to_string();
        };
        let mut field = String::from("[<>]");
        for segment in parents {
            field.push_str(&format!("[{segment}]"));
        }
        field.push_str(&format!(" > {key}"));
        field
    }
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = format!("[{}] ", self.kind);
        let message = if self.message.ends_with(['.', '!', '?']) {
            self.message.clone()
        } else {
            format!("{}.", self.message)
        };
        writeln!(f, "{class:-<25}+> Field: {}", self.field())?;
        write!(f, "{:<25}`> Error: {message}", "")
    }
}

/// All failures collected while validating a document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationErrors {
    errors: Vec<Invalid>,
}

impl ValidationErrors {
    pub fn single(invalid: Invalid) -> Self {
        Self {
            errors: vec![invalid],
        }
    }

    pub fn push(&mut self, invalid: Invalid) {
        self.errors.push(invalid);
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Invalid] {
        &self.errors
    }

    /// Length of the deepest failing path
    pub fn depth(&self) -> usize {
        self.errors.iter().map(|e| e.path.len()).max().unwrap_or(0)
    }

    /// Find the first failure of a kind
    pub fn find(&self, kind: InvalidKind) -> Option<&Invalid> {
        self.errors.iter().find(|e| e.kind == kind)
    }

    /// Prefix every failing path, used when a nested document is validated on its own
    pub fn prefixed(mut self, prefix: &[PathSegment]) -> Self {
        for error in &mut self.errors {
            let mut path = prefix.to_vec();
            path.append(&mut error.path);
            error.path = path;
        }
        self
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_rendering() {
        let invalid = Invalid::new(
            &["sources".into(), 0.into(), "conection".into()],
            InvalidKind::ExtraKey,
            "extra keys not allowed",
        );
        assert_eq!(invalid.field(), "[<>][sources][0] > conection");

        let report = invalid.to_string();
        assert!(report.starts_with("[ExtraKeyInvalid] "));
        assert!(report.contains("Error: extra keys not allowed."));
    }

    #[test]
    fn test_prefixed_and_depth() {
        let errors = ValidationErrors::single(Invalid::new(
            &["name".into()],
            InvalidKind::RequiredKey,
            "required key not provided",
        ))
        .prefixed(&["tasks".into(), 2.into()]);

        assert_eq!(errors.depth(), 3);
        assert_eq!(errors.errors()[0].field(), "[<>][tasks][2] > name");
    }
}
