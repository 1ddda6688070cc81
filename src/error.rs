use std::fmt;
use std::ops::Range;

/// All errors produced while parsing node sources or composing shaders.
#[derive(Debug)]
pub struct ShaderError {
    pub kind: ErrorKind,
    /// Asset path of the file being processed, when known.
    pub path: Option<String>,
    /// 1-based line of the offending token.
    pub line: Option<u32>,
    pub span: Option<Range<usize>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A required token search ran off the end of the buffer.
    #[error("unexpected EOF, expected {expected}")]
    UnexpectedEof { expected: String },
    /// Malformed directive or declaration.
    #[error("expected {expected}, got {got}")]
    UnexpectedToken { expected: String, got: String },
    /// `uniform`/`varying`/`attribute` inside a method body.
    #[error("field declaration '{name}' inside a method body")]
    FieldInMethod { name: String },
    /// A sampler input wired to something other than a material or world
    /// parameter.
    #[error("sampler input '{input}' of node '{node}' must be bound to a uniform, got '{source_name}'")]
    SamplerBinding {
        node: String,
        input: String,
        source_name: String,
    },
    /// An asset could not be located or read.
    #[error("cannot load '{path}': {reason}")]
    Resolve { path: String, reason: String },
    #[error("circular import detected: '{path}'")]
    CircularImport { path: String },
    #[error("{0}")]
    Message(String),
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, self.line) {
            (Some(path), Some(line)) => write!(f, "{path}:{line}: ")?,
            (Some(path), None) => write!(f, "{path}: ")?,
            (None, Some(line)) => write!(f, "line {line}: ")?,
            (None, None) => {}
        }
        write!(f, "{}", self.kind)?;

        if let Some(span) = &self.span {
            write!(f, " (at byte {}..{})", span.start, span.end)?;
        }

        Ok(())
    }
}

impl std::error::Error for ShaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for ShaderError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            line: None,
            span: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShaderError>;

/// Shorthand constructors.
impl ShaderError {
    pub fn unexpected_eof(expected: &str) -> Self {
        ErrorKind::UnexpectedEof {
            expected: expected.to_string(),
        }
        .into()
    }

    pub fn unexpected_token(expected: &str, got: &str) -> Self {
        ErrorKind::UnexpectedToken {
            expected: expected.to_string(),
            got: got.to_string(),
        }
        .into()
    }

    pub fn field_in_method(name: &str) -> Self {
        ErrorKind::FieldInMethod {
            name: name.to_string(),
        }
        .into()
    }

    pub fn sampler_binding(node: &str, input: &str, source_name: &str) -> Self {
        ErrorKind::SamplerBinding {
            node: node.to_string(),
            input: input.to_string(),
            source_name: source_name.to_string(),
        }
        .into()
    }

    pub fn resolve(path: &str, reason: impl fmt::Display) -> Self {
        ErrorKind::Resolve {
            path: path.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    pub fn circular_import(path: &str) -> Self {
        ErrorKind::CircularImport {
            path: path.to_string(),
        }
        .into()
    }

    pub fn message(msg: impl Into<String>) -> Self {
        ErrorKind::Message(msg.into()).into()
    }

    /// Attach the location of the offending token.
    pub fn at(mut self, line: u32, span: Range<usize>) -> Self {
        self.line = Some(line);
        self.span = Some(span);
        self
    }

    /// Attach the file path, keeping an inner (more specific) one.
    pub fn in_file(mut self, path: &str) -> Self {
        if self.path.is_none() {
            self.path = Some(path.to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_location() {
        let err = ShaderError::unexpected_eof("#endif")
            .at(4, 30..30)
            .in_file("Common/Light.frag");
        assert_eq!(
            err.to_string(),
            "Common/Light.frag:4: unexpected EOF, expected #endif (at byte 30..30)"
        );
    }

    #[test]
    fn inner_path_wins() {
        let err = ShaderError::circular_import("a.glsllib")
            .in_file("b.glsllib")
            .in_file("c.frag");
        assert_eq!(err.path.as_deref(), Some("b.glsllib"));
        assert_eq!(
            err.to_string(),
            "b.glsllib: circular import detected: 'a.glsllib'"
        );
    }

    #[test]
    fn sampler_binding_message() {
        let err = ShaderError::sampler_binding("Tex", "texture", "Global_color");
        assert!(err.to_string().contains("sampler input 'texture' of node 'Tex'"));
    }
}
