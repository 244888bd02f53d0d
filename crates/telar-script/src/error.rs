//! Script loading and parse errors.

use telar_core::BuildError;

/// Why a patch script failed to load.
///
/// Parse errors carry the 1-based line they were found on. A failed load
/// is recoverable: the engine keeps running with zero voices and a new
/// script can be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),

    /// A line did not match any statement form.
    #[error("line {line}: malformed statement `{text}`")]
    MalformedLine {
        /// 1-based source line.
        line: usize,
        /// The offending text.
        text: String,
    },

    /// An operation name is not part of the builder surface.
    #[error("line {line}: unknown operation `{op}`")]
    UnknownOp {
        /// 1-based source line.
        line: usize,
        /// The unrecognized operation.
        op: String,
    },

    /// A required argument was not supplied.
    #[error("line {line}: `{op}` is missing argument `{key}`")]
    MissingArg {
        /// 1-based source line.
        line: usize,
        /// Operation the argument belongs to.
        op: &'static str,
        /// Missing argument key.
        key: &'static str,
    },

    /// An argument value has the wrong form (number vs name vs payload).
    #[error("line {line}: argument `{key}` expects {expected}, got `{got}`")]
    BadArg {
        /// 1-based source line.
        line: usize,
        /// Argument key.
        key: String,
        /// What the operation expects.
        expected: &'static str,
        /// The value found.
        got: String,
    },

    /// A name was used before any `let` bound it.
    #[error("line {line}: unbound name `{name}`")]
    UnboundName {
        /// 1-based source line.
        line: usize,
        /// The unresolved name.
        name: String,
    },

    /// A bound name refers to the wrong kind of object for this argument.
    #[error("line {line}: `{name}` is a {actual}, expected a {expected}")]
    WrongKind {
        /// 1-based source line.
        line: usize,
        /// The misused name.
        name: String,
        /// Kind the argument requires.
        expected: &'static str,
        /// Kind the name is bound to.
        actual: &'static str,
    },

    /// The graph build failed after a successful parse.
    #[error("graph build failed: {0}")]
    Build(#[from] BuildError),
}
