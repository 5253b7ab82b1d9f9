use crate::ast::SourceLocation;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Top-level error for the Hyperprompt compiler pipeline.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum HyperpromptError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lexer(#[from] LexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parser(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolver(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),
}

impl HyperpromptError {
    /// The source location attached to this error, when one exists.
    /// Errors spanning several locations (multiple roots) or none at all
    /// (empty input, I/O failures) return `None`.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            HyperpromptError::Lexer(e) => Some(e.location()),
            HyperpromptError::Parser(e) => e.location(),
            HyperpromptError::Resolver(e) => Some(e.location()),
            HyperpromptError::Io(_) | HyperpromptError::Manifest(_) => None,
        }
    }
}

/// Lexical errors. All fatal for the current file; no recovery.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum LexError {
    #[error("Tab character in indentation")]
    #[diagnostic(
        code(lexer::tab_in_indentation),
        help("Hypercode indentation must use spaces only, in multiples of 4.")
    )]
    TabInIndentation {
        #[source_code]
        src: NamedSource<String>,
        #[label("Tab found in this line's indentation")]
        span: SourceSpan,
        location: SourceLocation,
    },

    #[error("Misaligned indentation of {actual} spaces")]
    #[diagnostic(
        code(lexer::misaligned_indentation),
        help("Indentation width must be an exact multiple of 4 spaces.")
    )]
    MisalignedIndentation {
        #[source_code]
        src: NamedSource<String>,
        #[label("{actual} leading spaces is not a multiple of 4")]
        span: SourceSpan,
        actual: usize,
        location: SourceLocation,
    },

    #[error("Nesting depth {depth} exceeds the maximum of {max}")]
    #[diagnostic(
        code(lexer::depth_exceeded),
        help("Hypercode trees may nest at most 10 levels deep.")
    )]
    DepthExceeded {
        #[source_code]
        src: NamedSource<String>,
        #[label("This line is indented too deeply")]
        span: SourceSpan,
        depth: usize,
        max: usize,
        location: SourceLocation,
    },

    #[error("Unclosed quote")]
    #[diagnostic(
        code(lexer::unclosed_quote),
        help("Node literals must be wrapped in double quotes on a single line.")
    )]
    UnclosedQuote {
        #[source_code]
        src: NamedSource<String>,
        #[label("No closing quote on this line")]
        span: SourceSpan,
        location: SourceLocation,
    },

    #[error("Multiline literal")]
    #[diagnostic(
        code(lexer::multiline_literal),
        help("A node literal must fit on a single line.")
    )]
    MultilineLiteral {
        #[source_code]
        src: NamedSource<String>,
        #[label("Literal contains a line break")]
        span: SourceSpan,
        location: SourceLocation,
    },

    #[error("Trailing content after closing quote")]
    #[diagnostic(
        code(lexer::trailing_content),
        help("Only spaces may follow a node literal's closing quote.")
    )]
    TrailingContent {
        #[source_code]
        src: NamedSource<String>,
        #[label("Unexpected content after the closing quote")]
        span: SourceSpan,
        location: SourceLocation,
    },

    #[error("Invalid line")]
    #[diagnostic(
        code(lexer::invalid_line),
        help("A line must be blank, a # comment, or a double-quoted node literal.")
    )]
    InvalidLine {
        #[source_code]
        src: NamedSource<String>,
        #[label("This line does not start with a double quote")]
        span: SourceSpan,
        location: SourceLocation,
    },
}

impl LexError {
    pub fn location(&self) -> &SourceLocation {
        match self {
            LexError::TabInIndentation { location, .. }
            | LexError::MisalignedIndentation { location, .. }
            | LexError::DepthExceeded { location, .. }
            | LexError::UnclosedQuote { location, .. }
            | LexError::MultilineLiteral { location, .. }
            | LexError::TrailingContent { location, .. }
            | LexError::InvalidLine { location, .. } => location,
        }
    }
}

/// Structural errors from the tree builder.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParseError {
    #[error("Empty token stream")]
    #[diagnostic(
        code(parser::empty_token_stream),
        help("The file contains no node lines; a document needs exactly one root node.")
    )]
    EmptyTokenStream,

    #[error("Invalid depth jump from {from} to {to}")]
    #[diagnostic(
        code(parser::invalid_depth_jump),
        help("Depth may only increase by one level at a time.")
    )]
    InvalidDepthJump {
        #[source_code]
        src: NamedSource<String>,
        #[label("Depth jumps from {from} to {to}")]
        span: SourceSpan,
        from: i64,
        to: i64,
        location: SourceLocation,
    },

    #[error("Nesting depth {depth} exceeds the maximum of {max}")]
    #[diagnostic(
        code(parser::depth_exceeded),
        help("Hypercode trees may nest at most 10 levels deep.")
    )]
    DepthExceeded {
        #[source_code]
        src: NamedSource<String>,
        #[label("This node is nested too deeply")]
        span: SourceSpan,
        depth: usize,
        max: usize,
        location: SourceLocation,
    },

    #[error("No root node found")]
    #[diagnostic(
        code(parser::no_root),
        help("A document must contain exactly one node at depth 0.")
    )]
    NoRoot,

    #[error("Multiple root nodes: {}", .locations.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    #[diagnostic(
        code(parser::multiple_roots),
        help("A document must contain exactly one node at depth 0; nest the rest beneath it.")
    )]
    MultipleRoots {
        #[source_code]
        src: NamedSource<String>,
        #[label("Second root defined here")]
        span: SourceSpan,
        locations: Vec<SourceLocation>,
    },
}

impl ParseError {
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            ParseError::InvalidDepthJump { location, .. }
            | ParseError::DepthExceeded { location, .. } => Some(location),
            ParseError::MultipleRoots { locations, .. } => locations.first(),
            ParseError::EmptyTokenStream | ParseError::NoRoot => None,
        }
    }
}

/// Reference resolution errors. Fatal in strict mode; lenient mode recovers
/// from everything except circular references.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ResolveError {
    #[error("Path traversal in reference: {path}")]
    #[diagnostic(
        code(resolver::path_traversal),
        help("References may not contain `..` components.")
    )]
    PathTraversal {
        #[source_code]
        src: NamedSource<String>,
        #[label("This reference tries to escape the root directory")]
        span: SourceSpan,
        path: String,
        location: SourceLocation,
    },

    #[error("Reference escapes the root directory: {path}")]
    #[diagnostic(
        code(resolver::outside_root),
        help("All references must resolve to files inside the compilation root.")
    )]
    OutsideRoot {
        #[source_code]
        src: NamedSource<String>,
        #[label("Resolves outside of {root}")]
        span: SourceSpan,
        path: String,
        root: String,
        location: SourceLocation,
    },

    #[error("Forbidden extension .{extension} in reference: {path}")]
    #[diagnostic(
        code(resolver::forbidden_extension),
        help("Only .md and .hc files may be referenced.")
    )]
    ForbiddenExtension {
        #[source_code]
        src: NamedSource<String>,
        #[label("Extension .{extension} is not allowed")]
        span: SourceSpan,
        path: String,
        extension: String,
        location: SourceLocation,
    },

    #[error("Referenced file not found: {path}")]
    #[diagnostic(
        code(resolver::file_not_found),
        help("The reference must point to an existing file under the root directory.")
    )]
    FileNotFound {
        #[source_code]
        src: NamedSource<String>,
        #[label("No such file")]
        span: SourceSpan,
        path: String,
        location: SourceLocation,
    },

    #[error("Circular reference: {cycle}")]
    #[diagnostic(
        code(resolver::circular_reference),
        help("A Hypercode file may not reference itself, directly or transitively.")
    )]
    CircularReference {
        #[source_code]
        src: NamedSource<String>,
        #[label("Completing this reference would close the cycle")]
        span: SourceSpan,
        cycle: String,
        location: SourceLocation,
    },

    #[error("Failed to read referenced file {path}: {reason}")]
    #[diagnostic(code(resolver::read_failed))]
    ReadFailed {
        #[source_code]
        src: NamedSource<String>,
        #[label("Referenced here")]
        span: SourceSpan,
        path: String,
        reason: String,
        location: SourceLocation,
    },
}

impl ResolveError {
    pub fn location(&self) -> &SourceLocation {
        match self {
            ResolveError::PathTraversal { location, .. }
            | ResolveError::OutsideRoot { location, .. }
            | ResolveError::ForbiddenExtension { location, .. }
            | ResolveError::FileNotFound { location, .. }
            | ResolveError::CircularReference { location, .. }
            | ResolveError::ReadFailed { location, .. } => location,
        }
    }
}

/// I/O failures at the pipeline boundary, surfaced with path context.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum IoError {
    #[error("Input file not found: {path}")]
    #[diagnostic(code(io::input_not_found))]
    InputNotFound { path: String },

    #[error("Input file must have .hc extension: {path}")]
    #[diagnostic(code(io::not_hypercode))]
    NotHypercode { path: String },

    #[error("Root directory not found: {path}")]
    #[diagnostic(code(io::root_not_found))]
    RootNotFound { path: String },

    #[error("Failed to read {path}: {reason}")]
    #[diagnostic(code(io::read_failed))]
    ReadFailed { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    #[diagnostic(code(io::write_failed))]
    WriteFailed { path: String, reason: String },
}

/// Manifest serialization failures.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ManifestError {
    #[error("Manifest encoding error: {reason}")]
    #[diagnostic(code(manifest::encoding_failed))]
    EncodingFailed { reason: String },
}
