//! Editor-facing queries. These are pure functions over an injected file
//! system; the transport that maps them onto protocol methods lives
//! outside this crate.

use crate::api::{self, CompileOptions};
use crate::error::HyperpromptError;
use crate::fs::{normalize, FileSystem};
use crate::lexer::{normalize_line_endings, split_lines, Lexer, TokenKind};
use crate::resolver::{contains_traversal, file_extension, looks_like_reference, ResolutionMode};
use crate::ast::SourceLocation;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A literal that looks like a file reference, with where it was written.
/// `columns` is the 1-based, half-open character range of the trimmed
/// literal within its line, so an editor can underline just the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpan {
    pub literal: String,
    pub location: SourceLocation,
    pub columns: std::ops::Range<usize>,
}

/// Collect every reference-looking literal in a source file, in order of
/// appearance. Lexical errors abort the scan; the editor surfaces them
/// through [`compile_for_editor`] instead.
pub fn extract_link_spans(
    source: &str,
    file_path: &Path,
) -> Result<Vec<LinkSpan>, HyperpromptError> {
    let normalized = normalize_line_endings(source);
    let tokens = Lexer::new(&normalized, file_path).lex()?;
    let lines = split_lines(&normalized);

    Ok(tokens
        .into_iter()
        .filter_map(|token| match &token.kind {
            TokenKind::Node(literal) if looks_like_reference(literal.trim()) => {
                let line = lines.get(token.location.line - 1).copied().unwrap_or("");
                Some(LinkSpan {
                    literal: literal.trim().to_string(),
                    columns: literal_columns(line, literal),
                    location: token.location,
                })
            }
            _ => None,
        })
        .collect())
}

/// 1-based column range of the trimmed literal on its source line. The
/// content starts one character past the opening quote.
fn literal_columns(line: &str, literal: &str) -> std::ops::Range<usize> {
    let quote = line.chars().take_while(|&c| c != '"').count();
    let leading = literal.chars().count() - literal.trim_start().chars().count();
    let start = quote + 2 + leading;
    start..start + literal.trim().chars().count()
}

/// Result of an editor-initiated compilation.
#[derive(Debug)]
pub struct EditorCompileResult {
    /// The compiled Markdown, absent when compilation failed.
    pub output: Option<String>,
    pub diagnostics: Vec<HyperpromptError>,
    pub has_errors: bool,
}

/// Compile an entry file for the editor. Never writes to the file system;
/// failures become diagnostics instead of an `Err`.
pub fn compile_for_editor(
    fs: &dyn FileSystem,
    entry_file: &Path,
    workspace_root: &Path,
    mode: ResolutionMode,
) -> EditorCompileResult {
    let options = CompileOptions {
        mode,
        ..CompileOptions::new(entry_file, workspace_root)
    };
    match api::compile_dry_run(&options, fs) {
        Ok(output) => EditorCompileResult {
            output: Some(output.markdown),
            diagnostics: Vec::new(),
            has_errors: false,
        },
        Err(error) => EditorCompileResult {
            output: None,
            diagnostics: vec![error],
            has_errors: true,
        },
    }
}

/// Classification of a single reference, shaped for the editor transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResolvedReference {
    /// The literal is prose, not a reference.
    InlineText,
    Markdown { path: String },
    Hypercode { path: String },
    Forbidden { extension: String },
    Invalid { reason: String },
    NotFound { path: String },
}

/// Resolve one reference literal the way the compiler would, without
/// loading or recursing into the target.
///
/// Candidate roots are the workspace root and the referencing file's own
/// directory, in that order; the first root containing the target wins.
pub fn resolve_reference(
    fs: &dyn FileSystem,
    link: &str,
    source_file: &Path,
    workspace_root: &Path,
) -> ResolvedReference {
    let trimmed = link.trim();

    if !looks_like_reference(trimmed) {
        return ResolvedReference::InlineText;
    }

    if contains_traversal(trimmed) {
        return ResolvedReference::Invalid {
            reason: format!("path traversal in reference: {trimmed}"),
        };
    }

    let extension = match file_extension(trimmed) {
        Some(extension) => extension,
        None => return ResolvedReference::InlineText,
    };

    if extension != "md" && extension != "hc" {
        return ResolvedReference::Forbidden { extension };
    }

    for root in candidate_roots(source_file, workspace_root) {
        let full = join_under(&root, trimmed);
        if !full.starts_with(&root) {
            continue;
        }
        if fs.exists(&full) {
            let path = full.display().to_string();
            return if extension == "md" {
                ResolvedReference::Markdown { path }
            } else {
                ResolvedReference::Hypercode { path }
            };
        }
    }

    ResolvedReference::NotFound {
        path: trimmed.to_string(),
    }
}

fn candidate_roots(source_file: &Path, workspace_root: &Path) -> Vec<PathBuf> {
    let mut roots = vec![normalize(workspace_root)];
    if let Some(parent) = source_file.parent() {
        if parent != Path::new("") {
            let normalized = normalize(parent);
            if !roots.contains(&normalized) {
                roots.push(normalized);
            }
        }
    }
    roots
}

fn join_under(root: &Path, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    }
}
