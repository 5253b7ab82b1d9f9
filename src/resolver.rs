use crate::ast::{Node, Program, Resolution};
use crate::error::{HyperpromptError, ResolveError};
use crate::fs::{normalize, FileSystem};
use crate::lexer::normalize_line_endings;
use crate::manifest::{sha256_hex, FileType, ManifestBuilder, ManifestEntry};
use crate::parser::Parser;
use crate::stats::StatsCollector;
use crate::utils::span_for_line;
use miette::NamedSource;
use std::path::{Path, PathBuf};

/// How resolution failures short of a circular reference are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Any sandbox violation, forbidden extension, or missing file is fatal.
    Strict,
    /// Recoverable failures are downgraded; see [`LenientFallback`].
    Lenient,
}

/// Lenient-mode policy for references that fail sandbox validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LenientFallback {
    /// Treat the literal as plain prose.
    InlineText,
    /// Mark the node forbidden so the emitter omits its payload.
    Skip,
}

/// Extensions the resolver will follow.
const MARKDOWN_EXTENSION: &str = "md";
const HYPERCODE_EXTENSION: &str = "hc";

struct FileContext {
    normalized_source: String,
    file_path: PathBuf,
}

impl FileContext {
    fn new(source: &str, file_path: &Path) -> Self {
        FileContext {
            normalized_source: normalize_line_endings(source),
            file_path: file_path.to_path_buf(),
        }
    }

    fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(
            self.file_path.display().to_string(),
            self.normalized_source.clone(),
        )
    }
}

/// Classifies node literals and loads referenced files.
///
/// Walks the tree in pre-order, assigning each node's resolution exactly
/// once. Hypercode references are compiled recursively; the chain of files
/// currently being resolved is kept as an explicit stack of canonical paths
/// for cycle detection, so the same resolver is safe to reuse across
/// independent root compilations.
pub struct Resolver<'a> {
    fs: &'a dyn FileSystem,
    root_path: PathBuf,
    mode: ResolutionMode,
    fallback: LenientFallback,
    resolving_stack: Vec<PathBuf>,
    pub ledger: ManifestBuilder,
    pub stats: StatsCollector,
}

impl<'a> Resolver<'a> {
    pub fn new(fs: &'a dyn FileSystem, root_path: impl AsRef<Path>, mode: ResolutionMode) -> Self {
        Self::with_fallback(fs, root_path, mode, LenientFallback::InlineText)
    }

    pub fn with_fallback(
        fs: &'a dyn FileSystem,
        root_path: impl AsRef<Path>,
        mode: ResolutionMode,
        fallback: LenientFallback,
    ) -> Self {
        let root = root_path.as_ref();
        // Canonicalize the root so containment checks and ledger-relative
        // paths agree with canonical file paths even through symlinks.
        let root_path = fs.canonicalize(root).unwrap_or_else(|_| normalize(root));
        Resolver {
            fs,
            root_path,
            mode,
            fallback,
            resolving_stack: Vec::new(),
            ledger: ManifestBuilder::new(),
            stats: StatsCollector::new(),
        }
    }

    /// Resolve every node in the program, recording the program's own file
    /// in the ledger and on the cycle-detection chain.
    pub fn resolve(&mut self, program: &mut Program, source: &str) -> Result<(), HyperpromptError> {
        let canonical = self.canonical_path(&program.file_path);
        self.record_file(&canonical, source, FileType::Hypercode);

        let ctx = FileContext::new(source, &program.file_path);
        self.resolving_stack.push(canonical);
        let result = self.resolve_node(&mut program.root, &ctx);
        self.resolving_stack.pop();
        result?;

        self.stats.update_max_depth(program.root.max_depth());
        Ok(())
    }

    fn resolve_node(&mut self, node: &mut Node, ctx: &FileContext) -> Result<(), HyperpromptError> {
        let resolution = self.classify(node, ctx)?;
        node.resolution = Some(resolution);

        for child in &mut node.children {
            self.resolve_node(child, ctx)?;
        }
        Ok(())
    }

    fn classify(&mut self, node: &Node, ctx: &FileContext) -> Result<Resolution, HyperpromptError> {
        let literal = node.literal.trim();

        if !looks_like_reference(literal) {
            return Ok(Resolution::InlineText);
        }

        let extension = file_extension(literal);

        if contains_traversal(literal) {
            return self.sandbox_failure(
                ResolveError::PathTraversal {
                    src: ctx.named_source(),
                    span: span_for_line(&ctx.normalized_source, node.location.line),
                    path: literal.to_string(),
                    location: node.location.clone(),
                },
                extension,
            );
        }

        let extension = match extension {
            Some(ext) => ext,
            // A slash without an extension is not a loadable reference.
            None => return Ok(Resolution::InlineText),
        };

        let full_path = self.full_path(literal);
        if !full_path.starts_with(&self.root_path) {
            return self.sandbox_failure(
                ResolveError::OutsideRoot {
                    src: ctx.named_source(),
                    span: span_for_line(&ctx.normalized_source, node.location.line),
                    path: full_path.display().to_string(),
                    root: self.root_path.display().to_string(),
                    location: node.location.clone(),
                },
                Some(extension.clone()),
            );
        }

        match extension.as_str() {
            MARKDOWN_EXTENSION => self.resolve_markdown(literal, &full_path, node, ctx),
            HYPERCODE_EXTENSION => self.resolve_hypercode(literal, &full_path, node, ctx),
            _ => {
                let error = ResolveError::ForbiddenExtension {
                    src: ctx.named_source(),
                    span: span_for_line(&ctx.normalized_source, node.location.line),
                    path: literal.to_string(),
                    extension: extension.clone(),
                    location: node.location.clone(),
                };
                match self.mode {
                    ResolutionMode::Strict => Err(error.into()),
                    ResolutionMode::Lenient => {
                        log::warn!("skipping forbidden reference at {}: {error}", node.location);
                        Ok(Resolution::Forbidden { extension })
                    }
                }
            }
        }
    }

    fn resolve_markdown(
        &mut self,
        literal: &str,
        full_path: &Path,
        node: &Node,
        ctx: &FileContext,
    ) -> Result<Resolution, HyperpromptError> {
        if !self.fs.exists(full_path) {
            return self.missing_file(literal, node, ctx);
        }

        let content = match self.fs.read_to_string(full_path) {
            Ok(content) => content,
            Err(error) => {
                return self.read_failure(literal, &error.to_string(), node, ctx);
            }
        };

        let canonical = self.canonical_path(full_path);
        self.record_file(&canonical, &content, FileType::Markdown);

        Ok(Resolution::MarkdownFile {
            path: literal.to_string(),
            content,
        })
    }

    fn resolve_hypercode(
        &mut self,
        literal: &str,
        full_path: &Path,
        node: &Node,
        ctx: &FileContext,
    ) -> Result<Resolution, HyperpromptError> {
        if !self.fs.exists(full_path) {
            return self.missing_file(literal, node, ctx);
        }

        let canonical = self.canonical_path(full_path);

        // Cycle detection runs against the active chain only, never a global
        // visited set: the same file may appear in unrelated branches.
        if self.resolving_stack.contains(&canonical) {
            let cycle = self.cycle_description(&canonical);
            return Err(ResolveError::CircularReference {
                src: ctx.named_source(),
                span: span_for_line(&ctx.normalized_source, node.location.line),
                cycle,
                location: node.location.clone(),
            }
            .into());
        }

        let content = match self.fs.read_to_string(full_path) {
            Ok(content) => content,
            Err(error) => {
                return self.read_failure(literal, &error.to_string(), node, ctx);
            }
        };

        self.record_file(&canonical, &content, FileType::Hypercode);

        let mut subtree = Parser::new(&content, full_path).parse()?;
        let child_ctx = FileContext::new(&content, full_path);

        self.resolving_stack.push(canonical);
        let result = self.resolve_node(&mut subtree.root, &child_ctx);
        self.resolving_stack.pop();
        result?;

        Ok(Resolution::HypercodeFile {
            path: literal.to_string(),
            subtree: Box::new(subtree.root),
        })
    }

    // MARK: failure policies

    fn sandbox_failure(
        &self,
        error: ResolveError,
        extension: Option<String>,
    ) -> Result<Resolution, HyperpromptError> {
        match self.mode {
            ResolutionMode::Strict => Err(error.into()),
            ResolutionMode::Lenient => {
                log::warn!("downgrading sandbox violation: {error}");
                match self.fallback {
                    LenientFallback::InlineText => Ok(Resolution::InlineText),
                    LenientFallback::Skip => Ok(Resolution::Forbidden {
                        extension: extension.unwrap_or_default(),
                    }),
                }
            }
        }
    }

    fn missing_file(
        &self,
        literal: &str,
        node: &Node,
        ctx: &FileContext,
    ) -> Result<Resolution, HyperpromptError> {
        match self.mode {
            ResolutionMode::Strict => Err(ResolveError::FileNotFound {
                src: ctx.named_source(),
                span: span_for_line(&ctx.normalized_source, node.location.line),
                path: literal.to_string(),
                location: node.location.clone(),
            }
            .into()),
            ResolutionMode::Lenient => {
                log::warn!(
                    "treating missing reference as inline text at {}: {literal}",
                    node.location
                );
                Ok(Resolution::InlineText)
            }
        }
    }

    fn read_failure(
        &self,
        literal: &str,
        reason: &str,
        node: &Node,
        ctx: &FileContext,
    ) -> Result<Resolution, HyperpromptError> {
        match self.mode {
            ResolutionMode::Strict => Err(ResolveError::ReadFailed {
                src: ctx.named_source(),
                span: span_for_line(&ctx.normalized_source, node.location.line),
                path: literal.to_string(),
                reason: reason.to_string(),
                location: node.location.clone(),
            }
            .into()),
            ResolutionMode::Lenient => {
                log::warn!("unreadable reference at {}: {reason}", node.location);
                Ok(Resolution::InlineText)
            }
        }
    }

    // MARK: path helpers

    fn full_path(&self, literal: &str) -> PathBuf {
        let path = Path::new(literal);
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root_path.join(path))
        }
    }

    /// Canonicalize through the file system when the file exists; fall back
    /// to lexical normalization so missing paths still compare predictably.
    fn canonical_path(&self, path: &Path) -> PathBuf {
        self.fs.canonicalize(path).unwrap_or_else(|_| normalize(path))
    }

    fn cycle_description(&self, offending: &Path) -> String {
        let start = self
            .resolving_stack
            .iter()
            .position(|p| p == offending)
            .unwrap_or(0);
        let mut chain: Vec<String> = self.resolving_stack[start..]
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        chain.push(offending.display().to_string());
        chain.join(" -> ")
    }

    fn record_file(&mut self, canonical: &Path, content: &str, file_type: FileType) {
        let relative = canonical
            .strip_prefix(&self.root_path)
            .unwrap_or(canonical)
            .display()
            .to_string();
        let size = content.len() as u64;
        let entry = ManifestEntry {
            path: relative,
            sha256: sha256_hex(&normalize_line_endings(content)),
            size,
            file_type,
        };
        if self.ledger.add(canonical, entry) {
            match file_type {
                FileType::Hypercode => self.stats.record_hypercode_file(canonical, size),
                FileType::Markdown => self.stats.record_markdown_file(canonical, size),
            }
        }
    }
}

/// A literal is treated as a potential reference when it contains a path
/// separator or a dot-delimited extension in its final component.
pub fn looks_like_reference(literal: &str) -> bool {
    literal.contains('/') || file_extension(literal).is_some()
}

/// Extract the extension of a path's final component, lowercased.
/// Hidden files (".gitignore") and trailing dots ("file.") have none.
pub fn file_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot + 1..].to_ascii_lowercase())
}

/// Whether any path component is the parent-directory token.
pub fn contains_traversal(path: &str) -> bool {
    path.split(['/', '\\']).any(|component| component == "..")
}
