use crate::emitter::{EmitterConfig, MarkdownEmitter};
use crate::error::{HyperpromptError, IoError};
use crate::fs::FileSystem;
use crate::manifest::{self, TimestampProvider};
use crate::parser::Parser;
use crate::resolver::{ResolutionMode, Resolver};
use crate::stats::CompilationStats;
use std::path::{Path, PathBuf};

/// Input file extension accepted by the compiler.
const HYPERCODE_EXTENSION: &str = "hc";

/// Everything the compiler needs for one run.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// The entry `.hc` file.
    pub input_path: PathBuf,
    /// Sandbox root; every reference must resolve beneath it.
    pub root_path: PathBuf,
    /// Where to write the Markdown output. `None` keeps it in memory.
    pub output_path: Option<PathBuf>,
    /// Where to write the manifest JSON. `None` keeps it in memory.
    pub manifest_path: Option<PathBuf>,
    pub mode: ResolutionMode,
    pub emitter: EmitterConfig,
}

impl CompileOptions {
    pub fn new(input_path: impl Into<PathBuf>, root_path: impl Into<PathBuf>) -> Self {
        CompileOptions {
            input_path: input_path.into(),
            root_path: root_path.into(),
            output_path: None,
            manifest_path: None,
            mode: ResolutionMode::Strict,
            emitter: EmitterConfig::default(),
        }
    }
}

/// The products of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub markdown: String,
    pub manifest_json: String,
    pub stats: CompilationStats,
}

/// Run the full pipeline and write the requested output files.
///
/// # Errors
///
/// Returns the first fatal error from any stage: path validation, lexing,
/// tree building, resolution, manifest encoding, or output writing.
pub fn compile(
    options: &CompileOptions,
    fs: &dyn FileSystem,
) -> Result<CompileOutput, HyperpromptError> {
    compile_with_timestamps(options, fs, &TimestampProvider::new(), false)
}

/// Run the full pipeline but skip the write step, leaving the file system
/// untouched.
pub fn compile_dry_run(
    options: &CompileOptions,
    fs: &dyn FileSystem,
) -> Result<CompileOutput, HyperpromptError> {
    compile_with_timestamps(options, fs, &TimestampProvider::new(), true)
}

/// Pipeline entry with an injected timestamp source, for deterministic
/// builds and tests.
pub fn compile_with_timestamps(
    options: &CompileOptions,
    fs: &dyn FileSystem,
    timestamps: &TimestampProvider,
    dry_run: bool,
) -> Result<CompileOutput, HyperpromptError> {
    validate_paths(options, fs)?;

    log::debug!("reading {}", options.input_path.display());
    let source = fs
        .read_to_string(&options.input_path)
        .map_err(|e| IoError::ReadFailed {
            path: options.input_path.display().to_string(),
            reason: e.to_string(),
        })?;

    log::debug!("parsing {}", options.input_path.display());
    let mut program = Parser::new(&source, &options.input_path).parse()?;

    log::debug!("resolving references under {}", options.root_path.display());
    let mut resolver = Resolver::new(fs, &options.root_path, options.mode);
    resolver.resolve(&mut program, &source)?;

    let markdown = MarkdownEmitter::new(options.emitter.clone()).emit(&program.root);
    resolver.stats.record_output_bytes(markdown.len() as u64);

    let timestamp = timestamps.resolve(&options.input_path, fs);
    let manifest = manifest::generate(
        resolver.ledger.into_entries(),
        env!("CARGO_PKG_VERSION"),
        &options.root_path.display().to_string(),
        &timestamp,
    );
    let manifest_json = manifest::serialize(&manifest)?;

    let stats = resolver.stats.finish();
    log::info!(
        "compiled {} ({} hypercode, {} markdown, {} bytes out)",
        options.input_path.display(),
        stats.hypercode_files,
        stats.markdown_files,
        stats.output_bytes
    );

    if !dry_run {
        if let Some(output_path) = &options.output_path {
            write_output(fs, output_path, &markdown)?;
        }
        if let Some(manifest_path) = &options.manifest_path {
            write_output(fs, manifest_path, &manifest_json)?;
        }
    }

    Ok(CompileOutput {
        markdown,
        manifest_json,
        stats,
    })
}

fn validate_paths(options: &CompileOptions, fs: &dyn FileSystem) -> Result<(), IoError> {
    if !fs.exists(&options.input_path) {
        return Err(IoError::InputNotFound {
            path: options.input_path.display().to_string(),
        });
    }
    let extension = options
        .input_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if !extension.eq_ignore_ascii_case(HYPERCODE_EXTENSION) {
        return Err(IoError::NotHypercode {
            path: options.input_path.display().to_string(),
        });
    }
    if !fs.exists(&options.root_path) {
        return Err(IoError::RootNotFound {
            path: options.root_path.display().to_string(),
        });
    }
    Ok(())
}

fn write_output(fs: &dyn FileSystem, path: &Path, contents: &str) -> Result<(), IoError> {
    log::debug!("writing {}", path.display());
    fs.write(path, contents).map_err(|e| IoError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
