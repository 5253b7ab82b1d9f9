use hyperprompt_core::api::{compile_with_timestamps, CompileOptions};
use hyperprompt_core::emitter::EmitterConfig;
use hyperprompt_core::error::{HyperpromptError, ResolveError};
use hyperprompt_core::fs::MemoryFileSystem;
use hyperprompt_core::manifest::{TimestampProvider, BUILD_TIMESTAMP_VAR};
use hyperprompt_core::resolver::ResolutionMode;
use std::collections::HashMap;
use std::path::PathBuf;

fn timestamps_at(epoch: &str) -> TimestampProvider {
    let mut env = HashMap::new();
    env.insert(BUILD_TIMESTAMP_VAR.to_string(), epoch.to_string());
    TimestampProvider::with_environment(env)
}

#[test]
fn test_cycle_error_surfaces_through_compile() {
    let fs = MemoryFileSystem::new();
    fs.insert("/ws/a.hc", "\"a\"\n    \"b.hc\"\n");
    fs.insert("/ws/b.hc", "\"b\"\n    \"a.hc\"\n");

    let options = CompileOptions::new("/ws/a.hc", "/ws");
    let err = compile_with_timestamps(&options, &fs, &timestamps_at("0"), true).unwrap_err();
    assert!(matches!(
        err,
        HyperpromptError::Resolver(ResolveError::CircularReference { .. })
    ));
}

#[test]
fn test_lenient_forbidden_reference_rendered_as_comment() {
    let fs = MemoryFileSystem::new();
    fs.insert("/ws/main.hc", "\"title\"\n    \"logo.png\"\n");
    fs.insert("/ws/logo.png", "not really an image\n");

    let mut options = CompileOptions::new("/ws/main.hc", "/ws");
    options.mode = ResolutionMode::Lenient;
    let output = compile_with_timestamps(&options, &fs, &timestamps_at("0"), true).unwrap();
    assert!(output
        .markdown
        .contains("<!-- Error: Forbidden extension .png -->"));
}

#[test]
fn test_setext_headings_in_embedded_markdown() {
    let fs = MemoryFileSystem::new();
    fs.insert("/ws/main.hc", "\"notes\"\n    \"old.md\"\n");
    fs.insert("/ws/old.md", "Legacy Title\n============\n\nSubtitle\n--------\n");

    let options = CompileOptions::new("/ws/main.hc", "/ws");
    let output = compile_with_timestamps(&options, &fs, &timestamps_at("0"), true).unwrap();

    // Setext levels 1 and 2 shift by the embed offset and convert to ATX.
    assert!(output.markdown.contains("## Legacy Title\n"), "got: {}", output.markdown);
    assert!(output.markdown.contains("### Subtitle\n"), "got: {}", output.markdown);
    assert!(!output.markdown.contains("====="));
}

#[test]
fn test_emitter_config_flows_through_options() {
    let fs = MemoryFileSystem::new();
    fs.insert("/ws/main.hc", "\"title\"\n    \"docs/intro.md\"\n");
    fs.insert("/ws/docs/intro.md", "");

    let mut options = CompileOptions::new("/ws/main.hc", "/ws");
    options.emitter = EmitterConfig {
        insert_blank_lines: false,
        use_filename_as_heading: true,
    };
    let output = compile_with_timestamps(&options, &fs, &timestamps_at("0"), true).unwrap();
    assert!(output.markdown.contains("## intro.md\n"));
    assert!(!output.markdown.contains("docs/intro.md"));
}

#[test]
fn test_build_timestamp_override_lands_in_manifest() {
    let fs = MemoryFileSystem::new();
    fs.insert("/ws/main.hc", "\"title\"\n");

    let options = CompileOptions::new("/ws/main.hc", "/ws");
    let output =
        compile_with_timestamps(&options, &fs, &timestamps_at("1700000000"), true).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&output.manifest_json).unwrap();
    assert_eq!(manifest["timestamp"], "2023-11-14T22:13:20Z");
}

#[test]
fn test_only_requested_outputs_are_written() {
    let fs = MemoryFileSystem::new();
    fs.insert("/ws/main.hc", "\"title\"\n");

    let mut options = CompileOptions::new("/ws/main.hc", "/ws");
    options.manifest_path = Some(PathBuf::from("/ws/manifest.json"));
    compile_with_timestamps(&options, &fs, &timestamps_at("0"), false).unwrap();

    assert!(fs.contents("/ws/manifest.json").is_some());
    assert!(fs.contents("/ws/main.md").is_none());
}

#[test]
fn test_syntax_error_carries_location_through_api() {
    let fs = MemoryFileSystem::new();
    fs.insert("/ws/main.hc", "\"title\"\n   \"bad indent\"\n");

    let options = CompileOptions::new("/ws/main.hc", "/ws");
    let err = compile_with_timestamps(&options, &fs, &timestamps_at("0"), true).unwrap_err();
    let location = err.location().expect("lex errors carry a location");
    assert_eq!(location.line, 2);
    assert_eq!(location.file, PathBuf::from("/ws/main.hc"));
}
