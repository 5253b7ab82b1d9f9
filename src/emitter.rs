use crate::ast::{Node, Resolution};
use crate::lexer::normalize_line_endings;

/// Maximum Markdown heading level before overflow falls back to bold.
const MAX_HEADING_LEVEL: usize = 6;

/// Options controlling Markdown emission.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Insert a blank line between sibling nodes.
    pub insert_blank_lines: bool,
    /// Use the final path component instead of the full reference path as
    /// the heading for file-reference nodes.
    pub use_filename_as_heading: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        EmitterConfig {
            insert_blank_lines: true,
            use_filename_as_heading: false,
        }
    }
}

/// Renders a fully resolved tree as a Markdown document.
///
/// Traversal is depth-first. Each node contributes a heading at its
/// effective depth plus one; embedded Markdown content is renormalized by
/// [`adjust_headings`] with the node's effective depth as offset, and an
/// embedded Hypercode subtree is rendered one level below its referencing
/// node.
#[derive(Debug, Default)]
pub struct MarkdownEmitter {
    config: EmitterConfig,
}

impl MarkdownEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        MarkdownEmitter { config }
    }

    /// Emit a Markdown document. The output uses LF line endings and ends
    /// with exactly one trailing line feed (unless empty).
    pub fn emit(&self, root: &Node) -> String {
        let mut out = String::new();
        self.emit_node(root, -1, &mut out);
        ensure_single_trailing_newline(&out)
    }

    fn emit_node(&self, node: &Node, parent_depth: i64, out: &mut String) {
        // Effective depth follows the rendered tree shape, not source
        // indentation: embedded subtrees deepen it past their own file's
        // depth numbers.
        let effective_depth = parent_depth + 1;

        let heading_text = self.heading_text(node);
        let heading = generate_heading(&heading_text, (effective_depth + 1) as usize);
        out.push_str(&heading);
        out.push('\n');

        let embedded = self.embed_content(node, effective_depth, out);

        for (index, child) in node.children.iter().enumerate() {
            if (index > 0 || embedded) && self.config.insert_blank_lines {
                out.push('\n');
            }
            self.emit_node(child, effective_depth, out);
        }
    }

    fn heading_text(&self, node: &Node) -> String {
        if !self.config.use_filename_as_heading {
            return node.literal.clone();
        }
        match &node.resolution {
            Some(Resolution::MarkdownFile { path, .. })
            | Some(Resolution::HypercodeFile { path, .. }) => path
                .rsplit('/')
                .next()
                .unwrap_or(path)
                .to_string(),
            _ => node.literal.clone(),
        }
    }

    /// Returns true when content beyond the heading was written, so the
    /// caller can separate it from the first child.
    fn embed_content(&self, node: &Node, effective_depth: i64, out: &mut String) -> bool {
        match &node.resolution {
            None | Some(Resolution::InlineText) => false,
            Some(Resolution::MarkdownFile { content, .. }) => {
                let adjusted = adjust_headings(content, effective_depth.max(0) as usize);
                let trimmed = adjusted.trim_end_matches('\n');
                if trimmed.is_empty() {
                    false
                } else {
                    out.push_str(trimmed);
                    out.push('\n');
                    true
                }
            }
            Some(Resolution::HypercodeFile { subtree, .. }) => {
                self.emit_node(subtree, effective_depth, out);
                true
            }
            Some(Resolution::Forbidden { extension }) => {
                out.push_str(&format!("<!-- Error: Forbidden extension .{extension} -->\n"));
                true
            }
        }
    }
}

fn generate_heading(text: &str, level: usize) -> String {
    if level > MAX_HEADING_LEVEL {
        return bold(text);
    }
    let hashes = "#".repeat(level);
    if text.is_empty() {
        hashes
    } else {
        format!("{hashes} {text}")
    }
}

/// Shift every Markdown heading in `content` by `offset` levels.
///
/// Recognizes ATX headings and Setext underlines, converting the latter to
/// ATX form. A heading pushed past level 6 becomes bold text. The result is
/// normalized to LF line endings and ends with exactly one line feed.
pub fn adjust_headings(content: &str, offset: usize) -> String {
    if content.is_empty() {
        return String::new();
    }

    let normalized = normalize_line_endings(content);
    let lines: Vec<&str> = normalized.split('\n').collect();

    let mut result: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if is_atx_heading(line) {
            result.push(transform_atx_heading(line, offset));
            i += 1;
            continue;
        }

        // Setext: this line is heading text only when the next line is an
        // underline and this line is not blank. A line already consumed as
        // a heading above can never double as Setext text.
        if i + 1 < lines.len() && !line.trim().is_empty() {
            if let Some(level) = parse_setext_underline(lines[i + 1]) {
                result.push(transform_heading(line.trim(), level, offset));
                i += 2;
                continue;
            }
        }

        result.push(line.to_string());
        i += 1;
    }

    ensure_single_trailing_newline(&result.join("\n"))
}

fn ensure_single_trailing_newline(content: &str) -> String {
    let trimmed = content.trim_end_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// ATX headings are 1-6 hashes after optional leading spaces, followed by
/// end-of-line or a space. Seven or more hashes is not a heading.
fn is_atx_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = count_leading_hashes(trimmed);
    if hashes == 0 || hashes > MAX_HEADING_LEVEL {
        return false;
    }
    match trimmed.as_bytes().get(hashes).copied() {
        None => true,
        Some(b' ') | Some(b'\t') => true,
        Some(_) => false,
    }
}

fn count_leading_hashes(line: &str) -> usize {
    line.bytes().take_while(|&b| b == b'#').count()
}

fn extract_atx_text(line: &str) -> String {
    let trimmed = line.trim_start();
    let hashes = count_leading_hashes(trimmed);
    let text = trimmed[hashes..].strip_prefix(' ').unwrap_or(&trimmed[hashes..]);
    remove_trailing_closing_hashes(text)
}

/// Strip an optional ATX closing hash run: `"Heading ##"` becomes
/// `"Heading"`.
fn remove_trailing_closing_hashes(text: &str) -> String {
    text.trim_end_matches([' ', '\t'])
        .trim_end_matches('#')
        .trim_end_matches([' ', '\t'])
        .to_string()
}

fn transform_atx_heading(line: &str, offset: usize) -> String {
    let level = count_leading_hashes(line.trim_start());
    transform_heading(&extract_atx_text(line), level, offset)
}

/// A Setext underline is a line of only `=` (level 1) or only `-`
/// (level 2) after trimming surrounding spaces.
fn parse_setext_underline(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b == b'=') {
        return Some(1);
    }
    if trimmed.bytes().all(|b| b == b'-') {
        return Some(2);
    }
    None
}

fn transform_heading(text: &str, level: usize, offset: usize) -> String {
    let new_level = level + offset;
    if new_level > MAX_HEADING_LEVEL {
        bold(text)
    } else {
        let hashes = "#".repeat(new_level);
        if text.is_empty() {
            hashes
        } else {
            format!("{hashes} {text}")
        }
    }
}

fn bold(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("**{trimmed}**")
    }
}
