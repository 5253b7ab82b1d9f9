use std::fmt::Display;
use std::path::PathBuf;

/// A position in a source file, used for error reporting.
/// Lines are 1-indexed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Semantic classification of a node's literal, assigned by the resolver.
/// Written exactly once per node.
#[derive(Debug, PartialEq, Clone)]
pub enum Resolution {
    /// The literal is plain prose, not a file reference.
    InlineText,
    /// The literal points at a Markdown file whose raw content has been loaded.
    MarkdownFile { path: String, content: String },
    /// The literal points at a Hypercode file, compiled into an embedded subtree.
    HypercodeFile { path: String, subtree: Box<Node> },
    /// The literal looks like a file reference but carries a disallowed
    /// extension. Only reachable in lenient mode; strict mode fails instead.
    Forbidden { extension: String },
}

/// A node in the Hypercode document tree.
///
/// Nodes exclusively own their children; the tree is acyclic by construction.
/// The `resolution` field starts out `None` and is populated by the resolver.
#[derive(Debug, PartialEq, Clone)]
pub struct Node {
    pub literal: String,
    pub depth: usize,
    pub location: SourceLocation,
    pub children: Vec<Node>,
    pub resolution: Option<Resolution>,
}

impl Node {
    pub fn new(literal: impl Into<String>, depth: usize, location: SourceLocation) -> Self {
        Node {
            literal: literal.into(),
            depth,
            location,
            children: Vec::new(),
            resolution: None,
        }
    }

    /// Total number of nodes in this subtree, including self.
    /// Embedded Hypercode subtrees are not counted.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    /// Deepest level reachable from this node, counting embedded
    /// Hypercode subtrees as one level below their reference.
    pub fn max_depth(&self) -> usize {
        let mut max = self.depth;
        for child in &self.children {
            max = max.max(child.max_depth());
        }
        if let Some(Resolution::HypercodeFile { subtree, .. }) = &self.resolution {
            max = max.max(self.depth + 1 + subtree.max_depth());
        }
        max
    }
}

/// A parsed Hypercode document: exactly one root node plus the file it came from.
#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub root: Node,
    pub file_path: PathBuf,
}

impl Program {
    pub fn new(root: Node, file_path: impl Into<PathBuf>) -> Self {
        Program {
            root,
            file_path: file_path.into(),
        }
    }
}
