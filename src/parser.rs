use crate::ast::{Node, Program, SourceLocation};
use crate::error::{HyperpromptError, ParseError};
use crate::lexer::{normalize_line_endings, Lexer, Token, TokenKind, MAX_DEPTH};
use crate::utils::span_for_line;
use miette::NamedSource;
use std::path::{Path, PathBuf};

/// Best-effort parse output: the largest valid partial tree reachable,
/// alongside every diagnostic collected on the way.
#[derive(Debug)]
pub struct RecoveryResult {
    pub program: Option<Program>,
    pub diagnostics: Vec<HyperpromptError>,
}

/// Tree builder for Hypercode token streams.
///
/// Maintains a depth stack of `(depth, node)` pairs representing the path from
/// the root to the most recently opened node. Depth may only grow by one level
/// per node and may shrink by any amount; exactly one depth-0 node must exist.
pub struct Parser {
    normalized: String,
    file_path: PathBuf,
}

impl Parser {
    pub fn new(source_text: &str, file_path: impl AsRef<Path>) -> Self {
        Parser {
            normalized: normalize_line_endings(source_text),
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    /// Tokenize and build the tree. All errors are fatal.
    pub fn parse(&self) -> Result<Program, HyperpromptError> {
        let tokens = Lexer::new(&self.normalized, &self.file_path).lex()?;
        Ok(self.build(&tokens)?)
    }

    /// Build a tree from an existing token stream.
    pub fn build(&self, tokens: &[Token]) -> Result<Program, ParseError> {
        let semantic: Vec<&Token> = tokens.iter().filter(|t| t.is_node()).collect();
        if semantic.is_empty() {
            return Err(ParseError::EmptyTokenStream);
        }

        let mut stack: Vec<(usize, Node)> = Vec::new();
        let mut roots: Vec<Node> = Vec::new();
        let mut root_locations: Vec<SourceLocation> = Vec::new();

        for token in semantic {
            let literal = match &token.kind {
                TokenKind::Node(literal) => literal,
                _ => unreachable!("filtered to node tokens"),
            };
            let depth = token.depth;

            if depth > MAX_DEPTH {
                return Err(ParseError::DepthExceeded {
                    src: self.named_source(),
                    span: span_for_line(&self.normalized, token.location.line),
                    depth,
                    max: MAX_DEPTH,
                    location: token.location.clone(),
                });
            }

            match stack.last() {
                None => {
                    if depth != 0 {
                        return Err(self.depth_jump(-1, depth, &token.location));
                    }
                }
                Some((prev, _)) => {
                    if depth > prev + 1 {
                        return Err(self.depth_jump(*prev as i64, depth, &token.location));
                    }
                }
            }

            if depth == 0 {
                root_locations.push(token.location.clone());
            }

            // Close now-finished siblings and ancestors.
            self.pop_to(depth, &mut stack, &mut roots);
            stack.push((depth, Node::new(literal, depth, token.location.clone())));
        }

        self.pop_to(0, &mut stack, &mut roots);

        match roots.len() {
            0 => Err(ParseError::NoRoot),
            1 => Ok(Program::new(roots.remove(0), self.file_path.clone())),
            _ => {
                let second = &root_locations[1];
                Err(ParseError::MultipleRoots {
                    src: self.named_source(),
                    span: span_for_line(&self.normalized, second.line),
                    locations: root_locations,
                })
            }
        }
    }

    /// Tokenize and build with error recovery for diagnostics tooling.
    ///
    /// Lexical errors still abort (there is no token stream to recover), but
    /// structural errors are accumulated: nodes with invalid depth jumps or
    /// out-of-bound depths are skipped, and a duplicate root resets the
    /// working stack to the first root instead of failing.
    pub fn parse_with_recovery(&self) -> RecoveryResult {
        let tokens = match Lexer::new(&self.normalized, &self.file_path).lex() {
            Ok(tokens) => tokens,
            Err(error) => {
                return RecoveryResult {
                    program: None,
                    diagnostics: vec![error.into()],
                }
            }
        };

        let mut diagnostics: Vec<HyperpromptError> = Vec::new();
        let mut stack: Vec<(usize, Node)> = Vec::new();
        let mut roots: Vec<Node> = Vec::new();
        let mut first_root_location: Option<SourceLocation> = None;

        for token in tokens.iter().filter(|t| t.is_node()) {
            let literal = match &token.kind {
                TokenKind::Node(literal) => literal,
                _ => unreachable!("filtered to node tokens"),
            };
            let depth = token.depth;

            if depth > MAX_DEPTH {
                diagnostics.push(
                    ParseError::DepthExceeded {
                        src: self.named_source(),
                        span: span_for_line(&self.normalized, token.location.line),
                        depth,
                        max: MAX_DEPTH,
                        location: token.location.clone(),
                    }
                    .into(),
                );
                continue;
            }

            if depth == 0 {
                if let Some(first) = &first_root_location {
                    diagnostics.push(
                        ParseError::MultipleRoots {
                            src: self.named_source(),
                            span: span_for_line(&self.normalized, token.location.line),
                            locations: vec![first.clone(), token.location.clone()],
                        }
                        .into(),
                    );
                    // Reset the working stack to the established root.
                    while stack.last().map_or(false, |(d, _)| *d > 0) {
                        self.attach_top(&mut stack, &mut roots);
                    }
                    continue;
                }
                first_root_location = Some(token.location.clone());
            } else {
                let prev = stack.last().map(|(d, _)| *d as i64).unwrap_or(-1);
                if depth as i64 > prev + 1 {
                    diagnostics.push(self.depth_jump(prev, depth, &token.location).into());
                    continue;
                }
            }

            self.pop_to(depth, &mut stack, &mut roots);
            stack.push((depth, Node::new(literal, depth, token.location.clone())));
        }

        self.pop_to(0, &mut stack, &mut roots);

        let program = roots
            .into_iter()
            .next()
            .map(|root| Program::new(root, self.file_path.clone()));
        if program.is_none() && diagnostics.is_empty() {
            diagnostics.push(ParseError::EmptyTokenStream.into());
        }

        RecoveryResult {
            program,
            diagnostics,
        }
    }

    /// Pop every stack entry at or below `depth`, attaching each popped node to
    /// its parent (the entry beneath it) or to the completed-roots list.
    fn pop_to(&self, depth: usize, stack: &mut Vec<(usize, Node)>, roots: &mut Vec<Node>) {
        while stack.last().map_or(false, |(d, _)| *d >= depth) {
            self.attach_top(stack, roots);
        }
    }

    fn attach_top(&self, stack: &mut Vec<(usize, Node)>, roots: &mut Vec<Node>) {
        if let Some((_, node)) = stack.pop() {
            match stack.last_mut() {
                Some((_, parent)) => parent.children.push(node),
                None => roots.push(node),
            }
        }
    }

    fn depth_jump(&self, from: i64, to: usize, location: &SourceLocation) -> ParseError {
        ParseError::InvalidDepthJump {
            src: self.named_source(),
            span: span_for_line(&self.normalized, location.line),
            from,
            to: to as i64,
            location: location.clone(),
        }
    }

    fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.file_path.display().to_string(), self.normalized.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Program, HyperpromptError> {
        Parser::new(source, "test.hc").parse()
    }

    fn parse_err(source: &str) -> ParseError {
        match parse(source) {
            Err(HyperpromptError::Parser(e)) => e,
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_single_root() {
        let program = parse("\"root\"\n").unwrap();
        assert_eq!(program.root.literal, "root");
        assert_eq!(program.root.depth, 0);
        assert!(program.root.children.is_empty());
    }

    #[test]
    fn test_nested_children() {
        let program = parse("\"a\"\n    \"b\"\n        \"c\"\n    \"d\"\n").unwrap();
        let root = &program.root;
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].literal, "b");
        assert_eq!(root.children[0].children[0].literal, "c");
        assert_eq!(root.children[1].literal, "d");
    }

    #[test]
    fn test_depth_may_drop_by_any_amount() {
        let source = "\"a\"\n    \"b\"\n        \"c\"\n            \"d\"\n    \"e\"\n";
        let program = parse(source).unwrap();
        assert_eq!(program.root.children.len(), 2);
        assert_eq!(program.root.children[1].literal, "e");
    }

    #[test]
    fn test_node_count_matches_token_count() {
        let source = "\"a\"\n    \"b\"\n    \"c\"\n        \"d\"\n# comment\n\n    \"e\"\n";
        let program = parse(source).unwrap();
        assert_eq!(program.root.count(), 5);
    }

    #[test]
    fn test_empty_token_stream() {
        assert!(matches!(parse_err("# only comments\n\n"), ParseError::EmptyTokenStream));
        assert!(matches!(parse_err(""), ParseError::EmptyTokenStream));
    }

    #[test]
    fn test_first_node_must_be_root() {
        let err = parse_err("    \"not a root\"\n");
        assert!(matches!(err, ParseError::InvalidDepthJump { from: -1, to: 1, .. }));
    }

    #[test]
    fn test_depth_jump_of_two() {
        let err = parse_err("\"a\"\n        \"b\"\n");
        assert!(matches!(err, ParseError::InvalidDepthJump { from: 0, to: 2, .. }));
    }

    #[test]
    fn test_multiple_roots() {
        let err = parse_err("\"first\"\n\"second\"\n");
        match err {
            ParseError::MultipleRoots { locations, .. } => {
                assert_eq!(locations.len(), 2);
                assert_eq!(locations[0].line, 1);
                assert_eq!(locations[1].line, 2);
            }
            other => panic!("expected MultipleRoots, got {other:?}"),
        }
    }

    #[test]
    fn test_three_roots_all_reported() {
        let err = parse_err("\"a\"\n\"b\"\n\"c\"\n");
        match err {
            ParseError::MultipleRoots { locations, .. } => assert_eq!(locations.len(), 3),
            other => panic!("expected MultipleRoots, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_skips_bad_depth_jumps() {
        let parser = Parser::new("\"a\"\n            \"jump\"\n    \"b\"\n", "test.hc");
        let result = parser.parse_with_recovery();
        let program = result.program.unwrap();
        assert_eq!(program.root.children.len(), 1);
        assert_eq!(program.root.children[0].literal, "b");
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_recovery_resets_on_duplicate_root() {
        let parser = Parser::new("\"a\"\n    \"b\"\n\"dup\"\n    \"c\"\n", "test.hc");
        let result = parser.parse_with_recovery();
        let program = result.program.unwrap();
        assert_eq!(program.root.literal, "a");
        // "c" hangs off the original root after the reset.
        let literals: Vec<&str> = program
            .root
            .children
            .iter()
            .map(|c| c.literal.as_str())
            .collect();
        assert_eq!(literals, vec!["b", "c"]);
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_recovery_reports_lex_errors() {
        let parser = Parser::new("\"a\"\nnot quoted\n", "test.hc");
        let result = parser.parse_with_recovery();
        assert!(result.program.is_none());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_locations_attached_to_nodes() {
        let program = parse("\"a\"\n    \"b\"\n").unwrap();
        assert_eq!(program.root.location.line, 1);
        assert_eq!(program.root.children[0].location.line, 2);
    }
}
