use crate::ast::SourceLocation;
use crate::error::LexError;
use crate::utils::span_for_line;
use miette::NamedSource;
use std::path::{Path, PathBuf};

/// Number of spaces per indentation level.
pub const SPACES_PER_LEVEL: usize = 4;

/// Maximum allowed nesting depth.
pub const MAX_DEPTH: usize = 10;

/// Classification of a single source line.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenKind {
    /// A line consisting only of spaces (or nothing at all).
    Blank,
    /// A `#` comment after optional indentation. Content is ignored.
    Comment,
    /// A quoted node literal, with the quotes stripped.
    Node(String),
}

/// A classified line with its depth and position.
/// Depth is 0 for blank and comment lines.
#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub depth: usize,
    pub location: SourceLocation,
}

impl Token {
    /// Whether this token carries structural meaning for the tree builder.
    pub fn is_node(&self) -> bool {
        matches!(self.kind, TokenKind::Node(_))
    }
}

/// Line-by-line tokenizer for Hypercode (`.hc`) source text.
///
/// Validation rules:
/// - Indentation must use spaces only (no tabs), in multiples of 4
/// - Depth (indentation / 4) is bounded to 10
/// - Literals must be double-quoted, single-line, and properly closed
/// - Line endings are normalized to LF before splitting
pub struct Lexer {
    normalized: String,
    file_path: PathBuf,
}

impl Lexer {
    pub fn new(content: &str, file_path: impl AsRef<Path>) -> Self {
        Lexer {
            normalized: normalize_line_endings(content),
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    /// Tokenize the source into a sequence of classified lines.
    /// All errors are fatal; the best-effort entry point lives in the parser.
    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        for (index, line) in split_lines(&self.normalized).iter().enumerate() {
            let location = SourceLocation::new(&self.file_path, index + 1);
            tokens.push(self.classify_line(line, location)?);
        }
        Ok(tokens)
    }

    fn classify_line(&self, line: &str, location: SourceLocation) -> Result<Token, LexError> {
        // Trailing spaces carry no meaning anywhere in the grammar.
        let line = line.trim_end_matches(' ');

        if line.is_empty() {
            return Ok(Token {
                kind: TokenKind::Blank,
                depth: 0,
                location,
            });
        }

        let indent = self.measure_indentation(line, &location)?;
        if indent % SPACES_PER_LEVEL != 0 {
            return Err(LexError::MisalignedIndentation {
                src: self.named_source(),
                span: span_for_line(&self.normalized, location.line),
                actual: indent,
                location,
            });
        }
        let depth = indent / SPACES_PER_LEVEL;
        if depth > MAX_DEPTH {
            return Err(LexError::DepthExceeded {
                src: self.named_source(),
                span: span_for_line(&self.normalized, location.line),
                depth,
                max: MAX_DEPTH,
                location,
            });
        }

        let rest = &line[indent..];
        if rest.starts_with('#') {
            return Ok(Token {
                kind: TokenKind::Comment,
                depth: 0,
                location,
            });
        }

        let literal = self.extract_literal(rest, &location)?;
        Ok(Token {
            kind: TokenKind::Node(literal),
            depth,
            location,
        })
    }

    /// Count leading spaces, rejecting tabs anywhere in the indentation run.
    fn measure_indentation(&self, line: &str, location: &SourceLocation) -> Result<usize, LexError> {
        let mut indent = 0;
        for c in line.chars() {
            match c {
                ' ' => indent += 1,
                '\t' => {
                    return Err(LexError::TabInIndentation {
                        src: self.named_source(),
                        span: span_for_line(&self.normalized, location.line),
                        location: location.clone(),
                    })
                }
                _ => break,
            }
        }
        Ok(indent)
    }

    /// Extract the quoted literal from the non-indentation remainder of a line.
    fn extract_literal(&self, rest: &str, location: &SourceLocation) -> Result<String, LexError> {
        let span = span_for_line(&self.normalized, location.line);

        if !rest.starts_with('"') {
            return Err(LexError::InvalidLine {
                src: self.named_source(),
                span,
                location: location.clone(),
            });
        }

        let body = &rest[1..];
        let closing = match body.find('"') {
            Some(i) => i,
            None => {
                return Err(LexError::UnclosedQuote {
                    src: self.named_source(),
                    span,
                    location: location.clone(),
                })
            }
        };

        let literal = &body[..closing];
        if literal.contains('\n') || literal.contains('\r') {
            return Err(LexError::MultilineLiteral {
                src: self.named_source(),
                span,
                location: location.clone(),
            });
        }

        let trailing = &body[closing + 1..];
        if !trailing.chars().all(|c| c == ' ') {
            return Err(LexError::TrailingContent {
                src: self.named_source(),
                span,
                location: location.clone(),
            });
        }

        Ok(literal.to_string())
    }

    fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.file_path.display().to_string(), self.normalized.clone())
    }
}

/// Normalize CRLF and lone CR line endings to LF.
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split normalized content into lines without producing a spurious empty
/// trailing line: "a\nb\n" yields ["a", "b"].
pub fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    trimmed.split('\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Result<Vec<Token>, LexError> {
        Lexer::new(input, "test.hc").lex()
    }

    fn assert_kinds(input: &str, expected: Vec<TokenKind>) {
        let kinds: Vec<TokenKind> = lex(input).unwrap().into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, expected);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(lex("").unwrap(), vec![]);
    }

    #[test]
    fn test_single_node() {
        assert_kinds("\"root\"\n", vec![TokenKind::Node("root".to_string())]);
    }

    #[test]
    fn test_trailing_newline_does_not_add_a_line() {
        assert_eq!(lex("\"a\"\n").unwrap().len(), 1);
        assert_eq!(lex("\"a\"").unwrap().len(), 1);
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_kinds(
            "\"root\"\n\n   \n# note\n",
            vec![
                TokenKind::Node("root".to_string()),
                TokenKind::Blank,
                TokenKind::Blank,
                TokenKind::Comment,
            ],
        );
    }

    #[test]
    fn test_indented_comment() {
        let tokens = lex("\"root\"\n    # nested note\n").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Comment);
        assert_eq!(tokens[1].depth, 0);
    }

    #[test]
    fn test_depth_computed_from_indentation() {
        let tokens = lex("\"a\"\n    \"b\"\n        \"c\"\n").unwrap();
        let depths: Vec<usize> = tokens.iter().map(|t| t.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[test]
    fn test_crlf_and_cr_normalization() {
        let tokens = lex("\"a\"\r\n    \"b\"\r\"c\"\r\n").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].depth, 1);
    }

    #[test]
    fn test_tab_in_indentation() {
        let err = lex("\t\"a\"\n").unwrap_err();
        assert!(matches!(err, LexError::TabInIndentation { .. }));
    }

    #[test]
    fn test_tab_after_spaces() {
        let err = lex("  \t\"a\"\n").unwrap_err();
        assert!(matches!(err, LexError::TabInIndentation { .. }));
    }

    #[test]
    fn test_misaligned_indentation_cites_width() {
        for width in [1, 2, 3, 5, 6, 7, 9] {
            let input = format!("{}\"a\"\n", " ".repeat(width));
            match Lexer::new(&input, "test.hc").lex() {
                Err(LexError::MisalignedIndentation { actual, .. }) => assert_eq!(actual, width),
                other => panic!("expected misalignment for width {width}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_depth_exceeded() {
        let input = format!("{}\"deep\"\n", " ".repeat(44));
        let err = Lexer::new(&input, "test.hc").lex().unwrap_err();
        assert!(matches!(err, LexError::DepthExceeded { depth: 11, .. }));
    }

    #[test]
    fn test_depth_ten_is_allowed() {
        let input = format!("{}\"deep\"\n", " ".repeat(40));
        let tokens = Lexer::new(&input, "test.hc").lex().unwrap();
        assert_eq!(tokens[0].depth, 10);
    }

    #[test]
    fn test_unquoted_line() {
        let err = lex("plain text\n").unwrap_err();
        assert!(matches!(err, LexError::InvalidLine { .. }));
    }

    #[test]
    fn test_unclosed_quote() {
        let err = lex("\"no closing\n").unwrap_err();
        assert!(matches!(err, LexError::UnclosedQuote { .. }));
    }

    #[test]
    fn test_trailing_content() {
        let err = lex("\"a\" junk\n").unwrap_err();
        assert!(matches!(err, LexError::TrailingContent { .. }));
    }

    #[test]
    fn test_trailing_spaces_are_fine() {
        assert_kinds("\"a\"   \n", vec![TokenKind::Node("a".to_string())]);
    }

    #[test]
    fn test_empty_literal() {
        assert_kinds("\"\"\n", vec![TokenKind::Node(String::new())]);
    }

    #[test]
    fn test_locations_are_one_indexed() {
        let tokens = lex("\"a\"\n    \"b\"\n").unwrap();
        assert_eq!(tokens[0].location.line, 1);
        assert_eq!(tokens[1].location.line, 2);
    }
}
