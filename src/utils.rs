use miette::SourceSpan;

/// Computes the byte span of a 1-based line in the source text.
/// This function is designed to be called only when an error occurs, as it
/// iterates through the source text to locate the line.
pub fn span_for_line(source: &str, line: usize) -> SourceSpan {
    let mut current = 1;
    let mut start = 0;
    for (i, c) in source.char_indices() {
        if current == line {
            break;
        }
        if c == '\n' {
            current += 1;
            start = i + 1;
        }
    }
    let len = source[start..]
        .find('\n')
        .unwrap_or(source.len() - start);
    (start, len).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_for_line() {
        let source = "first\nsecond\nthird";
        assert_eq!(span_for_line(source, 1), (0, 5).into());
        assert_eq!(span_for_line(source, 2), (6, 6).into());
        assert_eq!(span_for_line(source, 3), (13, 5).into());
    }

    #[test]
    fn test_span_for_line_without_trailing_newline() {
        assert_eq!(span_for_line("only", 1), (0, 4).into());
    }
}
