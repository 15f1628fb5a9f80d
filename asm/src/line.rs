//! Line-level tokenization shared by the preprocessor and pass 1.

/// Drop a trailing `; ...` comment and surrounding whitespace.
pub(crate) fn strip_comment(s: &str) -> &str {
    match s.find(';') {
        Some(idx) => s[..idx].trim(),
        None => s.trim(),
    }
}

pub(crate) fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split a leading `label:` off a comment-stripped line. Only an identifier
/// directly before the first colon counts; a colon buried in operand text
/// never does.
pub(crate) fn split_label(s: &str) -> (Option<&str>, &str) {
    if let Some(pos) = s.find(':') {
        let before = s[..pos].trim();
        if is_ident(before) {
            return (Some(before), s[pos + 1..].trim());
        }
    }
    (None, s)
}

/// `.name arg1, arg2, ...` with the leading dot already present.
pub(crate) fn parse_directive(s: &str) -> (String, Vec<String>) {
    let body = s[1..].trim();
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let args = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect()
    };
    (name.to_ascii_lowercase(), args)
}

/// Case-insensitive directive match requiring a token boundary, so that
/// `.macro` does not match `.macrox`.
pub(crate) fn directive_is(line: &str, directive: &str) -> bool {
    line.len() >= directive.len()
        && line[..directive.len()].eq_ignore_ascii_case(directive)
        && line[directive.len()..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn comments_and_labels() {
        assert_eq!(strip_comment("  MOVUR DR1, DR2 ; copy"), "MOVUR DR1, DR2");
        assert_eq!(strip_comment("; only a comment"), "");
        assert_eq!(split_label("loop: ADDUI #1, DR2"), (Some("loop"), "ADDUI #1, DR2"));
        assert_eq!(split_label("loop:"), (Some("loop"), ""));
        assert_eq!(split_label("ADDUI #1, DR2"), (None, "ADDUI #1, DR2"));
    }

    #[test]
    fn directive_parsing() {
        let (name, args) = parse_directive(".dw24 1, 2, 0x3");
        assert_eq!(name, "dw24");
        assert_eq!(args, vec!["1", "2", "0x3"]);

        let (name, args) = parse_directive(".ORG 0x100");
        assert_eq!(name, "org");
        assert_eq!(args, vec!["0x100"]);
    }

    #[test]
    fn directive_boundaries() {
        assert!(directive_is(".macro FOO a, b", ".macro"));
        assert!(directive_is(".MACRO FOO", ".macro"));
        assert!(directive_is(".endm", ".endm"));
        assert!(!directive_is(".macrox FOO", ".macro"));
    }
}
