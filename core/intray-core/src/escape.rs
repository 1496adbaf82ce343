//! Message escaping for the line-oriented flat-file format.
//!
//! A record must occupy exactly one line, so backslash, tab and newline are
//! written as `\\`, `\t` and `\n`. Decoding is a single left-to-right scan:
//! each backslash consumes exactly one following character, which means an
//! escaped backslash can never be re-read as the start of another sequence.
//! Sequences we do not recognise are kept verbatim.

pub fn escape_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for ch in message.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape_message(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            // Trailing lone backslash.
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters_onto_one_line() {
        let escaped = escape_message("line one\nline\ttwo\\three");
        assert_eq!(escaped, "line one\\nline\\ttwo\\\\three");
        assert!(!escaped.contains('\n'));
        assert!(!escaped.contains('\t'));
    }

    #[test]
    fn round_trips_mixed_content() {
        for message in [
            "plain",
            "tab\there",
            "new\nline",
            "back\\slash",
            "literal backslash-n: \\n",
            "literal backslash-t: \\t",
            "\\\\\n\t\\",
            "trailing\\",
            "unicode ✓ → done",
        ] {
            assert_eq!(unescape_message(&escape_message(message)), message);
        }
    }

    #[test]
    fn escaped_backslash_is_not_reinterpreted() {
        // `\\n` on disk is an escaped backslash followed by `n`.
        assert_eq!(unescape_message("\\\\n"), "\\n");
    }

    #[test]
    fn unknown_sequences_pass_through() {
        assert_eq!(unescape_message("C:\\data\\x"), "C:\\data\\x");
        assert_eq!(unescape_message("end\\"), "end\\");
    }
}
