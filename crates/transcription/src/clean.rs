/// Cleans raw backend transcript text before it reaches the accumulator.
///
/// Strips closed `<...>` and `[...]` annotation spans (noise tags, laughter
/// markers), drops a leading list marker, and trims whitespace. Idempotent:
/// `clean_transcript(clean_transcript(x)) == clean_transcript(x)`.
pub fn clean_transcript(text: &str) -> String {
    let stripped = strip_delimited(text, '<', '>');
    let stripped = strip_delimited(&stripped, '[', ']');
    strip_leading_marker(&stripped).trim().to_string()
}

/// Removes every closed `open...close` span. An unmatched opener is kept
/// verbatim, mirroring a lazy `open.*?close` pattern.
fn strip_delimited(text: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        match rest[start..].find(close) {
            Some(rel_end) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + rel_end + close.len_utf8()..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Drops leading `-` / `*` list markers and surrounding whitespace. Repeats
/// until none remain so that cleaning is idempotent even for stacked markers.
fn strip_leading_marker(text: &str) -> &str {
    let mut rest = text.trim_start();
    while let Some(stripped) = rest.strip_prefix(['-', '*']) {
        rest = stripped.trim_start();
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_angle_tags() {
        assert_eq!(clean_transcript("Bom dia a todos <noise> "), "Bom dia a todos");
    }

    #[test]
    fn test_strips_bracket_tags() {
        assert_eq!(clean_transcript("olá [risos] pessoal"), "olá  pessoal");
    }

    #[test]
    fn test_noise_only_becomes_empty() {
        assert_eq!(clean_transcript("<noise> [risos]"), "");
        assert_eq!(clean_transcript("   "), "");
    }

    #[test]
    fn test_strips_leading_list_marker() {
        assert_eq!(clean_transcript("- primeiro item"), "primeiro item");
        assert_eq!(clean_transcript("  * nota"), "nota");
    }

    #[test]
    fn test_keeps_interior_dash() {
        assert_eq!(clean_transcript("bem-vindo a todos"), "bem-vindo a todos");
    }

    #[test]
    fn test_unmatched_opener_kept() {
        assert_eq!(clean_transcript("a < b"), "a < b");
        assert_eq!(clean_transcript("nota [incompleta"), "nota [incompleta");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Bom dia a todos <noise> ",
            "<noise> [risos]",
            "- * duplo marcador",
            "texto limpo",
            "a < b > c [d] e",
        ];
        for input in inputs {
            let once = clean_transcript(input);
            assert_eq!(clean_transcript(&once), once, "not idempotent for {input:?}");
        }
    }
}
