//! Display cleanup for tokenizer-specific markers.

/// Replacements applied in order to every token.
const REPLACEMENTS: [(&str, &str); 5] = [
    ("Ġ", " "),
    ("▁", " "),
    ("</w>", ""),
    ("Ċ", ","),
    ("<0x0A>", "\n"),
];

/// Replace byte-level BPE and sentencepiece markers with readable text.
pub fn prettify_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .map(|token| {
            REPLACEMENTS
                .iter()
                .fold(token.as_ref().to_string(), |acc, (from, to)| acc.replace(from, to))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_special_markers() {
        let tokens = ["Hello", "Ċ", "Ġ▁World</w>", "<0x0A>", "!"];
        assert_eq!(
            prettify_tokens(&tokens),
            vec!["Hello", ",", "  World", "\n", "!"]
        );
    }
}
