//! Body text tokenizer.
//!
//! Splits on every character that is not alphanumeric or `_`, then
//! lower-cases. The same function runs at index time and at query time.

/// Split `text` into normalized tokens, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token counts for one text, sorted by token.
pub fn term_frequencies(text: &str) -> Vec<(String, u32)> {
    let mut tokens = tokenize(text);
    tokens.sort_unstable();

    let mut freqs: Vec<(String, u32)> = Vec::new();
    for token in tokens {
        match freqs.last_mut() {
            Some((last, count)) if *last == token => *count += 1,
            _ => freqs.push((token, 1)),
        }
    }
    freqs
}
