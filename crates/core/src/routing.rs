//! Topic routing-key patterns.
//!
//! Routing keys and binding patterns are `.`-separated words. In a pattern
//! `*` matches exactly one word and `#` matches zero or more words.

/// Whether `routing_key` matches the binding `pattern`.
pub fn binding_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((&"#", rest)), _) => {
            match_words(rest, key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some(_), None) => false,
        (Some((&"*", rest)), Some((_, key_rest))) => match_words(rest, key_rest),
        (Some((word, rest)), Some((key_word, key_rest))) => {
            word == key_word && match_words(rest, key_rest)
        }
    }
}
