/// Ordered keyword families. Lookups walk the table top to bottom and the
/// first family with a keyword contained in the case-folded text wins.
pub type KeywordTable<T> = [(T, &'static [&'static str])];

pub fn first_match<T: Copy>(table: &KeywordTable<T>, text: &str) -> Option<T> {
    let folded = text.trim().to_lowercase();
    if folded.is_empty() {
        return None;
    }
    table
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| folded.contains(k)))
        .map(|(value, _)| *value)
}

/// Collapses runs of whitespace to single spaces and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &KeywordTable<u8> = &[
        (1, &["alpha", "beta"]),
        (2, &["alphabet"]),
        (3, &["gamma"]),
    ];

    #[test]
    fn first_family_wins() {
        // "alphabet" also contains "alpha"; the earlier family takes it.
        assert_eq!(first_match(TABLE, "ALPHABET soup"), Some(1));
    }

    #[test]
    fn no_match_is_none() {
        assert_eq!(first_match(TABLE, "delta"), None);
        assert_eq!(first_match(TABLE, "   "), None);
    }

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(first_match(TABLE, "  Gamma Ray "), Some(3));
    }

    #[test]
    fn collapse_whitespace_squeezes_runs() {
        assert_eq!(collapse_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }
}
