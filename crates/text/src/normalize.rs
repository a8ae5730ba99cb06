//! Normalization applied identically to indexed text and to queries.

/// Collapses whitespace runs to one space, trims, and lowercases.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_and_trims() {
        assert_eq!(normalize("  John \t\n  SMITH "), "john smith");
    }

    #[test]
    fn test_non_breaking_space_is_whitespace() {
        assert_eq!(normalize("Jane\u{a0}Doe"), "jane doe");
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize(" \n "), "");
    }
}
