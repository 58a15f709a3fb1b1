//! Username generation for new accounts.

use rand::Rng;

/// Number of random digits appended to the name stem.
const SUFFIX_DIGITS: usize = 10;

/// Longest stem kept from the display name.
const MAX_STEM_LEN: usize = 20;

/// Build a username from the first word of a display name plus ten random
/// digits (e.g. "Ada Lovelace" -> "ada4821930571"). Characters other than
/// ASCII letters and digits are dropped; an empty stem becomes "user".
pub fn generate_username(name: &str) -> String {
    let mut stem: String = name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_STEM_LEN)
        .collect();
    if stem.is_empty() {
        stem.push_str("user");
    }

    let mut rng = rand::rng();
    for _ in 0..SUFFIX_DIGITS {
        let digit: u32 = rng.random_range(0..10);
        stem.push(char::from_digit(digit, 10).unwrap_or('0'));
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_first_name_and_ten_digits() {
        let username = generate_username("Ada Lovelace");

        assert!(username.starts_with("ada"));
        let suffix = &username[3..];
        assert_eq!(suffix.len(), 10);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_strips_unusable_characters() {
        assert!(generate_username("  José-María  Pérez").starts_with("josmara"));
        assert!(generate_username("").starts_with("user"));
        assert!(generate_username("李雷").starts_with("user"));
    }

    #[test]
    fn test_generates_varied_usernames() {
        let names: std::collections::HashSet<String> =
            (0..10).map(|_| generate_username("Sam")).collect();
        assert!(names.len() > 1);
    }
}
