//! Natural ordering for file names with embedded numbers.
//!
//! `page2` sorts before `page10` because digit runs compare by numeric value.
//! Digit runs are compared as arbitrarily long integers without parsing them, so
//! a 40-digit volume number cannot overflow. Text runs compare case-insensitively.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;

lazy_static! {
    /// Maximal runs of ASCII digits. `\d` would also match non-ASCII digits.
    static ref DIGIT_RUN: Regex = Regex::new(r"[0-9]+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    /// Digits with leading zeros stripped; empty means zero.
    Number(String),
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Number(a), Token::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Token::Text(a), Token::Text(b)) => a.cmp(b),
            (Token::Number(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort key splitting a name into alternating text and number tokens.
///
/// The token list always starts with a (possibly empty) text token, so tokens
/// at the same position always have the same kind. Keys whose tokens are equal
/// (`"002"` vs `"2"`, `"A"` vs `"a"`) fall back to the original string, which
/// keeps the order total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    tokens: Vec<Token>,
    original: String,
}

impl NaturalKey {
    pub fn new(value: &str) -> Self {
        let mut tokens = Vec::new();
        let mut last = 0;
        for digits in DIGIT_RUN.find_iter(value) {
            tokens.push(Token::Text(value[last..digits.start()].to_lowercase()));
            tokens.push(Token::Number(
                digits.as_str().trim_start_matches('0').to_string(),
            ));
            last = digits.end();
        }
        tokens.push(Token::Text(value[last..].to_lowercase()));

        Self {
            tokens,
            original: value.to_string(),
        }
    }

    /// Key for the final segment of `path`.
    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.file_name().unwrap_or_default().to_string_lossy())
    }

    /// True when both keys have identical tokens, ignoring the tie-breaker.
    pub fn same_rank(&self, other: &Self) -> bool {
        self.tokens == other.tokens
    }
}

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tokens
            .cmp(&other.tokens)
            .then_with(|| self.original.cmp(&other.original))
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compares two names in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    NaturalKey::new(a).cmp(&NaturalKey::new(b))
}

/// Compares two paths by their final segment in natural order.
pub fn compare_paths(a: &Path, b: &Path) -> Ordering {
    NaturalKey::from_path(a).cmp(&NaturalKey::from_path(b))
}

/// Sorts paths in place by their final segment in natural order.
pub fn sort_paths(paths: &mut [PathBuf]) {
    paths.par_sort_by_cached_key(|p| NaturalKey::from_path(p));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        v.sort_by(|a, b| natural_cmp(a, b));
        v
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(
            sorted(&["page10", "page1", "page2"]),
            vec!["page1", "page2", "page10"]
        );
    }

    #[test]
    fn text_is_case_insensitive() {
        assert_eq!(sorted(&["b", "A", "c"]), vec!["A", "b", "c"]);
    }

    #[test]
    fn leading_zeros_share_rank_but_stay_total() {
        let a = NaturalKey::new("002");
        let b = NaturalKey::new("2");
        assert!(a.same_rank(&b));
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(natural_cmp("002", "3"), Ordering::Less);
    }

    #[test]
    fn huge_digit_runs_do_not_overflow() {
        let big = "vol99999999999999999999999999999999";
        let bigger = "vol100000000000000000000000000000000";
        assert_eq!(natural_cmp(big, bigger), Ordering::Less);
    }

    #[test]
    fn empty_string_is_minimal() {
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
        assert_eq!(natural_cmp("", "0"), Ordering::Less);
        assert_eq!(natural_cmp("", ""), Ordering::Equal);
    }

    #[test]
    fn non_ascii_digits_are_text() {
        // Arabic-Indic digits are not parsed as numbers.
        let key = NaturalKey::new("\u{0661}\u{0662}");
        assert_eq!(key.tokens.len(), 1);
    }

    #[test]
    fn paths_sort_by_file_name_only() {
        let mut paths = vec![
            PathBuf::from("z/10.jpg"),
            PathBuf::from("a/2.png"),
            PathBuf::from("m/01.jpg"),
        ];
        sort_paths(&mut paths);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("m/01.jpg"),
                PathBuf::from("a/2.png"),
                PathBuf::from("z/10.jpg"),
            ]
        );
    }
}
