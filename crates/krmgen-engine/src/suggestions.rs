//! Fuzzy matching suggestions for template errors
//!
//! Template authors mostly trip over the casing of provider functions
//! (`argocdenv` instead of `argocdEnv`) or reach for helpers that were
//! removed from the function table. Levenshtein distance against the
//! registered names turns those into a "did you mean" hint.

use crate::registry::REMOVED_FUNCTIONS;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Suggestion result with confidence scoring
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggested correction
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
}

/// Find closest matches from a list of candidates
pub fn find_closest_matches(
    input: &str,
    candidates: &[&str],
    max_results: usize,
) -> Vec<Suggestion> {
    let lowered = input.to_lowercase();
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            // casing typos count as the closest possible match
            let distance = if candidate.to_lowercase() == lowered {
                1
            } else {
                strsim::levenshtein(input, candidate)
            };
            (distance <= MAX_SUGGESTION_DISTANCE && distance > 0).then(|| Suggestion {
                text: candidate.to_string(),
                distance,
            })
        })
        .collect();

    suggestions.sort_by(|a, b| a.distance.cmp(&b.distance).then(a.text.cmp(&b.text)));
    suggestions.truncate(max_results);
    suggestions
}

/// Suggest corrections for an unknown function
pub fn suggest_unknown_function(func_name: &str, known: &[&str]) -> Option<String> {
    if REMOVED_FUNCTIONS.contains(&func_name) {
        return Some(format!(
            "`{}` is not available for security reasons. Use `argocdEnv` or `kubeEnv` instead",
            func_name
        ));
    }

    let matches = find_closest_matches(func_name, known, 3);
    if matches.is_empty() {
        return None;
    }

    let suggestions: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
    Some(format!("Did you mean {}?", suggestions.join(" or ")))
}

/// Extract the function name from a MiniJinja "unknown function" message
pub fn extract_function_name(msg: &str) -> Option<String> {
    for (start, end) in [("`", "`"), ("'", "'"), ("\"", "\"")] {
        if let Some(start_idx) = msg.find(start) {
            let rest = &msg[start_idx + start.len()..];
            if let Some(end_idx) = rest.find(end) {
                return Some(rest[..end_idx].to_string());
            }
        }
    }

    // "unknown function: foo is unknown"
    let (head, _) = msg.split_once(" is unknown")?;
    head.rsplit(|c: char| c.is_whitespace() || c == ':')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["argocdEnv", "kubeEnv", "readF", "azSec", "upper"];

    #[test]
    fn test_find_closest_matches() {
        let matches = find_closest_matches("kubeEnb", KNOWN, 3);
        assert_eq!(matches[0].text, "kubeEnv");
        assert_eq!(matches[0].distance, 1);
    }

    #[test]
    fn test_casing_typo() {
        let suggestion = suggest_unknown_function("argocdenv", KNOWN).unwrap();
        assert!(suggestion.contains("`argocdEnv`"));
    }

    #[test]
    fn test_removed_function_hint() {
        let suggestion = suggest_unknown_function("env", KNOWN).unwrap();
        assert!(suggestion.contains("security"));
    }

    #[test]
    fn test_no_suggestion_for_unrelated_name() {
        assert!(suggest_unknown_function("anyTotallyUnknownFunc", KNOWN).is_none());
    }

    #[test]
    fn test_extract_function_name() {
        assert_eq!(
            extract_function_name("unknown function: foo is unknown (in <string>:1)"),
            Some("foo".to_string())
        );
        assert_eq!(
            extract_function_name("unknown function `bar`"),
            Some("bar".to_string())
        );
        assert_eq!(extract_function_name("something else"), None);
    }
}
