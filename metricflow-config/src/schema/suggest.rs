//! Near-match suggestions for unrecognized keys

use serde_json::Value;

/// Minimum similarity for a key to be suggested
pub const SUGGESTION_CUTOFF: f64 = 0.5;

/// Maximum characters of the offending value shown in a suggestion
pub const PREVIEW_LENGTH: usize = 55;

/// Levenshtein edit distance between two strings
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Similarity ratio in `[0, 1]` derived from the edit distance
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Closest candidate to `key`, if any reaches the cutoff
pub fn closest_match<'a, I>(key: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = similarity(key, candidate);
        if score < SUGGESTION_CUTOFF {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Escaped, truncated rendering of a value for error messages
pub fn preview(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let escaped: String = raw.chars().flat_map(char::escape_default).collect();

    if escaped.chars().count() > PREVIEW_LENGTH {
        let truncated: String = escaped.chars().take(PREVIEW_LENGTH).collect();
        format!("{truncated}...")
    } else {
        escaped
    }
}

/// Message for an unrecognized key
pub fn extra_key_message<'a, I>(key: &str, value: &Value, candidates: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    match closest_match(key, candidates) {
        Some(found) => format!(
            "extra keys not allowed. Did you mean: `{found}: {}`?",
            preview(value)
        ),
        None => format!("extra keys not allowed. No close matches found for `{key}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("connection", "conection"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_closest_match_respects_cutoff() {
        let keys = ["connection", "params", "priority"];
        assert_eq!(closest_match("conection", keys), Some("connection"));
        assert_eq!(closest_match("prio", keys), Some("priority"));
        assert_eq!(closest_match("pr", keys), None);
        assert_eq!(closest_match("xyz", keys), None);
    }

    #[test]
    fn test_preview_truncates() {
        let long = json!("x".repeat(80));
        let shown = preview(&long);
        assert_eq!(shown.len(), PREVIEW_LENGTH + 3);
        assert!(shown.ends_with("..."));

        assert_eq!(preview(&json!("a\nb")), "a\\nb");
        assert_eq!(preview(&json!({"a": 1})), "{\"a\":1}".escape_default().to_string());
    }

    #[test]
    fn test_extra_key_message() {
        let msg = extra_key_message("conection", &json!({"url": "x"}), ["connection"]);
        assert!(msg.starts_with("extra keys not allowed. Did you mean: `connection: "));

        let msg = extra_key_message("zzz", &json!(1), ["connection"]);
        assert_eq!(msg, "extra keys not allowed. No close matches found for `zzz`");
    }
}
