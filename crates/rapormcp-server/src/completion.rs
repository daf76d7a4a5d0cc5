//! Fuzzy matching for argument completion.

use rapormcp_protocol::Completion;

/// Maximum number of values returned in one completion.
pub const MAX_COMPLETION_VALUES: usize = 100;

/// Minimum Jaro-Winkler similarity for a non-substring match.
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Ranks `candidates` against a partially typed `value`.
///
/// An empty value returns every candidate in order. Otherwise candidates
/// containing the value (case-insensitively) come first, earliest match
/// position first, followed by candidates whose Jaro-Winkler similarity to
/// the value is at least 0.8, most similar first. At most
/// [`MAX_COMPLETION_VALUES`] values are returned; `total` counts every match.
///
/// ```
/// use rapormcp_server::completion::fuzzy_complete;
///
/// let completion = fuzzy_complete(&["Matematika", "Fisika", "Biologi"], "ika");
/// assert_eq!(completion.values, vec!["Fisika", "Matematika"]);
/// ```
pub fn fuzzy_complete<S: AsRef<str>>(candidates: &[S], value: &str) -> Completion {
    let needle = value.to_lowercase();
    let mut scored: Vec<(u8, f64, &str)> = Vec::new();

    for candidate in candidates {
        let candidate = candidate.as_ref();
        if needle.is_empty() {
            scored.push((0, 0.0, candidate));
            continue;
        }
        let haystack = candidate.to_lowercase();
        if let Some(position) = haystack.find(&needle) {
            // Lower is better for substring hits.
            scored.push((0, position as f64, candidate));
        } else {
            let similarity = strsim::jaro_winkler(&haystack, &needle);
            if similarity >= SIMILARITY_THRESHOLD {
                scored.push((1, -similarity, candidate));
            }
        }
    }

    // Stable sort keeps declaration order among equal scores.
    scored.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let total = scored.len();
    let values: Vec<String> = scored
        .into_iter()
        .take(MAX_COMPLETION_VALUES)
        .map(|(_, _, candidate)| candidate.to_string())
        .collect();
    Completion {
        has_more: (total > values.len()).then_some(true),
        total: Some(total),
        values,
    }
}
