//! Matching a wanted model name against the installed set.

use serde::Serialize;

/// How a wanted model name was matched to an installed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMatch {
    Exact,
    /// Same name ignoring the `:tag` suffix.
    BaseName,
    /// Closest name by normalized edit distance.
    Fuzzy,
    /// Nothing matched; the configured default was used.
    Default,
}

/// `llama3:latest` -> `llama3`, `library/phi3:mini` -> `phi3`.
pub fn base_name(model: &str) -> &str {
    let name = model.rsplit('/').next().unwrap_or(model);
    name.split(':').next().unwrap_or(name)
}

pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// `1 - distance / max_len`, in `[0, 1]`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
}

/// Find `wanted` in `available`: exact name, then same base name (an
/// untagged `:latest` preferred), then the most similar name at or above
/// `cutoff`. Earlier entries win ties.
pub fn match_available(wanted: &str, available: &[String], cutoff: f64) -> Option<(String, ModelMatch)> {
    if available.iter().any(|m| m == wanted) {
        return Some((wanted.to_string(), ModelMatch::Exact));
    }

    let wanted_base = base_name(wanted).to_lowercase();
    let same_base: Vec<&String> = available.iter().filter(|m| base_name(m).to_lowercase() == wanted_base).collect();
    let latest = format!("{wanted_base}:latest");
    if let Some(m) = same_base.iter().find(|m| m.to_lowercase() == latest).or_else(|| same_base.first()) {
        return Some(((*m).clone(), ModelMatch::BaseName));
    }

    let wanted_lower = wanted.to_lowercase();
    let mut best: Option<(&String, f64)> = None;
    for candidate in available {
        let score = similarity(&wanted_lower, &candidate.to_lowercase())
            .max(similarity(&wanted_base, &base_name(candidate).to_lowercase()));
        if score >= cutoff && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(m, _)| (m.clone(), ModelMatch::Fuzzy))
}
