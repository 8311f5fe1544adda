//! Deterministic keyword-based agent selection.

/// Return the first candidate whose keyword set matches `task`.
///
/// Matching is a case-insensitive substring test. Candidates are checked in
/// iteration order and the first hit wins, so callers control precedence by
/// ordering.
pub fn select_by_keywords<'a, I, K>(task: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, K)>,
    K: IntoIterator<Item = &'a String>,
{
    let task_lower = task.to_lowercase();
    candidates.into_iter().find_map(|(name, keywords)| {
        keywords
            .into_iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .any(|keyword| !keyword.is_empty() && task_lower.contains(&keyword))
            .then_some(name)
    })
}
