//! Compact single-hunk diff excerpts for edit previews.

/// Render the first changed line of `old` vs `new` with one line of context.
///
/// Returns `"Content unchanged"` when both texts are equal.
pub fn first_change_excerpt(old: &str, new: &str) -> String {
    if old == new {
        return "Content unchanged".to_string();
    }
    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();
    let longest = old_lines.len().max(new_lines.len());

    let Some(idx) = (0..longest).find(|&i| old_lines.get(i) != new_lines.get(i)) else {
        return "Content will change".to_string();
    };

    let mut excerpt = Vec::new();
    if idx > 0 {
        excerpt.push(format!("  {}", new_lines[idx - 1]));
    }
    excerpt.push(format!("Line {}:", idx + 1));
    if let Some(line) = old_lines.get(idx) {
        excerpt.push(format!("- {line}"));
    }
    if let Some(line) = new_lines.get(idx) {
        excerpt.push(format!("+ {line}"));
    }
    if let Some(line) = new_lines.get(idx + 1) {
        excerpt.push(format!("  {line}"));
    }
    excerpt.join("\n")
}
