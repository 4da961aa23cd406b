//! Story path patterns.
//!
//! Patterns use the `glob` crate syntax (`*`, `**`, `?`, `[..]`) extended with
//! alternative groups, either brace style `{tsx,ts}` or extglob style
//! `@(tsx|ts)`. Alternatives are expanded up front into plain glob patterns.

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled story path pattern.
#[derive(Debug, Clone)]
pub struct StoryPattern {
    source: String,
    patterns: Vec<Pattern>,
}

/// Errors that can occur when compiling a pattern.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Unbalanced alternative group in pattern: {0}")]
    Unbalanced(String),

    #[error("Invalid pattern {pattern}: {message}")]
    Invalid { pattern: String, message: String },
}

impl StoryPattern {
    /// Compile a pattern, expanding every alternative group.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let patterns = expand_alternatives(pattern)?
            .iter()
            .map(|expanded| {
                Pattern::new(expanded).map_err(|e| PatternError::Invalid {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_string(),
            patterns,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Expanded plain glob patterns.
    pub fn expanded(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }

    /// Check a path relative to the scan root.
    pub fn matches(&self, relative: &Path) -> bool {
        let normalized = to_slash(relative);
        self.patterns
            .iter()
            .any(|p| p.matches_with(&normalized, MATCH_OPTIONS))
    }
}

/// Render a relative path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Find the first alternative group: (start, opener length, separator).
fn find_group(pattern: &str) -> Option<(usize, usize, char)> {
    let bytes = pattern.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'{' => return Some((i, 1, ',')),
            b'@' if bytes.get(i + 1) == Some(&b'(') => return Some((i, 2, '|')),
            _ => {}
        }
    }
    None
}

fn expand_alternatives(pattern: &str) -> Result<Vec<String>, PatternError> {
    let Some((start, opener_len, separator)) = find_group(pattern) else {
        return Ok(vec![pattern.to_string()]);
    };

    let body_start = start + opener_len;
    let mut depth = 0usize;
    let mut alternatives = Vec::new();
    let mut current = String::new();
    let mut end = None;

    for (offset, c) in pattern[body_start..].char_indices() {
        match c {
            '{' | '(' => {
                depth += 1;
                current.push(c);
            }
            '}' | ')' if depth == 0 => {
                alternatives.push(std::mem::take(&mut current));
                end = Some(body_start + offset);
                break;
            }
            '}' | ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c == separator && depth == 0 => {
                alternatives.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }

    let end = end.ok_or_else(|| PatternError::Unbalanced(pattern.to_string()))?;
    let prefix = &pattern[..start];
    let suffix = &pattern[end + 1..];

    let mut expanded = Vec::new();
    for alternative in alternatives {
        expanded.extend(expand_alternatives(&format!(
            "{prefix}{alternative}{suffix}"
        ))?);
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expands_extglob_groups() {
        let expanded = expand_alternatives("src/**/*.vitrine.@(tsx|ts)").unwrap();
        assert_eq!(
            expanded,
            vec!["src/**/*.vitrine.tsx", "src/**/*.vitrine.ts"]
        );
    }

    #[test]
    fn expands_nested_braces() {
        let expanded = expand_alternatives("{a,b{1,2}}.js").unwrap();
        assert_eq!(expanded, vec!["a.js", "b1.js", "b2.js"]);
    }

    #[test]
    fn errors_on_unclosed_group() {
        let result = StoryPattern::new("src/*.@(tsx|ts");
        assert!(matches!(result, Err(PatternError::Unbalanced(_))));
    }

    #[test]
    fn matches_nested_story_files() {
        let pattern = StoryPattern::new("src/**/*.vitrine.@(tsx|jsx)").unwrap();

        assert!(pattern.matches(Path::new("src/Button.vitrine.tsx")));
        assert!(pattern.matches(Path::new("src/forms/Input.vitrine.jsx")));
        assert!(!pattern.matches(Path::new("src/Button.tsx")));
        assert!(!pattern.matches(Path::new("lib/Button.vitrine.tsx")));
    }

    #[test]
    fn single_star_stays_in_one_directory() {
        let pattern = StoryPattern::new("src/*.tsx").unwrap();

        assert!(pattern.matches(Path::new("src/Button.tsx")));
        assert!(!pattern.matches(Path::new("src/forms/Input.tsx")));
    }
}
