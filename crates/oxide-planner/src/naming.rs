//! Column naming policies applied when a snapshot is built.

use serde::{Deserialize, Serialize};

/// How column keys are named in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnNamePolicy {
    /// Keep names as declared.
    #[default]
    Preserve,
    /// Convert names to `snake_case`.
    SnakeCase,
}

impl ColumnNamePolicy {
    /// Maps a declared column name to its snapshot key.
    #[must_use]
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::Preserve => name.to_string(),
            Self::SnakeCase => snake_case(name),
        }
    }
}

/// Converts `camelCase`, `PascalCase`, `kebab-case` or spaced names to
/// `snake_case`. Acronyms stay grouped: `HTTPServer` becomes `http_server`.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' || c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}
