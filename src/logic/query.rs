//! Query string parsing.
//!
//! Grammar: groups separated by `|` are alternatives; whitespace-separated
//! tokens inside a group must all match. A token may start with a field
//! prefix (`@` mod, `#` tooltip, `$` tag, `%` category) and may be wrapped in
//! double quotes to require an exact whole-value match. Separators inside
//! quotes are literal.

use std::fmt;

use crate::index::SearchField;
use crate::util::normalize;

/// How a token text is compared with field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Value contains the text.
    Substring,
    /// Value equals the text.
    Exact,
}

/// One normalized search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchToken {
    /// Normalized text, never empty.
    pub text: String,
    /// Comparison mode.
    pub mode: MatchMode,
    /// Field restriction; `None` searches every field.
    pub field: Option<SearchField>,
}

/// Parsed query: OR of AND-groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Non-empty groups of non-empty tokens.
    pub groups: Vec<Vec<SearchToken>>,
}

impl Query {
    /// `true` when the query selects every visible entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Malformed query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A double quote opened at this char offset was never closed.
    UnterminatedQuote {
        /// Char offset of the opening quote.
        offset: usize,
    },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedQuote { offset } => {
                write!(f, "unterminated quote starting at character {offset}")
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// What: Parse a raw query string.
///
/// Inputs:
/// - `raw`: Text typed by the user, any case.
///
/// Output:
/// - `Query` with empty tokens and empty groups removed.
///
/// # Errors
/// - `QueryError::UnterminatedQuote` when a double quote is left open.
pub fn parse_query(raw: &str) -> Result<Query, QueryError> {
    let mut groups: Vec<Vec<SearchToken>> = Vec::new();
    let mut group: Vec<SearchToken> = Vec::new();
    let mut current = String::new();
    let mut quote_start: Option<usize> = None;

    for (offset, c) in raw.chars().enumerate() {
        match c {
            '"' => {
                quote_start = match quote_start {
                    Some(_) => None,
                    None => Some(offset),
                };
                current.push(c);
            }
            '|' if quote_start.is_none() => {
                push_token(&mut group, &mut current);
                if !group.is_empty() {
                    groups.push(std::mem::take(&mut group));
                }
            }
            c if c.is_whitespace() && quote_start.is_none() => {
                push_token(&mut group, &mut current);
            }
            c => current.push(c),
        }
    }
    if let Some(offset) = quote_start {
        return Err(QueryError::UnterminatedQuote { offset });
    }
    push_token(&mut group, &mut current);
    if !group.is_empty() {
        groups.push(group);
    }
    Ok(Query { groups })
}

/// Turn the raw token text in `current` into a `SearchToken`, if non-empty.
fn push_token(group: &mut Vec<SearchToken>, current: &mut String) {
    let raw = std::mem::take(current);
    let mut rest = raw.as_str();
    let field = rest.chars().next().and_then(SearchField::from_prefix);
    if field.is_some() {
        rest = &rest[1..];
    }
    let quoted = rest.len() >= 2 && rest.starts_with('"') && rest.ends_with('"');
    let (mode, body) = if quoted {
        (MatchMode::Exact, &rest[1..rest.len() - 1])
    } else {
        (MatchMode::Substring, rest)
    };
    let text = normalize(&body.replace('"', ""));
    if text.is_empty() {
        return;
    }
    group.push(SearchToken { text, mode, field });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substring(text: &str) -> SearchToken {
        SearchToken {
            text: text.into(),
            mode: MatchMode::Substring,
            field: None,
        }
    }

    #[test]
    /// What: Whitespace ANDs, pipes OR, case folds
    ///
    /// - Input: "Iron Pick | gold"
    /// - Output: [[iron, pick], [gold]]
    fn groups_and_tokens() {
        let q = parse_query("Iron Pick | gold").expect("parses");
        assert_eq!(
            q.groups,
            vec![vec![substring("iron"), substring("pick")], vec![substring("gold")]]
        );
    }

    #[test]
    /// What: Empty tokens and groups disappear
    fn drops_empty_tokens_and_groups() {
        assert!(parse_query("   ").expect("parses").is_empty());
        assert!(parse_query("| |").expect("parses").is_empty());
        assert!(parse_query("@ \"\"").expect("parses").is_empty());
        assert_eq!(parse_query("a||b").expect("parses").groups.len(), 2);
    }

    #[test]
    /// What: Prefixes restrict fields and quotes request exact matches
    fn prefixes_and_quotes() {
        let q = parse_query("@\"Basic Tools\" $ore %blocks #\"mining level 2\"").expect("parses");
        let tokens = &q.groups[0];
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].text, "basic tools");
        assert_eq!(tokens[0].mode, MatchMode::Exact);
        assert_eq!(tokens[0].field, Some(SearchField::Mod));
        assert_eq!(tokens[1].field, Some(SearchField::Tag));
        assert_eq!(tokens[1].mode, MatchMode::Substring);
        assert_eq!(tokens[2].field, Some(SearchField::Category));
        assert_eq!(tokens[3].field, Some(SearchField::Tooltip));
        assert_eq!(tokens[3].text, "mining level 2");
    }

    #[test]
    /// What: A pipe inside quotes is literal text
    fn pipe_inside_quotes() {
        let q = parse_query("\"a|b\"").expect("parses");
        assert_eq!(q.groups.len(), 1);
        assert_eq!(q.groups[0][0].text, "a|b");
    }

    #[test]
    /// What: An open quote is rejected with its position
    fn unterminated_quote() {
        assert_eq!(
            parse_query("iron \"pick"),
            Err(QueryError::UnterminatedQuote { offset: 5 })
        );
    }
}
