//! NDN name patterns.
//!
//! A pattern describes a set of names, component by component:
//!
//! ```text
//! <expr>      one component whose escaped text matches the regular
//!             expression `expr`; `<>` matches any single component
//! [<a><b>]    one component matching any of the listed expressions
//! [^<a><b>]   one component matching none of them
//! (...)       a capture group
//! \N          the same components group N captured earlier
//! ?, *, +, {n}, {n,}, {,m}, {n,m}
//!             repetition of the preceding piece
//! ^, $        anchor to the start or end of the name
//! ```
//!
//! Groups number from 1 in order of their opening delimiter, and a
//! parenthesised sub-expression inside a component regex counts as a
//! group too. An unanchored pattern floats: without `^` any prefix may
//! precede the match, without `$` any suffix may follow it.
//!
//! A successful match yields a [`PatternMatch`], whose
//! [`expand`](PatternMatch::expand) rebuilds a name from a template of
//! literal `<component>` items and `\N` group references (`\0` is the
//! entire match). Patterns compile once and match without interior
//! mutability, so a compiled [`NamePattern`] can be shared freely.

mod compile;
mod engine;

pub use compile::PatternError;

use compile::Pattern;
use engine::{MatchState, Search};

use crate::name::{Component, Name};

/// A compiled name pattern.
#[derive(Debug, Clone)]
pub struct NamePattern {
    expr: String,
    expand: String,
    primary: Pattern,
    secondary: Option<Pattern>,
}

impl NamePattern {
    pub fn new(expr: &str) -> Result<Self, PatternError> {
        Self::with_expand(expr, "")
    }

    /// Compiles a pattern carrying a default expansion template, used
    /// by [`PatternMatch::expand`] when called with an empty template.
    pub fn with_expand(expr: &str, expand: &str) -> Result<Self, PatternError> {
        if expr.is_empty() {
            return Err(PatternError::Syntax {
                reason: "empty pattern".to_string(),
            });
        }
        // `$` pins the end of the name; otherwise any suffix may
        // follow. `^` pins the start; otherwise a secondary pattern
        // accepts any prefix. The prefix piece adds no groups, so group
        // numbering agrees between the two.
        let trimmed = match expr.strip_suffix('$') {
            Some(stripped) => stripped.to_string(),
            None => format!("{expr}<.*>*"),
        };
        let (primary_expr, secondary) = match trimmed.strip_prefix('^') {
            Some(stripped) => (stripped.to_string(), None),
            None => {
                let secondary = Pattern::parse(&format!("<.*>*{trimmed}"))?;
                (trimmed, Some(secondary))
            }
        };
        let primary = Pattern::parse(&primary_expr)?;
        Ok(Self {
            expr: expr.to_string(),
            expand: expand.to_string(),
            primary,
            secondary,
        })
    }

    /// Builds the pattern matching any name `name` is a prefix of, or
    /// exactly `name` when `has_anchor` is set.
    pub fn from_name(name: &Name, has_anchor: bool) -> Result<Self, PatternError> {
        let mut expr = String::from("^");
        for component in name {
            expr.push('<');
            push_literal_regex(&mut expr, &component.to_escaped_string());
            expr.push('>');
        }
        if has_anchor {
            expr.push('$');
        }
        Self::new(&expr)
    }

    /// The expression this pattern was compiled from.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn is_match(&self, name: &Name) -> bool {
        self.captures(name).is_some()
    }

    /// Matches `name`, returning the captured groups on success.
    pub fn captures(&self, name: &Name) -> Option<PatternMatch> {
        let components = name.components();
        for pattern in std::iter::once(&self.primary).chain(self.secondary.as_ref()) {
            let mut state = MatchState::new(pattern.node_count());
            let search = Search {
                pattern,
                name: components,
            };
            if search.matches(&mut state) {
                let groups = pattern
                    .groups()
                    .iter()
                    .map(|&id| state.result(id).to_vec())
                    .collect();
                return Some(PatternMatch {
                    matched: components.to_vec(),
                    groups,
                    expand: self.expand.clone(),
                });
            }
        }
        None
    }
}

/// Appends `text` to `out` with regular-expression metacharacters
/// backslash-escaped.
fn push_literal_regex(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(
            c,
            '.' | '[' | '{' | '}' | '(' | ')' | '\\' | '*' | '+' | '?' | '|' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// A successful match: the matched components and every capture group
/// in declaration order.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    matched: Vec<Component>,
    groups: Vec<Vec<Component>>,
    expand: String,
}

impl PatternMatch {
    /// The components the pattern matched, which is always the whole
    /// name.
    pub fn matched(&self) -> &[Component] {
        &self.matched
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Group `index`, zero-based. Template references `\N` use
    /// `N = index + 1`.
    pub fn group(&self, index: usize) -> Option<&[Component]> {
        self.groups.get(index).map(Vec::as_slice)
    }

    /// Rebuilds a name from `template`, a run of literal `<component>`
    /// items and `\N` group references. Literal items are URI segments,
    /// so percent-escapes decode. An empty template falls back to the
    /// one the pattern was compiled with.
    pub fn expand(&self, template: &str) -> Result<Name, PatternError> {
        let using = if template.is_empty() {
            self.expand.as_str()
        } else {
            template
        };
        let bytes = using.as_bytes();
        let mut result = Name::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match bytes[offset] {
                b'<' => {
                    let end = component_item_end(using, offset)?;
                    if let Some(component) =
                        Component::from_escaped_string(&using[offset + 1..end - 1])
                    {
                        result.push(component);
                    }
                    offset = end;
                }
                b'\\' => {
                    let mut index = offset + 1;
                    while index < bytes.len() && bytes[index].is_ascii_digit() {
                        index += 1;
                    }
                    let digits = &using[offset + 1..index];
                    if digits.is_empty() {
                        return Err(PatternError::ExpandSyntax {
                            reason: format!("expected digits after \\ in template `{using}`"),
                        });
                    }
                    let out_of_range = || PatternError::BackrefRange {
                        reference: digits.to_string(),
                    };
                    let reference: usize = digits.parse().map_err(|_| out_of_range())?;
                    if reference == 0 {
                        for component in &self.matched {
                            result.push(component.clone());
                        }
                    } else {
                        let group = self.groups.get(reference - 1).ok_or_else(out_of_range)?;
                        for component in group {
                            result.push(component.clone());
                        }
                    }
                    offset = index;
                }
                _ => {
                    return Err(PatternError::ExpandSyntax {
                        reason: format!("unexpected character in template `{using}`"),
                    });
                }
            }
        }
        Ok(result)
    }
}

/// Finds the index just past the `>` closing the `<` at `start`,
/// counting nesting.
fn component_item_end(template: &str, start: usize) -> Result<usize, PatternError> {
    let bytes = template.as_bytes();
    let mut depth = 1usize;
    let mut index = start + 1;
    while depth > 0 {
        if index >= bytes.len() {
            return Err(PatternError::ExpandSyntax {
                reason: format!("unterminated component in template `{template}`"),
            });
        }
        match bytes[index] {
            b'<' => depth += 1,
            b'>' => depth -= 1,
            _ => {}
        }
        index += 1;
    }
    Ok(index)
}
