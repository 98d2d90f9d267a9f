//! The backtracking match engine.
//!
//! Matching distributes a name's components across the pattern's nodes
//! with a greedy, longest-first split search: each piece first tries to
//! take every remaining component, then gives back one at a time until
//! the rest of the pattern fits. Capture state lives outside the
//! compiled pattern, so concurrent matches never share mutable data.
//!
//! Captures follow last-write semantics: a group inside a repetition
//! keeps its final iteration, and a component sub-capture keeps the
//! last component expression attempt that succeeded, even on a branch
//! the search later abandoned.

use super::compile::{Node, NodeId, Pattern};
use crate::name::Component;

/// Caps the recursion of the split search. A search that exceeds it
/// (deeply nested repetitions over zero-width matches) fails the match
/// rather than the stack.
const MAX_MATCH_DEPTH: usize = 2048;

/// Mutable capture state for one match attempt, indexed by node.
pub(crate) struct MatchState {
    results: Vec<Vec<Component>>,
}

impl MatchState {
    pub(crate) fn new(node_count: usize) -> Self {
        Self {
            results: vec![Vec::new(); node_count],
        }
    }

    pub(crate) fn result(&self, id: NodeId) -> &[Component] {
        &self.results[id]
    }
}

/// One match attempt of `pattern` against `name`.
pub(crate) struct Search<'a> {
    pub(crate) pattern: &'a Pattern,
    pub(crate) name: &'a [Component],
}

impl Search<'_> {
    pub(crate) fn matches(&self, state: &mut MatchState) -> bool {
        self.eval(state, self.pattern.root(), 0, self.name.len(), 0)
    }

    /// Does node `id` match exactly `name[offset..offset + len]`?
    fn eval(
        &self,
        state: &mut MatchState,
        id: NodeId,
        offset: usize,
        len: usize,
        depth: usize,
    ) -> bool {
        if depth > MAX_MATCH_DEPTH {
            return false;
        }
        match self.pattern.node(id) {
            Node::Sequence { .. } => self.eval_sequence(state, id, 0, offset, len, depth),
            Node::Group { child } => {
                let child = *child;
                state.results[id].clear();
                if self.eval(state, child, offset, len, depth + 1) {
                    state.results[id] = self.name[offset..offset + len].to_vec();
                    true
                } else {
                    false
                }
            }
            Node::Repeat { .. } => self.eval_repeat(state, id, 0, offset, len, depth),
            Node::Set { members, inclusion } => {
                if len != 1 {
                    return false;
                }
                let mut matched = false;
                for &member in members {
                    if self.eval(state, member, offset, len, depth + 1) {
                        matched = true;
                        break;
                    }
                }
                matched == *inclusion
            }
            Node::Component { regex, pseudo_ids } => {
                if len != 1 {
                    return false;
                }
                let Some(regex) = regex else {
                    // The empty expression matches any one component.
                    return true;
                };
                let escaped = self.name[offset].to_escaped_string();
                let Some(captures) = regex.captures(&escaped) else {
                    return false;
                };
                for (index, &pseudo) in pseudo_ids.iter().enumerate() {
                    // Captured text is escaped component text; decode
                    // it back into component bytes.
                    let capture = captures
                        .get(index + 1)
                        .and_then(|m| Component::from_escaped_string(m.as_str()))
                        .unwrap_or_default();
                    state.results[pseudo] = vec![capture];
                }
                true
            }
            Node::Pseudo => false,
            Node::Backref { index } => {
                let Some(&group) = self.pattern.groups().get(index - 1) else {
                    return false;
                };
                state.result(group) == &self.name[offset..offset + len]
            }
        }
    }

    fn eval_sequence(
        &self,
        state: &mut MatchState,
        id: NodeId,
        child_index: usize,
        offset: usize,
        len: usize,
        depth: usize,
    ) -> bool {
        if depth > MAX_MATCH_DEPTH {
            return false;
        }
        let Node::Sequence { children } = self.pattern.node(id) else {
            return false;
        };
        let Some(&child) = children.get(child_index) else {
            return len == 0;
        };
        let mut tried = len;
        loop {
            if self.eval(state, child, offset, tried, depth + 1)
                && self.eval_sequence(state, id, child_index + 1, offset + tried, len - tried, depth + 1)
            {
                return true;
            }
            if tried == 0 {
                return false;
            }
            tried -= 1;
        }
    }

    fn eval_repeat(
        &self,
        state: &mut MatchState,
        id: NodeId,
        iteration: usize,
        offset: usize,
        len: usize,
        depth: usize,
    ) -> bool {
        if depth > MAX_MATCH_DEPTH {
            return false;
        }
        let Node::Repeat { child, min, max } = self.pattern.node(id) else {
            return false;
        };
        let (child, min, max) = (*child, *min, *max);
        if len == 0 {
            return iteration >= min;
        }
        if iteration >= max {
            return false;
        }
        let mut tried = len;
        loop {
            if self.eval(state, child, offset, tried, depth + 1)
                && self.eval_repeat(state, id, iteration + 1, offset + tried, len - tried, depth + 1)
            {
                return true;
            }
            if tried == 0 {
                return false;
            }
            tried -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(uri: &str) -> Vec<Component> {
        crate::name::Name::from_uri(uri).components().to_vec()
    }

    fn matches(expr: &str, uri: &str) -> bool {
        let pattern = Pattern::parse(expr).unwrap();
        let name = components(uri);
        let search = Search {
            pattern: &pattern,
            name: &name,
        };
        search.matches(&mut MatchState::new(pattern.node_count()))
    }

    #[test]
    fn sequences_consume_the_whole_span() {
        assert!(matches("<a><b><c>", "/a/b/c"));
        assert!(!matches("<a><b><c>", "/a/b"));
        assert!(!matches("<a><b>", "/a/b/c"));
        assert!(matches("", "/"));
        assert!(!matches("", "/a"));
    }

    #[test]
    fn repetition_bounds_are_inclusive() {
        assert!(matches("<a>{2,3}", "/a/a"));
        assert!(matches("<a>{2,3}", "/a/a/a"));
        assert!(!matches("<a>{2,3}", "/a"));
        assert!(!matches("<a>{2,3}", "/a/a/a/a"));
        assert!(matches("<a>*", "/"));
        assert!(!matches("<a>+", "/"));
    }

    #[test]
    fn sets_take_exactly_one_component() {
        assert!(matches("[<a><b>]", "/b"));
        assert!(!matches("[<a><b>]", "/c"));
        assert!(!matches("[<a><b>]", "/a/b"));
        assert!(matches("[^<a><b>]", "/c"));
        assert!(!matches("[^<a><b>]", "/a"));
        // An empty exclusion set excludes nothing.
        assert!(matches("[^]", "/anything"));
        assert!(!matches("[]", "/anything"));
    }

    #[test]
    fn backrefs_compare_captured_components() {
        assert!(matches("(<>)<sep>\\1", "/x/sep/x"));
        assert!(!matches("(<>)<sep>\\1", "/x/sep/y"));
        assert!(matches("(<>*)<mid>\\1", "/a/b/mid/a/b"));
    }

    #[test]
    fn deep_zero_width_repeats_cut_off_instead_of_overflowing() {
        // Satisfying this literally takes tens of thousands of
        // zero-width iterations; the engine draws the line at
        // MAX_MATCH_DEPTH and reports no match.
        assert!(!matches("(<a>*){30000}", "/a"));
    }
}
