//! Pattern compilation: expression text into an immutable node arena.
//!
//! Compilation happens once, when a policy or rule is loaded. The
//! compiled form is a flat arena of nodes indexed by [`NodeId`];
//! matching never mutates it, so one compiled pattern serves any number
//! of concurrent matches.

use regex::Regex;
use thiserror::Error;

/// Largest value either repetition bound may take.
pub(crate) const MAX_REPETITIONS: usize = 32767;

/// Index of a node within its [`Pattern`] arena.
pub(crate) type NodeId = usize;

/// Errors from compiling a name pattern or applying an expansion
/// template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The expression has a structural problem.
    #[error("pattern syntax error: {reason}")]
    Syntax { reason: String },

    /// A component sub-expression is not a valid regular expression.
    #[error("component expression `{expr}` did not compile: {message}")]
    ComponentExpression { expr: String, message: String },

    /// A repetition range is inverted or beyond [`MAX_REPETITIONS`].
    #[error("bad repetition count in `{piece}`")]
    RepetitionRange { piece: String },

    /// A `\N` reference names a group that does not exist at that
    /// point.
    #[error("back reference \\{reference} is out of range")]
    BackrefRange { reference: String },

    /// An expansion template could not be parsed.
    #[error("bad expansion template: {reason}")]
    ExpandSyntax { reason: String },
}

/// One node of a compiled pattern.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    /// An ordered run of pieces. The match engine distributes
    /// components between them.
    Sequence { children: Vec<NodeId> },

    /// `(...)`: remembers the components its child matched.
    Group { child: NodeId },

    /// A piece repeated between `min` and `max` times.
    Repeat {
        child: NodeId,
        min: usize,
        max: usize,
    },

    /// `[...]` or `[^...]`: one component matching any (or none) of the
    /// member expressions.
    Set {
        members: Vec<NodeId>,
        inclusion: bool,
    },

    /// `<expr>`: one component whose escaped text matches the regular
    /// expression. `None` is the empty expression, which matches any
    /// single component.
    Component {
        regex: Option<Regex>,
        pseudo_ids: Vec<NodeId>,
    },

    /// A capture slot for one parenthesised group of a component
    /// expression. Never evaluated directly.
    Pseudo,

    /// `\N`: matches exactly the components group `N` captured.
    Backref { index: usize },
}

/// A compiled pattern-list expression: the arena, the capture slots in
/// declaration order, and the root sequence.
#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    nodes: Vec<Node>,
    groups: Vec<NodeId>,
    root: NodeId,
}

impl Pattern {
    pub(crate) fn parse(expr: &str) -> Result<Self, PatternError> {
        let mut compiler = Compiler {
            nodes: Vec::new(),
            groups: Vec::new(),
        };
        let root = compiler.sequence(expr)?;
        Ok(Self {
            nodes: compiler.nodes,
            groups: compiler.groups,
            root,
        })
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Capture slots (groups and component sub-captures) in declaration
    /// order. `\N` refers to `groups()[N - 1]`.
    pub(crate) fn groups(&self) -> &[NodeId] {
        &self.groups
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }
}

struct Compiler {
    nodes: Vec<Node>,
    groups: Vec<NodeId>,
}

impl Compiler {
    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn sequence(&mut self, expr: &str) -> Result<NodeId, PatternError> {
        let mut children = Vec::new();
        let mut index = 0;
        while index < expr.len() {
            let (child, next) = self.piece(expr, index)?;
            children.push(child);
            index = next;
        }
        Ok(self.alloc(Node::Sequence { children }))
    }

    /// Compiles one piece starting at `start` and returns it with the
    /// index just past the piece and its repetition suffix.
    fn piece(&mut self, expr: &str, start: usize) -> Result<(NodeId, usize), PatternError> {
        match expr.as_bytes()[start] {
            b'(' => {
                let inner_end = extract_balanced(expr, b'(', b')', start + 1)?;
                let end = extract_repetition(expr, inner_end)?;
                // The group registers before its repetition and before
                // any nested groups, keeping `\N` numbering outermost
                // first, left to right.
                let group = self.group(&expr[start..inner_end])?;
                if end == inner_end {
                    Ok((group, end))
                } else {
                    let (min, max) =
                        parse_repetition(&expr[inner_end..end], &expr[start..end])?;
                    Ok((
                        self.alloc(Node::Repeat {
                            child: group,
                            min,
                            max,
                        }),
                        end,
                    ))
                }
            }
            b'<' => {
                let inner_end = extract_balanced(expr, b'<', b'>', start + 1)?;
                self.set_piece(expr, start, inner_end)
            }
            b'[' => {
                let inner_end = extract_balanced(expr, b'[', b']', start + 1)?;
                self.set_piece(expr, start, inner_end)
            }
            b'\\' => {
                let bytes = expr.as_bytes();
                let mut index = start + 1;
                while index < bytes.len() && bytes[index].is_ascii_digit() {
                    index += 1;
                }
                let digits = &expr[start + 1..index];
                if digits.is_empty() {
                    return Err(PatternError::Syntax {
                        reason: format!("expected digits after \\ in `{expr}`"),
                    });
                }
                let reference = digits.parse::<usize>().ok().filter(|&n| {
                    n >= 1 && n <= self.groups.len()
                });
                match reference {
                    Some(index_value) => Ok((
                        self.alloc(Node::Backref { index: index_value }),
                        index,
                    )),
                    None => Err(PatternError::BackrefRange {
                        reference: digits.to_string(),
                    }),
                }
            }
            _ => Err(PatternError::Syntax {
                reason: format!("unexpected syntax at byte {start} in `{expr}`"),
            }),
        }
    }

    /// A `<...>` or `[...]` piece with an optional repetition suffix.
    fn set_piece(
        &mut self,
        expr: &str,
        start: usize,
        inner_end: usize,
    ) -> Result<(NodeId, usize), PatternError> {
        let end = extract_repetition(expr, inner_end)?;
        let set = self.component_set(&expr[start..inner_end])?;
        if end == inner_end {
            Ok((set, end))
        } else {
            let (min, max) = parse_repetition(&expr[inner_end..end], &expr[start..end])?;
            Ok((
                self.alloc(Node::Repeat {
                    child: set,
                    min,
                    max,
                }),
                end,
            ))
        }
    }

    /// `expr` is a complete `(...)` group.
    fn group(&mut self, expr: &str) -> Result<NodeId, PatternError> {
        if expr.len() < 2 || !expr.starts_with('(') || !expr.ends_with(')') {
            return Err(PatternError::Syntax {
                reason: format!("unrecognized group `{expr}`"),
            });
        }
        let id = self.alloc(Node::Group { child: NodeId::MAX });
        self.groups.push(id);
        let child = self.sequence(&expr[1..expr.len() - 1])?;
        if let Node::Group { child: slot } = &mut self.nodes[id] {
            *slot = child;
        }
        Ok(id)
    }

    /// `expr` is a complete `<...>` or `[...]` component set.
    fn component_set(&mut self, expr: &str) -> Result<NodeId, PatternError> {
        if expr.len() < 2 {
            return Err(PatternError::Syntax {
                reason: format!("cannot parse component set `{expr}`"),
            });
        }
        let bytes = expr.as_bytes();
        match bytes[0] {
            b'<' => {
                let end = extract_balanced(expr, b'<', b'>', 1)?;
                if end != expr.len() {
                    return Err(PatternError::Syntax {
                        reason: format!("component expr error in `{expr}`"),
                    });
                }
                self.component(&expr[1..end - 1])
            }
            b'[' => {
                let last = expr.len() - 1;
                if bytes[last] != b']' {
                    return Err(PatternError::Syntax {
                        reason: format!("no matching ']' in `{expr}`"),
                    });
                }
                let (mut index, inclusion) = if bytes[1] == b'^' {
                    (2, false)
                } else {
                    (1, true)
                };
                let mut members = Vec::new();
                while index < last {
                    if bytes[index] != b'<' {
                        return Err(PatternError::Syntax {
                            reason: format!("component expr error in `{expr}`"),
                        });
                    }
                    let end = extract_balanced(expr, b'<', b'>', index + 1)?;
                    members.push(self.component(&expr[index + 1..end - 1])?);
                    index = end;
                }
                if index != last {
                    return Err(PatternError::Syntax {
                        reason: format!("not sufficient expr to parse `{expr}`"),
                    });
                }
                Ok(self.alloc(Node::Set { members, inclusion }))
            }
            _ => Err(PatternError::Syntax {
                reason: format!("cannot parse component set `{expr}`"),
            }),
        }
    }

    /// A single component expression, without its angle brackets.
    fn component(&mut self, expr: &str) -> Result<NodeId, PatternError> {
        if expr.is_empty() {
            return Ok(self.alloc(Node::Component {
                regex: None,
                pseudo_ids: Vec::new(),
            }));
        }
        let regex = Regex::new(expr).map_err(|source| PatternError::ComponentExpression {
            expr: expr.to_string(),
            message: source.to_string(),
        })?;
        let group_count = regex.captures_len() - 1;
        let mut pseudo_ids = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            let id = self.alloc(Node::Pseudo);
            self.groups.push(id);
            pseudo_ids.push(id);
        }
        Ok(self.alloc(Node::Component {
            regex: Some(regex),
            pseudo_ids,
        }))
    }
}

/// Scans past the closer matching the opener just before `index`,
/// counting nesting, and returns the index after it.
fn extract_balanced(
    expr: &str,
    open: u8,
    close: u8,
    mut index: usize,
) -> Result<usize, PatternError> {
    let bytes = expr.as_bytes();
    let mut depth = 1usize;
    while depth > 0 {
        if index >= bytes.len() {
            return Err(PatternError::Syntax {
                reason: format!("unbalanced `{}` in `{expr}`", open as char),
            });
        }
        if bytes[index] == open {
            depth += 1;
        } else if bytes[index] == close {
            depth -= 1;
        }
        index += 1;
    }
    Ok(index)
}

/// Finds the end of the repetition suffix at `index`, if any.
fn extract_repetition(expr: &str, index: usize) -> Result<usize, PatternError> {
    let bytes = expr.as_bytes();
    if index == bytes.len() {
        return Ok(index);
    }
    match bytes[index] {
        b'+' | b'?' | b'*' => Ok(index + 1),
        b'{' => {
            let mut end = index;
            while bytes[end] != b'}' {
                end += 1;
                if end == bytes.len() {
                    return Err(PatternError::Syntax {
                        reason: format!("missing closing brace in `{expr}`"),
                    });
                }
            }
            Ok(end + 1)
        }
        _ => Ok(index),
    }
}

#[derive(Clone, Copy)]
enum Count {
    Value(usize),
    Overflow,
}

fn parse_count(digits: &str) -> Option<Count> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().map_or(Count::Overflow, Count::Value))
}

/// Parses a repetition suffix (`""`, `?`, `+`, `*`, `{n}`, `{n,}`,
/// `{,m}`, `{n,m}`) into inclusive bounds.
fn parse_repetition(rep: &str, piece: &str) -> Result<(usize, usize), PatternError> {
    let (min, max) = match rep {
        "" => (Count::Value(1), Count::Value(1)),
        "?" => (Count::Value(0), Count::Value(1)),
        "+" => (Count::Value(1), Count::Value(MAX_REPETITIONS)),
        "*" => (Count::Value(0), Count::Value(MAX_REPETITIONS)),
        _ => {
            let syntax_error = || PatternError::Syntax {
                reason: format!("unrecognized repetition in `{piece}`"),
            };
            let inner = rep
                .strip_prefix('{')
                .and_then(|r| r.strip_suffix('}'))
                .ok_or_else(syntax_error)?;
            match inner.split_once(',') {
                None => {
                    let count = parse_count(inner).ok_or_else(syntax_error)?;
                    (count, count)
                }
                Some((low, high)) => {
                    let min = if low.is_empty() {
                        Count::Value(0)
                    } else {
                        parse_count(low).ok_or_else(syntax_error)?
                    };
                    let max = if high.is_empty() {
                        if low.is_empty() {
                            return Err(syntax_error());
                        }
                        Count::Value(MAX_REPETITIONS)
                    } else {
                        parse_count(high).ok_or_else(syntax_error)?
                    };
                    (min, max)
                }
            }
        }
    };
    match (min, max) {
        (Count::Value(min), Count::Value(max))
            if min <= max && min <= MAX_REPETITIONS && max <= MAX_REPETITIONS =>
        {
            Ok((min, max))
        }
        _ => Err(PatternError::RepetitionRange {
            piece: piece.to_string(),
        }),
    }
}
