use std::ops::Range;

use serde::Serialize;

use crate::scope::Scope;

/// Where a search is allowed to look and match.
///
/// An immutable value threaded through the tokenizer tree; narrowing it
/// produces a new context.
#[derive(Debug, Clone)]
pub struct TokenizerContext {
    /// Candidate matches must start within this half-open byte range
    pub(crate) range: Range<usize>,
    /// When set, a candidate match must additionally start before this
    /// offset. Used to stop a begin-pattern search from crossing into
    /// territory already claimed by a sibling's end pattern.
    pub(crate) upper_bound: Option<usize>,
    /// True only for the very first line of a tokenization pass; enables the
    /// buffer-start anchor. Never re-true for continuation lines.
    pub(crate) is_first_line: bool,
}

impl TokenizerContext {
    pub fn new(range: Range<usize>) -> Self {
        Self {
            range,
            upper_bound: None,
            is_first_line: true,
        }
    }

    pub(crate) fn with_range(mut self, range: Range<usize>) -> Self {
        self.range = range;
        self
    }

    pub(crate) fn with_upper_bound(mut self, upper_bound: Option<usize>) -> Self {
        self.upper_bound = upper_bound;
        self
    }

    pub(crate) fn with_first_line(mut self, is_first_line: bool) -> Self {
        self.is_first_line = is_first_line;
        self
    }
}

/// Zero or more sibling nodes spanning the union of their ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenizerResult {
    pub range: Range<usize>,
    pub nodes: Vec<SyntaxNode>,
}

impl TokenizerResult {
    pub(crate) fn from_node(node: SyntaxNode) -> Self {
        Self {
            range: node.range.clone(),
            nodes: vec![node],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// The output tree unit: a scoped byte range plus ordered, mutually
/// non-overlapping children contained in it. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxNode {
    pub scope: Option<Scope>,
    pub range: Range<usize>,
    pub nodes: Vec<SyntaxNode>,
}
