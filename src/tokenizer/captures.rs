use std::ops::Range;
use std::sync::Arc;

use crate::grammars::SearchResult;
use crate::scope::ScopeName;

use super::{SyntaxNode, TokenizerContext, TokenizerNode, apply_all};

/// Which group of the enclosing match a capture entry addresses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum CaptureRef {
    Index(usize),
    Name(String),
}

impl CaptureRef {
    pub(crate) fn parse(key: &str) -> CaptureRef {
        match key.parse::<usize>() {
            Ok(index) => CaptureRef::Index(index),
            Err(_) => CaptureRef::Name(key.to_owned()),
        }
    }
}

/// Compiled form of one capture table entry.
pub(crate) struct CaptureTokenizer {
    pub(crate) group: CaptureRef,
    pub(crate) name: Option<ScopeName>,
    pub(crate) tokenizers: Vec<Arc<TokenizerNode>>,
}

/// Re-tokenizes every non-empty group instance with the capture's nested
/// patterns and wraps the outcome in a node carrying the capture's scope.
///
/// Scope name templates resolve against the enclosing match, per instance:
/// `$n` placeholders take the text of that occurrence's group `n`.
pub(crate) fn apply_captures(
    captures: &[CaptureTokenizer],
    text: &str,
    found: &SearchResult,
) -> Vec<SyntaxNode> {
    let mut nodes = Vec::new();

    for capture in captures {
        let mut groups: Vec<Range<usize>> = Vec::new();
        match &capture.group {
            CaptureRef::Index(index) => groups.extend(found.group(*index)),
            CaptureRef::Name(name) => {
                if let Some(indices) = found.names.get(name) {
                    groups.extend(indices.iter().filter_map(|&i| found.group(i)));
                }
            }
        }

        for range in groups.into_iter().filter(|r| !r.is_empty()) {
            let nested = apply_all(
                &capture.tokenizers,
                text,
                &TokenizerContext::new(range.clone()),
            );
            nodes.push(SyntaxNode {
                scope: capture.name.as_ref().map(|n| n.resolve_in(text, found)),
                range,
                nodes: nested.map(|r| r.nodes).unwrap_or_default(),
            });
        }
    }

    nodes
}
