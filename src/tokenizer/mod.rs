//! The executable tokenizer tree compiled from a grammar.
//!
//! Every node obeys the same two-phase contract: `search` probes for the
//! earliest match in a context and reports its range plus a deferred
//! producer; only the winning candidate's producer is committed. Grammars
//! commonly have tens of sibling alternatives per position and only one is
//! ever materialized, so building a discarded candidate's subtree must have
//! no observable effect.

mod captures;
mod compile;
mod context;
mod range;

pub use compile::TokenizerRepository;
pub use context::{SyntaxNode, TokenizerContext, TokenizerResult};

use std::ops::Range;
use std::sync::{Arc, OnceLock, Weak};

use rayon::prelude::*;

use crate::grammars::{MatchRegex, SearchResult};
use crate::scope::ScopeName;
use crate::text;

use captures::{CaptureTokenizer, apply_captures};
use compile::{IncludeRef, SELF_REFERENCE};
use range::{BeginEndTokenizer, BeginWhileTokenizer};

/// The tokenization entry point handed to consumers.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Option<TokenizerResult>;
    fn tokenize_in(&self, text: &str, range: Range<usize>) -> Option<TokenizerResult>;
}

/// One compiled grammar rule.
///
/// A closed set: the grammar format defines exactly these five behaviours,
/// so dispatch is an exhaustive match.
pub(crate) enum TokenizerNode {
    Match(MatchTokenizer),
    BeginEnd(BeginEndTokenizer),
    BeginWhile(BeginWhileTokenizer),
    Include(IncludeTokenizer),
    Patterns(PatternsListTokenizer),
}

/// A successful probe: where the candidate matched, plus the deferred
/// producer of its syntax nodes. Producers own everything they need, so a
/// probe borrows nothing but the text.
pub(crate) struct Search<'t> {
    pub(crate) range: Range<usize>,
    pub(crate) commit: Box<dyn FnOnce() -> TokenizerResult + 't>,
}

pub(crate) fn search_node<'t>(
    node: &Arc<TokenizerNode>,
    text: &'t str,
    ctx: &TokenizerContext,
) -> Option<Search<'t>> {
    match &**node {
        TokenizerNode::Match(m) => m.search(node, text, ctx),
        TokenizerNode::BeginEnd(b) => b.search(node, text, ctx),
        TokenizerNode::BeginWhile(b) => b.search(node, text, ctx),
        TokenizerNode::Include(i) => i.search(text, ctx),
        TokenizerNode::Patterns(p) => p.search(text, ctx),
    }
}

/// Candidate search shared by match rules and the begin patterns of range
/// rules: the buffer-start anchor follows the context, the continuation
/// anchor is always offered on a fresh search, zero-width matches count only
/// at the scan position, and `upper_bound` caps where a match may start.
pub(crate) fn search_candidate(
    regex: &MatchRegex,
    text: &str,
    ctx: &TokenizerContext,
) -> Option<SearchResult> {
    let found = regex.search(text, ctx.range.clone(), ctx.is_first_line, true)?;
    let range = found.range();
    if range.is_empty() && range.start != ctx.range.start {
        return None;
    }
    if let Some(upper) = ctx.upper_bound
        && range.start >= upper
    {
        return None;
    }
    Some(found)
}

// MARK: single-pattern rules

pub(crate) struct MatchTokenizer {
    pub(crate) name: Option<ScopeName>,
    pub(crate) regex: MatchRegex,
    pub(crate) captures: Vec<CaptureTokenizer>,
}

impl MatchTokenizer {
    fn search<'t>(
        &self,
        node: &Arc<TokenizerNode>,
        text: &'t str,
        ctx: &TokenizerContext,
    ) -> Option<Search<'t>> {
        let found = search_candidate(&self.regex, text, ctx)?;
        let range = found.range();
        let node = Arc::clone(node);
        Some(Search {
            range,
            commit: Box::new(move || {
                let TokenizerNode::Match(this) = &*node else {
                    unreachable!()
                };
                TokenizerResult::from_node(SyntaxNode {
                    scope: this.name.as_ref().map(|n| n.resolve_in(text, &found)),
                    range: found.range(),
                    nodes: apply_captures(&this.captures, text, &found),
                })
            }),
        })
    }
}

/// A thin proxy for a named rule, resolved lazily on first use.
///
/// Holds only weak links: the repository is the sole owner of the target, so
/// self-referential grammars don't create ownership cycles. Resolution races
/// from concurrent line tasks are settled by the `OnceLock`.
pub(crate) struct IncludeTokenizer {
    reference: IncludeRef,
    repository: Weak<TokenizerRepository>,
    target: OnceLock<Weak<TokenizerNode>>,
}

impl IncludeTokenizer {
    pub(crate) fn new(reference: &str, repository: Weak<TokenizerRepository>) -> Self {
        let reference = if reference == SELF_REFERENCE {
            IncludeRef::SelfRef
        } else if let Some(local) = reference.strip_prefix('#') {
            IncludeRef::Local(local.to_owned())
        } else {
            IncludeRef::Global(reference.to_owned())
        };
        Self {
            reference,
            repository,
            target: OnceLock::new(),
        }
    }

    fn target(&self) -> Option<Arc<TokenizerNode>> {
        self.target
            .get_or_init(|| {
                let resolved = self
                    .repository
                    .upgrade()
                    .and_then(|repo| repo.resolve(&self.reference));
                match resolved {
                    Some(target) => Arc::downgrade(&target),
                    // Unresolvable references degrade to a permanent no-match
                    None => Weak::new(),
                }
            })
            .upgrade()
    }

    fn search<'t>(&self, text: &'t str, ctx: &TokenizerContext) -> Option<Search<'t>> {
        let target = self.target()?;
        search_node(&target, text, ctx)
    }
}

// MARK: pattern lists

pub(crate) struct PatternsListTokenizer {
    pub(crate) tokenizers: Vec<Arc<TokenizerNode>>,
}

impl PatternsListTokenizer {
    fn search<'t>(&self, text: &'t str, ctx: &TokenizerContext) -> Option<Search<'t>> {
        select_earliest(&self.tokenizers, text, ctx)
    }
}

/// A compiled grammar: the root pattern list plus the repository owning
/// every named rule. Stateless across tokenize calls and shareable between
/// threads.
pub struct GrammarTokenizer {
    pub(crate) repository: Arc<TokenizerRepository>,
    pub(crate) root: Arc<TokenizerNode>,
}

impl GrammarTokenizer {
    /// The repository backing this tokenizer. Pass it as the global layer of
    /// another grammar to let that grammar's includes reach this one.
    pub fn repository(&self) -> &Arc<TokenizerRepository> {
        &self.repository
    }

    fn tokenizers(&self) -> &[Arc<TokenizerNode>] {
        match &*self.root {
            TokenizerNode::Patterns(p) => &p.tokenizers,
            _ => &[],
        }
    }

    /// Top-level driver: lines are tokenized independently and concurrently
    /// over the shared immutable tree, then merged back in document order.
    /// Range rules walk lines internally, so no top-level match depends on
    /// another line's state.
    fn tokenize_with(&self, text: &str, ctx: &TokenizerContext) -> Option<TokenizerResult> {
        let lines = text::lines(text, ctx.range.clone());

        let line_results: Vec<Option<TokenizerResult>> = lines
            .into_par_iter()
            .enumerate()
            .map(|(index, line)| {
                let line_ctx = ctx
                    .clone()
                    .with_range(line)
                    .with_first_line(ctx.is_first_line && index == 0);
                apply_all(self.tokenizers(), text, &line_ctx)
            })
            .collect();

        let mut result: Option<TokenizerResult> = None;
        for line_res in line_results.into_iter().flatten() {
            match &result {
                // Already covered by a match that crossed into this line
                Some(res) if line_res.range.start < res.range.end => {}
                _ => merge(line_res, &mut result),
            }
        }
        result
    }
}

impl Tokenizer for GrammarTokenizer {
    fn tokenize(&self, text: &str) -> Option<TokenizerResult> {
        self.tokenize_in(text, 0..text.len())
    }

    fn tokenize_in(&self, text: &str, range: Range<usize>) -> Option<TokenizerResult> {
        let start = text::ceil_char_boundary(text, range.start.min(text.len()));
        let end = text::ceil_char_boundary(text, range.end.min(text.len()));
        if start >= end {
            return None;
        }
        self.tokenize_with(text, &TokenizerContext::new(start..end))
    }
}

// MARK: selection & accumulation

/// Evaluates every sibling's probe and picks the winner: a candidate at the
/// scan position wins outright (declaration order is the grammar's
/// precedence), otherwise the earliest start wins with ties broken by
/// declaration order. Losing probes are dropped without being committed.
pub(crate) fn select_earliest<'t>(
    tokenizers: &[Arc<TokenizerNode>],
    text: &'t str,
    ctx: &TokenizerContext,
) -> Option<Search<'t>> {
    let mut result: Option<Search<'t>> = None;

    for tokenizer in tokenizers {
        let Some(cur) = search_node(tokenizer, text, ctx) else {
            continue;
        };
        if cur.range.start == ctx.range.start {
            return Some(cur);
        }

        match &result {
            Some(best) if cur.range.start >= best.range.start => {}
            _ => result = Some(cur),
        }
    }

    result
}

/// Repeatedly selects and consumes matches, advancing the cursor to each
/// winner's end (or by one character for empty winners, to guarantee forward
/// progress), until nothing matches or the context's bounds are reached.
pub(crate) fn apply_all(
    tokenizers: &[Arc<TokenizerNode>],
    text: &str,
    ctx: &TokenizerContext,
) -> Option<TokenizerResult> {
    let mut result: Option<TokenizerResult> = None;
    let mut begin = ctx.range.start;

    while begin < ctx.range.end && ctx.upper_bound.is_none_or(|upper| begin < upper) {
        let cur_ctx = ctx.clone().with_range(begin..ctx.range.end);
        let Some(found) = select_earliest(tokenizers, text, &cur_ctx) else {
            break;
        };

        let cur = (found.commit)();
        #[cfg(feature = "debug")]
        log::debug!(
            "[apply_all] consumed [{}..{}) at cursor {begin}",
            cur.range.start,
            cur.range.end
        );
        let cur_end = cur.range.end;
        merge(cur, &mut result);

        begin = if begin < cur_end {
            cur_end
        } else {
            text::ceil_char_boundary(text, begin + 1)
        };
    }

    result
}

/// Union of ranges plus children appended in order. Assumes strictly
/// increasing sibling ranges, which the selection/advance policy guarantees.
pub(crate) fn merge(res: TokenizerResult, into: &mut Option<TokenizerResult>) {
    match into {
        Some(acc) => {
            acc.range = acc.range.start.min(res.range.start)..acc.range.end.max(res.range.end);
            acc.nodes.extend(res.nodes);
        }
        None => *into = Some(res),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::grammars::Grammar;

    fn grammar(value: serde_json::Value) -> Grammar {
        serde_json::from_value(value).unwrap()
    }

    fn tokenize(value: serde_json::Value, text: &str) -> Option<TokenizerResult> {
        let result = grammar(value).create_tokenizer().tokenize(text);
        if let Some(result) = &result {
            for node in &result.nodes {
                check_tree(node);
            }
        }
        result
    }

    /// Children sorted by start, mutually non-overlapping, contained in the
    /// parent - must hold for every produced tree.
    fn check_tree(node: &SyntaxNode) {
        let mut cursor = node.range.start;
        for child in &node.nodes {
            assert!(
                node.range.start <= child.range.start && child.range.end <= node.range.end,
                "child {:?} escapes parent {:?}",
                child.range,
                node.range
            );
            assert!(
                child.range.start >= cursor,
                "overlapping or unsorted children at {:?}",
                child.range
            );
            cursor = child.range.end;
            check_tree(child);
        }
    }

    fn scope_of(node: &SyntaxNode) -> &str {
        node.scope.as_ref().map(|s| s.as_str()).unwrap_or("-")
    }

    fn render(node: &SyntaxNode, text: &str, depth: usize, out: &mut String) {
        out.push_str(&format!(
            "{}{} [{}..{}) {:?}\n",
            "  ".repeat(depth),
            scope_of(node),
            node.range.start,
            node.range.end,
            &text[node.range.clone()]
        ));
        for child in &node.nodes {
            render(child, text, depth + 1, out);
        }
    }

    #[test]
    fn tokenizer_is_shareable_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GrammarTokenizer>();
    }

    #[test]
    fn sibling_matches_in_order() {
        let result = tokenize(
            json!({"patterns": [{"match": "foo", "name": "kw.foo"}]}),
            "a foo foo",
        )
        .unwrap();

        assert_eq!(result.range, 2..9);
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.nodes[0].range, 2..5);
        assert_eq!(result.nodes[1].range, 6..9);
        assert!(result.nodes.iter().all(|n| scope_of(n) == "kw.foo"));
    }

    #[test]
    fn empty_text_produces_nothing() {
        let result = tokenize(json!({"patterns": [{"match": "foo"}]}), "");
        assert!(result.is_none());
    }

    #[test]
    fn comment_block_has_begin_content_end() {
        let result = tokenize(
            json!({"patterns": [
                {"begin": "/\\*", "end": "\\*/", "contentName": "comment"}
            ]}),
            "x /* y */ z",
        )
        .unwrap();

        assert_eq!(result.nodes.len(), 1);
        let block = &result.nodes[0];
        assert_eq!(block.scope, None);
        assert_eq!(block.range, 2..9);

        let [begin, content, end] = block.nodes.as_slice() else {
            panic!("expected begin, content and end children");
        };
        assert_eq!((scope_of(begin), begin.range.clone()), ("-", 2..4));
        assert_eq!((scope_of(content), content.range.clone()), ("comment", 4..7));
        assert_eq!((scope_of(end), end.range.clone()), ("-", 7..9));
    }

    #[test]
    fn leftmost_match_wins_over_declaration_order() {
        let result = tokenize(
            json!({"patterns": [
                {"match": "xx", "name": "late"},
                {"match": "yy", "name": "early"},
            ]}),
            "a yy xx",
        )
        .unwrap();

        assert_eq!(scope_of(&result.nodes[0]), "early");
        assert_eq!(result.nodes[0].range, 2..4);
        assert_eq!(scope_of(&result.nodes[1]), "late");
        assert_eq!(result.nodes[1].range, 5..7);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let patterns = json!({"patterns": [
            {"match": "ab", "name": "first"},
            {"match": "ab+", "name": "second"},
        ]});

        // Tie at the scan position short-circuits to the first declared
        let result = tokenize(patterns.clone(), "ab").unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(scope_of(&result.nodes[0]), "first");

        // Tie away from the scan position resolves the same way
        let result = tokenize(patterns, "zab").unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(scope_of(&result.nodes[0]), "first");
        assert_eq!(result.nodes[0].range, 1..3);
    }

    #[test]
    fn unterminated_range_consumes_to_buffer_end() {
        let result = tokenize(
            json!({"patterns": [{"begin": "\\(", "end": "\\)", "name": "group"}]}),
            "a (b\nc",
        )
        .unwrap();

        assert_eq!(result.nodes.len(), 1);
        let group = &result.nodes[0];
        assert_eq!(group.range, 2..6);

        // No end was found, so there is no end child
        let [begin, content] = group.nodes.as_slice() else {
            panic!("expected only begin and content children");
        };
        assert_eq!(begin.range, 2..3);
        assert_eq!(content.range, 3..6);
    }

    #[test]
    fn buffer_start_anchor_only_matches_at_the_start() {
        let value = json!({"patterns": [{"match": "\\Afoo", "name": "head"}]});

        let result = tokenize(value.clone(), "foo\nfoo").unwrap();
        assert_eq!(result.range, 0..3);
        assert_eq!(result.nodes.len(), 1);

        // Re-tokenizing a mid-buffer range never sees the buffer start
        let tokenizer = grammar(value).create_tokenizer();
        assert!(tokenizer.tokenize_in("foo\nfoo", 4..7).is_none());
    }

    #[test]
    fn continuation_anchor_binds_to_the_scan_position() {
        let value = json!({"patterns": [{"match": "\\Gfoo", "name": "g"}]});

        let result = tokenize(value.clone(), "foo x").unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].range, 0..3);

        assert!(tokenize(value, "x foo").is_none());
    }

    #[test]
    fn zero_width_matches_only_count_at_the_scan_position() {
        let value = json!({"patterns": [{"match": "(?=b)", "name": "peek"}]});

        // The lookahead hit at offset 1 is empty-at-wrong-position
        assert!(tokenize(value.clone(), "ab").is_none());

        // At the scan position it is a legitimate, empty match
        let result = tokenize(value, "ba").unwrap();
        assert_eq!(result.range, 0..0);
    }

    #[test]
    fn capture_scopes_substitute_backreferences_per_instance() {
        let result = tokenize(
            json!({"patterns": [
                {"match": "(f\\w+)", "captures": {"1": {"name": "word.$1"}}}
            ]}),
            "foo fun",
        )
        .unwrap();

        assert_eq!(result.nodes.len(), 2);
        assert_eq!(scope_of(&result.nodes[0].nodes[0]), "word.foo");
        assert_eq!(scope_of(&result.nodes[1].nodes[0]), "word.fun");
    }

    #[test]
    fn captures_resolve_by_group_name() {
        let result = tokenize(
            json!({"patterns": [
                {"match": "(?<word>f\\w+)", "captures": {"word": {"name": "named"}}}
            ]}),
            "x foo",
        )
        .unwrap();

        let node = &result.nodes[0];
        assert_eq!(node.range, 2..5);
        assert_eq!(scope_of(&node.nodes[0]), "named");
        assert_eq!(node.nodes[0].range, 2..5);
    }

    #[test]
    fn captures_retokenize_with_nested_patterns() {
        let result = tokenize(
            json!({"patterns": [{
                "match": "\\[(\\w+)\\]",
                "name": "tag",
                "captures": {
                    "1": {
                        "name": "tag.inner",
                        "patterns": [{"match": "\\d+", "name": "tag.number"}]
                    }
                }
            }]}),
            "[ab12]",
        )
        .unwrap();

        let tag = &result.nodes[0];
        assert_eq!((scope_of(tag), tag.range.clone()), ("tag", 0..6));
        let inner = &tag.nodes[0];
        assert_eq!((scope_of(inner), inner.range.clone()), ("tag.inner", 1..5));
        let number = &inner.nodes[0];
        assert_eq!((scope_of(number), number.range.clone()), ("tag.number", 3..5));
    }

    #[test]
    fn shared_captures_apply_to_begin_and_end() {
        let result = tokenize(
            json!({"patterns": [
                {"begin": "\\(", "end": "\\)", "captures": {"0": {"name": "punct"}}}
            ]}),
            "(x)",
        )
        .unwrap();

        let [begin, _content, end] = result.nodes[0].nodes.as_slice() else {
            panic!("expected three children");
        };
        assert_eq!(scope_of(&begin.nodes[0]), "punct");
        assert_eq!(begin.nodes[0].range, 0..1);
        assert_eq!(scope_of(&end.nodes[0]), "punct");
        assert_eq!(end.nodes[0].range, 2..3);
    }

    #[test]
    fn while_region_consumes_matching_line_prefix() {
        let result = tokenize(
            json!({"patterns": [{
                "begin": "> ",
                "while": "> ",
                "name": "quote",
                "contentName": "quote.content",
                "patterns": [{"match": "\\w+", "name": "word"}]
            }]}),
            "> a\n> b\nc",
        )
        .unwrap();

        assert_eq!(result.nodes.len(), 1);
        let quote = &result.nodes[0];
        assert_eq!((scope_of(quote), quote.range.clone()), ("quote", 0..8));

        let [begin, content] = quote.nodes.as_slice() else {
            panic!("expected begin and content children, no end");
        };
        assert_eq!(begin.range, 0..2);
        assert_eq!(
            (scope_of(content), content.range.clone()),
            ("quote.content", 2..8)
        );
        let words: Vec<_> = content.nodes.iter().map(|n| n.range.clone()).collect();
        assert_eq!(words, vec![2..3, 6..7]);
    }

    #[test]
    fn multi_line_range_supersedes_later_line_results() {
        let result = tokenize(
            json!({"patterns": [
                {
                    "begin": "/\\*", "end": "\\*/", "name": "comment",
                    "patterns": [{"match": "TODO", "name": "todo"}]
                },
                {"match": "\\w+", "name": "word"},
            ]}),
            "a /* x\nTODO */ b",
        )
        .unwrap();

        assert_eq!(result.range, 0..14);
        let [word, comment] = result.nodes.as_slice() else {
            panic!("expected a word and a comment");
        };
        assert_eq!((scope_of(word), word.range.clone()), ("word", 0..1));
        assert_eq!((scope_of(comment), comment.range.clone()), ("comment", 2..14));

        let [begin, content, end] = comment.nodes.as_slice() else {
            panic!("expected begin, content and end children");
        };
        assert_eq!(begin.range, 2..4);
        assert_eq!(content.range, 4..12);
        assert_eq!(end.range, 12..14);

        // The nested rule matched on the comment's second line
        assert_eq!(content.nodes.len(), 1);
        assert_eq!((scope_of(&content.nodes[0]), content.nodes[0].range.clone()), ("todo", 7..11));
    }

    #[test]
    fn includes_resolve_through_the_repository() {
        let result = tokenize(
            json!({
                "scopeName": "source.paren",
                "patterns": [{"include": "#group"}],
                "repository": {
                    "group": {
                        "name": "group",
                        "begin": "\\(",
                        "end": "\\)",
                        "patterns": [
                            {"include": "#group"},
                            {"match": "\\w+", "name": "word"},
                        ]
                    }
                }
            }),
            "(a (b))",
        )
        .unwrap();

        let mut out = String::new();
        for node in &result.nodes {
            render(node, "(a (b))", 0, &mut out);
        }
        insta::assert_snapshot!(out.trim_end(), @r#"
        group [0..7) "(a (b))"
          - [0..1) "("
          - [1..6) "a (b)"
            word [1..2) "a"
            group [3..6) "(b)"
              - [3..4) "("
              - [4..5) "b"
                word [4..5) "b"
              - [5..6) ")"
          - [6..7) ")"
        "#);
    }

    #[test]
    fn self_reference_recurses_and_replays_the_end_search() {
        let result = tokenize(
            json!({
                "scopeName": "source.list",
                "patterns": [{
                    "begin": "\\[",
                    "end": "\\]",
                    "name": "list",
                    "patterns": [
                        {"include": "$self"},
                        {"match": "\\d+", "name": "num"},
                    ]
                }]
            }),
            "[1[2]]",
        )
        .unwrap();

        let list = &result.nodes[0];
        assert_eq!((scope_of(list), list.range.clone()), ("list", 0..6));

        let [begin, content, end] = list.nodes.as_slice() else {
            panic!("expected begin, content and end children");
        };
        assert_eq!(begin.range, 0..1);
        // The inner list swallowed the first `]` candidate, so the end
        // search moved forward
        assert_eq!(content.range, 1..5);
        assert_eq!(end.range, 5..6);

        let [num, inner] = content.nodes.as_slice() else {
            panic!("expected a number and a nested list");
        };
        assert_eq!((scope_of(num), num.range.clone()), ("num", 1..2));
        assert_eq!((scope_of(inner), inner.range.clone()), ("list", 2..5));
    }

    #[test]
    fn dropping_the_tokenizer_frees_cyclic_grammars() {
        let grammar = grammar(json!({
            "patterns": [{"include": "#a"}],
            "repository": {
                "a": {"begin": "a", "end": "z", "patterns": [{"include": "#a"}]}
            }
        }));
        let tokenizer = grammar.create_tokenizer();
        // Resolve the include so the lazy weak link is populated
        let _ = tokenizer.tokenize("a b z");

        let repository = Arc::downgrade(tokenizer.repository());
        drop(tokenizer);
        assert!(repository.upgrade().is_none());
    }

    #[test]
    fn unresolvable_includes_never_match() {
        let result = tokenize(
            json!({"patterns": [
                {"include": "#missing"},
                {"match": "ok", "name": "good"},
            ]}),
            "ok",
        )
        .unwrap();

        assert_eq!(result.nodes.len(), 1);
        assert_eq!(scope_of(&result.nodes[0]), "good");
    }

    #[test]
    fn first_repository_definition_wins() {
        let result = tokenize(
            json!({
                "patterns": [
                    {"include": "#x"},
                    {
                        "begin": "q", "end": "r",
                        "repository": {"x": {"match": "a", "name": "inner.x"}},
                        "patterns": []
                    },
                ],
                "repository": {"x": {"match": "a", "name": "outer.x"}}
            }),
            "a",
        )
        .unwrap();

        assert_eq!(scope_of(&result.nodes[0]), "outer.x");
    }

    #[test]
    fn broken_rules_degrade_to_reduced_matching() {
        let value = json!({"patterns": [
            {"match": "(unclosed", "name": "bad"},
            {"match": "ok", "name": "good"},
        ]});

        assert!(grammar(value.clone()).validate().is_err());

        let result = tokenize(value, "ok ok").unwrap();
        assert_eq!(result.nodes.len(), 2);
        assert!(result.nodes.iter().all(|n| scope_of(n) == "good"));
    }

    #[test]
    fn tokenize_in_restricts_the_searched_range() {
        let tokenizer = grammar(json!({"patterns": [{"match": "\\w+", "name": "word"}]}))
            .create_tokenizer();
        let text = "foo bar baz";

        let result = tokenizer.tokenize_in(text, 4..7).unwrap();
        assert_eq!(result.range, 4..7);
        assert_eq!(result.nodes.len(), 1);

        assert!(tokenizer.tokenize_in(text, 4..4).is_none());

        // Out-of-bounds requests clamp to the buffer
        let result = tokenizer.tokenize_in(text, 4..100).unwrap();
        assert_eq!(result.nodes.len(), 2);
    }

    #[test]
    fn concurrent_lines_match_sequential_tokenization() {
        let tokenizer = grammar(json!({"patterns": [
            {"match": "\\d+", "name": "num"},
            {"match": "\\w+", "name": "word"},
        ]}))
        .create_tokenizer();
        let text = "one 2 three\nfour 5\n\nsix seven 8 nine\nten";

        let concurrent = tokenizer.tokenize(text).unwrap();

        let mut sequential: Option<TokenizerResult> = None;
        for line in crate::text::lines(text, 0..text.len()) {
            if let Some(res) = tokenizer.tokenize_in(text, line) {
                merge(res, &mut sequential);
            }
        }

        assert_eq!(concurrent, sequential.unwrap());
    }

    #[test]
    fn tokenization_is_idempotent() {
        let tokenizer = grammar(json!({"patterns": [
            {
                "begin": "\"", "end": "\"", "name": "string",
                "patterns": [{"match": "\\\\.", "name": "escape"}]
            },
            {"match": "\\w+", "name": "word"},
        ]}))
        .create_tokenizer();
        let text = "say \"hi\\n\" twice\nsay it";

        let first = tokenizer.tokenize(text).unwrap();
        let second = tokenizer.tokenize(text).unwrap();
        assert_eq!(first, second);
    }
}
