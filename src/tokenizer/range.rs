//! Range-type rules: begin/end and begin/while.
//!
//! Both locate their begin pattern like a plain match rule, then consume
//! following text until a terminating condition: an end pattern found by
//! scanning forward line by line, or a per-line continuation check failing.

use std::ops::Range;
use std::sync::Arc;

use crate::grammars::{MatchRegex, SearchResult};
use crate::scope::ScopeName;
use crate::text;

use super::captures::{CaptureTokenizer, apply_captures};
use super::{
    Search, SyntaxNode, TokenizerContext, TokenizerNode, TokenizerResult, apply_all, merge,
    search_candidate,
};

pub(crate) struct BeginEndTokenizer {
    pub(crate) name: Option<ScopeName>,
    pub(crate) content_name: Option<ScopeName>,
    pub(crate) begin: MatchRegex,
    pub(crate) begin_captures: Vec<CaptureTokenizer>,
    pub(crate) end: MatchRegex,
    pub(crate) end_captures: Vec<CaptureTokenizer>,
    pub(crate) content: Vec<Arc<TokenizerNode>>,
}

impl BeginEndTokenizer {
    pub(crate) fn search<'t>(
        &self,
        node: &Arc<TokenizerNode>,
        text: &'t str,
        ctx: &TokenizerContext,
    ) -> Option<Search<'t>> {
        let begin_res = search_candidate(&self.begin, text, ctx)?;
        let range = begin_res.range();
        let node = Arc::clone(node);
        let ctx = ctx.clone();
        Some(Search {
            range,
            commit: Box::new(move || {
                let TokenizerNode::BeginEnd(this) = &*node else {
                    unreachable!()
                };
                this.tokenize_from(text, &ctx, begin_res)
            }),
        })
    }

    /// The begin match is consumed; hunt for the nearest of an end match or
    /// nested content matches, line by line, then conclude with the end.
    fn tokenize_from(
        &self,
        text: &str,
        ctx: &TokenizerContext,
        begin_res: SearchResult,
    ) -> TokenizerResult {
        let mut is_first_line = ctx.is_first_line;
        let begin = begin_res.range();

        // Search space starts right after begin, up to the current line's end
        let mut line = begin.end..text::line_end(text, begin.end);
        let (mut end, mut end_res) = self.find_end(text, line.clone(), is_first_line, true);

        let mut content: Option<TokenizerResult> = None;

        while line.start < end.start {
            loop {
                let line_ctx = ctx
                    .clone()
                    .with_range(line.clone())
                    .with_upper_bound(Some(end.start))
                    .with_first_line(is_first_line);
                let res = apply_all(&self.content, text, &line_ctx);
                let advanced = res.as_ref().map(|r| r.range.end);
                if let Some(res) = res {
                    merge(res, &mut content);
                }

                // A nested match that ran over the end candidate means the
                // candidate was part of the content; redo the end search
                // past it
                if let Some(pos) = advanced
                    && pos >= end.end
                {
                    line = pos..text::line_end(text, pos);
                    (end, end_res) = self.find_end(text, line.clone(), is_first_line, false);
                } else {
                    break;
                }
            }

            line = line.end..text::line_end(text, line.end);
            is_first_line = false;
        }

        let mut nodes: Vec<SyntaxNode> = Vec::new();

        if !begin.is_empty() {
            nodes.push(SyntaxNode {
                scope: None,
                range: begin.clone(),
                nodes: apply_captures(&self.begin_captures, text, &begin_res),
            });
        }

        nodes.push(SyntaxNode {
            scope: self.content_name.as_ref().map(|n| n.resolve()),
            range: begin.end..end.start,
            nodes: content.map(|c| c.nodes).unwrap_or_default(),
        });

        if !end.is_empty()
            && let Some(end_res) = &end_res
        {
            nodes.push(SyntaxNode {
                scope: None,
                range: end.clone(),
                nodes: apply_captures(&self.end_captures, text, end_res),
            });
        }

        TokenizerResult::from_node(SyntaxNode {
            scope: self.name.as_ref().map(|n| n.resolve()),
            range: begin.start..end.end,
            nodes,
        })
    }

    /// Scans for the end pattern starting on `from`'s line and walking
    /// forward line by line. An unmatched end consumes to the end of the
    /// buffer, reported as a degenerate empty match there.
    ///
    /// The anchor variant is picked once per call: the continuation anchor is
    /// only meaningful when the search starts at the begin match's end.
    fn find_end(
        &self,
        text: &str,
        from: Range<usize>,
        is_first_line: bool,
        is_begin: bool,
    ) -> (Range<usize>, Option<SearchResult>) {
        let mut line = from;
        while line.start < text.len() {
            if let Some(res) = self.end.search(text, line.clone(), is_first_line, is_begin) {
                return (res.range(), Some(res));
            }
            line = line.end..text::line_end(text, line.end);
        }
        (text.len()..text.len(), None)
    }
}

pub(crate) struct BeginWhileTokenizer {
    pub(crate) name: Option<ScopeName>,
    pub(crate) content_name: Option<ScopeName>,
    pub(crate) begin: MatchRegex,
    pub(crate) begin_captures: Vec<CaptureTokenizer>,
    pub(crate) while_: MatchRegex,
    pub(crate) content: Vec<Arc<TokenizerNode>>,
}

impl BeginWhileTokenizer {
    pub(crate) fn search<'t>(
        &self,
        node: &Arc<TokenizerNode>,
        text: &'t str,
        ctx: &TokenizerContext,
    ) -> Option<Search<'t>> {
        let begin_res = search_candidate(&self.begin, text, ctx)?;
        let range = begin_res.range();
        let node = Arc::clone(node);
        let ctx = ctx.clone();
        Some(Search {
            range,
            commit: Box::new(move || {
                let TokenizerNode::BeginWhile(this) = &*node else {
                    unreachable!()
                };
                this.tokenize_from(text, &ctx, begin_res)
            }),
        })
    }

    fn tokenize_from(
        &self,
        text: &str,
        ctx: &TokenizerContext,
        begin_res: SearchResult,
    ) -> TokenizerResult {
        let begin = begin_res.range();

        // The region covers the rest of the begin line plus every following
        // line whose start still satisfies the continuation pattern. The
        // check runs once per line; the first failing line ends the region.
        let mut content_end = text::line_end(text, begin.end);
        while content_end < text.len() {
            let line = content_end..text::line_end(text, content_end);
            match self.while_.search(text, line.clone(), false, true) {
                Some(res) if res.range().start == line.start => content_end = line.end,
                _ => break,
            }
        }

        // Nested patterns over the consumed region, walking sequentially
        // line by line
        let mut content: Option<TokenizerResult> = None;
        let mut is_first_line = ctx.is_first_line;
        let mut line = begin.end..text::line_end(text, begin.end).min(content_end);

        while line.start < content_end {
            let line_ctx = ctx
                .clone()
                .with_range(line.clone())
                .with_upper_bound(Some(content_end))
                .with_first_line(is_first_line);
            is_first_line = false;

            let mut next = line.end;
            if let Some(res) = apply_all(&self.content, text, &line_ctx) {
                // A nested range match may span lines; resume right after it
                if res.range.end > next {
                    next = res.range.end;
                }
                merge(res, &mut content);
            }
            line = next..text::line_end(text, next).min(content_end);
        }

        let mut nodes: Vec<SyntaxNode> = Vec::new();

        if !begin.is_empty() {
            nodes.push(SyntaxNode {
                scope: None,
                range: begin.clone(),
                nodes: apply_captures(&self.begin_captures, text, &begin_res),
            });
        }

        // A while region has no closing delimiter, so there is no end node
        nodes.push(SyntaxNode {
            scope: self.content_name.as_ref().map(|n| n.resolve()),
            range: begin.end..content_end,
            nodes: content.map(|c| c.nodes).unwrap_or_default(),
        });

        TokenizerResult::from_node(SyntaxNode {
            scope: self.name.as_ref().map(|n| n.resolve()),
            range: begin.start..content_end,
            nodes,
        })
    }
}
