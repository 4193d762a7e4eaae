//! Converts the static pattern tree into the executable tokenizer tree.
//!
//! Include resolution is deferred: grammars may reference themselves
//! transitively, so eagerly compiling every include target would not
//! terminate. Instead every named rule is compiled exactly once into the
//! repository, and include sites hold only the target's name plus a weak
//! back-reference to the repository (resolved on first use, see
//! [`super::IncludeTokenizer`]).

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::grammars::{Captures, Grammar, Pattern};

use super::captures::{CaptureRef, CaptureTokenizer};
use super::range::{BeginEndTokenizer, BeginWhileTokenizer};
use super::{
    GrammarTokenizer, IncludeTokenizer, MatchTokenizer, PatternsListTokenizer, TokenizerNode,
};

/// The repository key a grammar's own root pattern list is registered under.
pub(crate) const SELF_REFERENCE: &str = "$self";

/// A parsed include reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IncludeRef {
    /// `$self`: the enclosing grammar's root patterns
    SelfRef,
    /// `#name`: a named rule of the enclosing grammar
    Local(String),
    /// Anything else, typically another grammar's scope name; reaches
    /// through the global layer
    Global(String),
}

/// Named-rule lookup, layered local-then-global.
///
/// Sole owner of the compiled named rules; include proxies hold only weak
/// links into it, which breaks the ownership cycles of self-referential
/// grammars while bounding memory to one tokenizer tree per grammar.
pub struct TokenizerRepository {
    entries: HashMap<String, Arc<TokenizerNode>>,
    global: Option<Arc<TokenizerRepository>>,
}

impl TokenizerRepository {
    fn build(grammar: &Grammar, global: Option<Arc<TokenizerRepository>>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let mut entries = HashMap::new();
            collect_repository(&grammar.repository, weak, &mut entries);
            for pattern in &grammar.patterns {
                collect_nested(pattern, weak, &mut entries);
            }

            // The root pattern list itself is addressable so that grammars
            // can include themselves and, via the scope name, each other
            let root = Arc::new(TokenizerNode::Patterns(PatternsListTokenizer {
                tokenizers: compile_patterns(&grammar.patterns, weak),
            }));
            entries.insert(SELF_REFERENCE.to_owned(), Arc::clone(&root));
            if let Some(scope_name) = &grammar.scope_name {
                entries.entry(scope_name.clone()).or_insert(root);
            }

            Self { entries, global }
        })
    }

    fn lookup(&self, name: &str) -> Option<Arc<TokenizerNode>> {
        if let Some(tokenizer) = self.entries.get(name) {
            return Some(Arc::clone(tokenizer));
        }
        self.global.as_ref()?.lookup(name)
    }

    pub(crate) fn resolve(&self, reference: &IncludeRef) -> Option<Arc<TokenizerNode>> {
        match reference {
            IncludeRef::SelfRef => self.lookup(SELF_REFERENCE),
            IncludeRef::Local(name) | IncludeRef::Global(name) => self.lookup(name),
        }
    }
}

/// Folds a repository's entries into the flat lookup map with a
/// first-definition-wins policy: an enclosing scope's entry shadows any
/// same-named rule declared deeper in its subtree.
fn collect_repository(
    repository: &HashMap<String, Pattern>,
    repo: &Weak<TokenizerRepository>,
    entries: &mut HashMap<String, Arc<TokenizerNode>>,
) {
    for (name, pattern) in repository {
        if !entries.contains_key(name) {
            entries.insert(name.clone(), compile_pattern(pattern, repo));
        }
        collect_nested(pattern, repo, entries);
    }
}

/// Walks a pattern's subtree so that named rules declared at any depth are
/// visible to includes.
fn collect_nested(
    pattern: &Pattern,
    repo: &Weak<TokenizerRepository>,
    entries: &mut HashMap<String, Arc<TokenizerNode>>,
) {
    collect_repository(pattern.repository(), repo, entries);
    for nested in pattern.patterns() {
        collect_nested(nested, repo, entries);
    }
}

pub(crate) fn compile_patterns(
    patterns: &[Pattern],
    repo: &Weak<TokenizerRepository>,
) -> Vec<Arc<TokenizerNode>> {
    patterns.iter().map(|p| compile_pattern(p, repo)).collect()
}

fn compile_pattern(pattern: &Pattern, repo: &Weak<TokenizerRepository>) -> Arc<TokenizerNode> {
    let node = match pattern {
        Pattern::Match(p) => TokenizerNode::Match(MatchTokenizer {
            name: p.name.clone(),
            regex: p.match_.clone(),
            captures: compile_captures(&p.captures, repo),
        }),

        Pattern::BeginEnd(p) => TokenizerNode::BeginEnd(BeginEndTokenizer {
            name: p.name.clone(),
            content_name: p.content_name.clone(),
            begin: p.begin.clone(),
            begin_captures: compile_captures(fallback(&p.begin_captures, &p.captures), repo),
            end: p.end.clone(),
            end_captures: compile_captures(fallback(&p.end_captures, &p.captures), repo),
            content: compile_patterns(&p.patterns, repo),
        }),

        Pattern::BeginWhile(p) => TokenizerNode::BeginWhile(BeginWhileTokenizer {
            name: p.name.clone(),
            content_name: p.content_name.clone(),
            begin: p.begin.clone(),
            begin_captures: compile_captures(fallback(&p.begin_captures, &p.captures), repo),
            while_: p.while_.clone(),
            content: compile_patterns(&p.patterns, repo),
        }),

        Pattern::Include(p) => {
            TokenizerNode::Include(IncludeTokenizer::new(&p.include, repo.clone()))
        }

        Pattern::Patterns(p) => TokenizerNode::Patterns(PatternsListTokenizer {
            tokenizers: compile_patterns(&p.patterns, repo),
        }),
    };

    Arc::new(node)
}

/// The shared `captures` table stands in when a specific one is absent.
fn fallback<'a>(specific: &'a Captures, shared: &'a Captures) -> &'a Captures {
    if specific.is_empty() { shared } else { specific }
}

fn compile_captures(
    captures: &Captures,
    repo: &Weak<TokenizerRepository>,
) -> Vec<CaptureTokenizer> {
    let mut compiled: Vec<CaptureTokenizer> = captures
        .iter()
        .map(|(key, capture)| CaptureTokenizer {
            group: CaptureRef::parse(key),
            name: capture.name.clone(),
            tokenizers: compile_patterns(&capture.patterns, repo),
        })
        .collect();
    // Positional groups in numeric order, named groups after
    compiled.sort_by(|a, b| a.group.cmp(&b.group));
    compiled
}

// MARK: Grammar extensions

impl Grammar {
    /// Compiles this grammar into its executable tokenizer. Done once per
    /// grammar; the tokenizer is then reused across many tokenize calls.
    pub fn create_tokenizer(&self) -> GrammarTokenizer {
        self.create_tokenizer_with(None)
    }

    /// Compiles against a shared global repository, letting this grammar's
    /// includes reach rules registered by other grammars.
    pub fn create_tokenizer_with(
        &self,
        global: Option<Arc<TokenizerRepository>>,
    ) -> GrammarTokenizer {
        let repository = TokenizerRepository::build(self, global);
        let root = repository
            .lookup(SELF_REFERENCE)
            .expect("the root pattern list is always registered");
        GrammarTokenizer { repository, root }
    }
}
