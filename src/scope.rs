//! Resolved scope names and the templates they resolve from.
//!
//! Scopes are interned in a global concurrent pool so that the clones made
//! while building syntax trees are pointer-sized and comparisons are cheap,
//! including under the line-parallel driver.

use std::fmt;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use crate::grammars::SearchResult;

/// A resolved scope name attached to a syntax node, e.g. `string.quoted.double`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Scope(Arc<str>);

static SCOPE_POOL: LazyLock<papaya::HashMap<String, Arc<str>>> =
    LazyLock::new(papaya::HashMap::new);

impl Scope {
    pub fn new(name: &str) -> Scope {
        let pool = SCOPE_POOL.pin();
        if let Some(interned) = pool.get(name) {
            return Scope(interned.clone());
        }
        // Concurrent first-inserts of the same name settle on whichever
        // value landed; both are equal
        Scope(pool.get_or_insert(name.to_owned(), Arc::from(name)).clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope(\"{}\")", self.0)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// A declared scope name, possibly containing `$n` backreference
/// placeholders.
///
/// Placeholders are substituted with the text of capture group `n` of the
/// enclosing match, per match instance: `"support.function.$1"` over two
/// different matches resolves to two different scopes.
#[derive(Clone)]
pub struct ScopeName {
    template: String,
    has_backrefs: bool,
}

impl ScopeName {
    pub fn new(template: String) -> Self {
        let has_backrefs = template
            .as_bytes()
            .windows(2)
            .any(|w| w[0] == b'$' && w[1].is_ascii_digit());
        Self {
            template,
            has_backrefs,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Resolve without a match context; placeholders are kept literally.
    pub fn resolve(&self) -> Scope {
        Scope::new(&self.template)
    }

    /// Resolve against the enclosing match, substituting every `$n` with the
    /// text spanned by group `n`. Groups that did not participate keep the
    /// placeholder literally.
    pub fn resolve_in(&self, text: &str, found: &SearchResult) -> Scope {
        if !self.has_backrefs {
            return self.resolve();
        }

        let mut resolved = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('$') {
            resolved.push_str(&rest[..pos]);
            rest = &rest[pos..];

            let digits = rest[1..]
                .bytes()
                .take_while(|b| b.is_ascii_digit())
                .count();
            let group = rest[1..1 + digits].parse::<usize>().ok();
            match group.and_then(|n| found.group(n)) {
                Some(range) => {
                    resolved.push_str(&text[range]);
                    rest = &rest[1 + digits..];
                }
                None => {
                    resolved.push('$');
                    rest = &rest[1..];
                }
            }
        }
        resolved.push_str(rest);

        Scope::new(&resolved)
    }
}

impl fmt::Debug for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template)
    }
}

impl Serialize for ScopeName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.template)
    }
}

impl<'de> Deserialize<'de> for ScopeName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let template = String::deserialize(deserializer)?;
        Ok(ScopeName::new(template))
    }
}
