//! The static pattern tree a grammar arrives as.
//!
//! This is the already-parsed form of a TextMate-style grammar: patterns,
//! capture tables and regex sources. The tokenizer compiles it once into an
//! executable tree (see `crate::tokenizer`) and never looks at it again.

mod regex;

pub use regex::{MatchRegex, SearchResult};

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AlberoResult, Error};
use crate::scope::ScopeName;

/// A capture group entry: an optional scope name for the captured text plus
/// nested patterns used to re-tokenize the captured substring.
///
/// # Examples
/// ```json
/// {
///   "1": {
///     "name": "entity.name.function.js",
///     "patterns": []
///   },
///   "2": { "name": "punctuation.definition.parameters.begin.js" }
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Capture {
    /// The scope name to assign to the captured text
    pub name: Option<ScopeName>,
    /// Nested patterns that re-tokenize the captured substring.
    /// Rarely used - most captures just assign a scope name
    pub patterns: Vec<Pattern>,
}

/// Capture table, keyed by positional index (`"1"`) or group name.
pub type Captures = BTreeMap<String, Capture>;

/// A pattern matching a single regular expression
///
/// # Examples
/// ```json
/// {
///   "match": "\\b(function)\\s+(\\w+)\\s*\\(",
///   "name": "meta.function.declaration.js",
///   "captures": {
///     "1": { "name": "storage.type.function.js" },
///     "2": { "name": "entity.name.function.js" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct MatchPattern {
    /// Optional scope name for the entire match
    #[serde(default)]
    pub name: Option<ScopeName>,
    /// The regular expression to match against
    #[serde(rename(deserialize = "match"))]
    pub match_: MatchRegex,
    /// Capture groups that scope or re-tokenize parts of the match
    #[serde(default)]
    pub captures: Captures,
    /// Named sub-patterns visible to includes (see [`Grammar::repository`])
    #[serde(default)]
    pub repository: HashMap<String, Pattern>,
}

/// A multi-line pattern delimited by begin/end regexes
///
/// # Examples
/// ```json
/// {
///   "name": "string.quoted.double.js",
///   "begin": "\"",
///   "end": "\"",
///   "captures": {
///     "0": { "name": "punctuation.definition.string.js" }
///   },
///   "patterns": [
///     { "match": "\\\\.", "name": "constant.character.escape.js" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct BeginEndPattern {
    /// Optional scope name for the entire begin/end region
    #[serde(default)]
    pub name: Option<ScopeName>,
    /// Optional scope name for the content between begin and end
    #[serde(default)]
    pub content_name: Option<ScopeName>,
    /// Matches the opening delimiter
    pub begin: MatchRegex,
    /// Matches the closing delimiter
    pub end: MatchRegex,
    /// Capture groups for both begin and end, used when the specific
    /// tables below are absent
    #[serde(default)]
    pub captures: Captures,
    #[serde(default)]
    pub begin_captures: Captures,
    #[serde(default)]
    pub end_captures: Captures,
    /// Patterns applied to the content between the delimiters
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub repository: HashMap<String, Pattern>,
}

/// A multi-line pattern that continues for as long as a per-line condition
/// holds
///
/// # Examples
/// ```json
/// {
///   "name": "markup.quote.markdown",
///   "begin": "^> ",
///   "while": "^> ",
///   "patterns": [
///     { "include": "#inline" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct BeginWhilePattern {
    #[serde(default)]
    pub name: Option<ScopeName>,
    #[serde(default)]
    pub content_name: Option<ScopeName>,
    /// Matches the beginning of the region
    pub begin: MatchRegex,
    /// Checked once per subsequent line, at the line start; the first line
    /// that fails ends the region
    #[serde(rename(deserialize = "while"))]
    pub while_: MatchRegex,
    /// Capture groups for begin, used when `begin_captures` is absent
    #[serde(default)]
    pub captures: Captures,
    #[serde(default)]
    pub begin_captures: Captures,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub repository: HashMap<String, Pattern>,
}

/// A reference to a named pattern
///
/// # Examples
/// ```json
/// { "include": "#statements" }
/// ```
/// ```json
/// { "include": "$self" }
/// ```
/// ```json
/// { "include": "source.js" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct IncludePattern {
    /// `#name` for a repository entry, `$self` for the grammar's own root
    /// patterns, anything else for a rule shared through the global
    /// repository (typically another grammar's scope name)
    pub include: String,
    #[serde(default)]
    pub repository: HashMap<String, Pattern>,
}

/// An ordered list of patterns; per position, the first successful match wins
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PatternsList {
    pub patterns: Vec<Pattern>,
    pub repository: HashMap<String, Pattern>,
}

/// One grammar rule.
///
/// The order matters for serde deserialization - more specific shapes are
/// tried first, so that patterns with required fields win over those with
/// defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    /// Delimited multi-line region
    BeginEnd(BeginEndPattern),
    /// Region continued by a per-line condition
    BeginWhile(BeginWhilePattern),
    /// Reference to a named rule
    /// *Must come before Match in the enum to be correct*
    Include(IncludePattern),
    /// Single regular expression
    Match(MatchPattern),
    /// Ordered list of patterns (most general, must be last)
    Patterns(PatternsList),
}

impl Pattern {
    pub(crate) fn repository(&self) -> &HashMap<String, Pattern> {
        match self {
            Pattern::BeginEnd(p) => &p.repository,
            Pattern::BeginWhile(p) => &p.repository,
            Pattern::Include(p) => &p.repository,
            Pattern::Match(p) => &p.repository,
            Pattern::Patterns(p) => &p.repository,
        }
    }

    pub(crate) fn patterns(&self) -> &[Pattern] {
        match self {
            Pattern::BeginEnd(p) => &p.patterns,
            Pattern::BeginWhile(p) => &p.patterns,
            Pattern::Match(_) | Pattern::Include(_) => &[],
            Pattern::Patterns(p) => &p.patterns,
        }
    }

    fn validate(&self) -> AlberoResult<()> {
        let mut regexes: Vec<&MatchRegex> = Vec::new();
        let mut captures: Vec<&Captures> = Vec::new();
        match self {
            Pattern::BeginEnd(p) => {
                regexes.extend([&p.begin, &p.end]);
                captures.extend([&p.captures, &p.begin_captures, &p.end_captures]);
            }
            Pattern::BeginWhile(p) => {
                regexes.extend([&p.begin, &p.while_]);
                captures.extend([&p.captures, &p.begin_captures]);
            }
            Pattern::Match(p) => {
                regexes.push(&p.match_);
                captures.push(&p.captures);
            }
            Pattern::Include(_) | Pattern::Patterns(_) => {}
        }

        for regex in regexes {
            regex.validate().map_err(|error| Error::InvalidRegex {
                pattern: regex.source().to_owned(),
                error,
            })?;
        }
        for table in captures {
            for capture in table.values() {
                for pattern in &capture.patterns {
                    pattern.validate()?;
                }
            }
        }
        for pattern in self.patterns() {
            pattern.validate()?;
        }
        for pattern in self.repository().values() {
            pattern.validate()?;
        }
        Ok(())
    }
}

/// A complete grammar: root patterns plus a repository of named rules.
///
/// Immutable and shared by many tokenizations once compiled with
/// [`Grammar::create_tokenizer`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct Grammar {
    /// Human-readable name of the language
    pub name: Option<String>,
    /// Unique identifier for this grammar, e.g. `source.js`. Other grammars
    /// can include this grammar's root patterns by this name.
    pub scope_name: Option<String>,
    /// Root patterns, applied in order
    pub patterns: Vec<Pattern>,
    /// Named rules referenced by include patterns
    pub repository: HashMap<String, Pattern>,
}

impl Grammar {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AlberoResult<Self> {
        let file = File::open(&path)?;
        Ok(serde_json::from_reader(&file)?)
    }

    /// Reports the first regex source that does not compile.
    ///
    /// Advisory: compilation and tokenization never fail on a malformed
    /// regex, the owning rule just stops matching.
    pub fn validate(&self) -> AlberoResult<()> {
        for pattern in self.patterns.iter().chain(self.repository.values()) {
            pattern.validate()?;
        }
        Ok(())
    }
}
