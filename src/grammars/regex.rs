use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use onig::{Region, SearchOptions};
use serde::{Deserialize, Serialize};

/// Which anchors stay active in a compiled variant of a pattern.
/// `\A` (start of buffer) and `\G` (exact continuation point) are
/// capabilities of a search, not of the pattern, so we don't want them
/// enabled everywhere; a disabled anchor is rewritten to something that is
/// very unlikely to match.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AnchorSet {
    None,
    A,
    G,
    AG,
}

impl AnchorSet {
    fn new(allow_a: bool, allow_g: bool) -> Self {
        match (allow_a, allow_g) {
            (true, true) => AnchorSet::AG,
            (true, false) => AnchorSet::A,
            (false, true) => AnchorSet::G,
            (false, false) => AnchorSet::None,
        }
    }

    fn index(self) -> usize {
        match self {
            AnchorSet::None => 0,
            AnchorSet::A => 1,
            AnchorSet::G => 2,
            AnchorSet::AG => 3,
        }
    }

    fn rewrite<'a>(self, pattern: &'a str) -> Cow<'a, str> {
        let (kill_a, kill_g) = match self {
            AnchorSet::AG => (false, false),
            AnchorSet::A => (false, true),
            AnchorSet::G => (true, false),
            AnchorSet::None => (true, true),
        };

        let mut out = Cow::Borrowed(pattern);
        if kill_a && out.contains("\\A") {
            out = Cow::Owned(out.replace("\\A", "\u{FFFF}"));
        }
        if kill_g && out.contains("\\G") {
            out = Cow::Owned(out.replace("\\G", "\u{FFFF}"));
        }
        out
    }
}

/// A regex source with two optional anchor capabilities, compiled lazily into
/// up to four variants of the same underlying expression.
pub struct MatchRegex {
    source: String,
    variants: [OnceLock<Option<Arc<onig::Regex>>>; 4],
}

impl MatchRegex {
    pub fn new(source: String) -> Self {
        Self {
            source,
            variants: [const { OnceLock::new() }; 4],
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Validate that the regex source compiles successfully
    pub fn validate(&self) -> Result<(), onig::Error> {
        onig::Regex::new(&self.source).map(|_| ())
    }

    /// The compiled variant for the requested anchor capabilities.
    /// A malformed source yields no variant at all: the owning rule simply
    /// never matches.
    pub(crate) fn get(&self, allow_a: bool, allow_g: bool) -> Option<&Arc<onig::Regex>> {
        let anchors = AnchorSet::new(allow_a, allow_g);
        self.variants[anchors.index()]
            .get_or_init(|| {
                onig::Regex::new(&anchors.rewrite(&self.source))
                    .ok()
                    .map(Arc::new)
            })
            .as_ref()
    }

    /// Finds the first match starting within `range`. The match itself may
    /// extend past `range.end`; callers bound where matches start, not where
    /// they end.
    pub(crate) fn search(
        &self,
        text: &str,
        range: Range<usize>,
        allow_a: bool,
        allow_g: bool,
    ) -> Option<SearchResult> {
        let regex = self.get(allow_a, allow_g)?;

        let mut region = Region::new();
        regex.search_with_options(
            text,
            range.start,
            range.end,
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;

        let groups = (0..region.len())
            .map(|i| region.pos(i).map(|(start, end)| start..end))
            .collect();

        let mut names: HashMap<String, Vec<usize>> = HashMap::new();
        regex.foreach_name(|name, group_indices| {
            names.insert(
                name.to_owned(),
                group_indices.iter().map(|&i| i as usize).collect(),
            );
            true
        });

        Some(SearchResult { groups, names })
    }
}

impl Clone for MatchRegex {
    fn clone(&self) -> Self {
        // A fresh lazy compilation with the same source
        MatchRegex::new(self.source.clone())
    }
}

impl fmt::Debug for MatchRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Serialize for MatchRegex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for MatchRegex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let source = String::deserialize(deserializer)?;
        Ok(MatchRegex::new(source))
    }
}

/// Group positions of one successful search. Group 0 is the whole match;
/// groups that did not participate are `None`. Named groups map to the
/// indices of the (possibly several) groups carrying that name.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub(crate) groups: Vec<Option<Range<usize>>>,
    pub(crate) names: HashMap<String, Vec<usize>>,
}

impl SearchResult {
    /// Range of the whole match.
    pub fn range(&self) -> Range<usize> {
        self.groups[0].clone().unwrap_or_default()
    }

    /// Range of group `index`, if it participated in the match.
    pub fn group(&self, index: usize) -> Option<Range<usize>> {
        self.groups.get(index).cloned().flatten()
    }
}
