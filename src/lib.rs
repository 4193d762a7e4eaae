mod error;
mod grammars;
mod scope;
mod text;
mod tokenizer;

pub use error::Error;
pub use grammars::{
    BeginEndPattern, BeginWhilePattern, Capture, Captures, Grammar, IncludePattern, MatchPattern,
    MatchRegex, Pattern, PatternsList, SearchResult,
};
pub use scope::{Scope, ScopeName};
pub use tokenizer::{
    GrammarTokenizer, SyntaxNode, Tokenizer, TokenizerContext, TokenizerRepository,
    TokenizerResult,
};
