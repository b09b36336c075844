//! Computes the final `svn:*` property set for an added or changed path by
//! running an ordered list of rules (§4.9): executable bit, binary sniffing,
//! mime-type lookup, auto-props glob matching, eol-style, and keywords.

pub mod engine;
pub mod error;
pub mod mime_types;
pub mod rule;
pub mod sniff;

pub use engine::Engine;
pub use error::{Error, Result};
pub use rule::{
    AutoPropsEntry, AutoPropsRule, BinarySniffRule, DefaultEolRule, EolStyleRule, ExecutableRule,
    FileContext, KeywordsRule, MimeTypeRule, MimeTypesTableRule, PropertyRule, Properties,
};
pub use sniff::looks_binary;
