//! Channel selection shared by all decoders.

use regex::Regex;

use crate::error::LoadError;

/// Restricts which channels get loaded from an image.
///
/// A plain selector matches any channel whose name contains the pattern
/// (case sensitive).  A regex selector must match the whole channel name.
/// An empty pattern selects everything.
#[derive(Debug, Clone)]
pub struct ChannelSelector {
    pattern: String,
    regex: Option<Regex>,
}

impl ChannelSelector {
    pub fn new(pattern: &str, is_regex: bool) -> Result<ChannelSelector, LoadError> {
        let regex = if is_regex && !pattern.is_empty() {
            Some(Regex::new(&format!("^(?:{})$", pattern))?)
        } else {
            None
        };

        Ok(ChannelSelector {
            pattern: pattern.into(),
            regex: regex,
        })
    }

    /// A selector that matches every channel.
    pub fn all() -> ChannelSelector {
        ChannelSelector {
            pattern: String::new(),
            regex: None,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    pub fn matches(&self, name: &str) -> bool {
        match self.regex {
            Some(ref regex) => regex.is_match(name),
            None => name.contains(self.pattern.as_str()),
        }
    }
}

impl Default for ChannelSelector {
    fn default() -> Self {
        ChannelSelector::all()
    }
}

/// One-shot form of `ChannelSelector::matches()`.
pub fn matches(text: &str, filter: &str, is_regex: bool) -> Result<bool, LoadError> {
    Ok(ChannelSelector::new(filter, is_regex)?.matches(text))
}
