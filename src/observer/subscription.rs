//! Subscription Parsing
//!
//! Subscriptions are declared with a small inline notation: `"image"`
//! subscribes to the name alone, `"image()"` is the same with an empty
//! dependency list, and `"image(capture decoder)"` additionally declares
//! that the subscribers named `capture` and `decoder` must run earlier
//! whenever they observe the same name.

use std::collections::HashSet;

use crate::observer::error::{ObserverError, ObserverResult};

/// A parsed subscription: the observed name plus the set of subscriber
/// names that must run before this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub name: String,
    pub depends_on: HashSet<String>,
}

impl Subscription {
    /// Subscription to a bare name with no ordering requirements.
    pub fn plain<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            depends_on: HashSet::new(),
        }
    }
}

/// Parse a subscription string.
pub fn parse_subscription(input: &str) -> ObserverResult<Subscription> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ObserverError::invalid_subscription("empty subscription"));
    }

    let (name, deps) = match input.find('(') {
        None => (input, None),
        Some(open) => {
            if !input.ends_with(')') {
                return Err(ObserverError::invalid_subscription(format!(
                    "unbalanced parenthesis in '{}'",
                    input
                )));
            }
            (&input[..open], Some(&input[open + 1..input.len() - 1]))
        }
    };

    if name.is_empty() {
        return Err(ObserverError::invalid_subscription(format!(
            "missing name in '{}'",
            input
        )));
    }
    if name.contains(|c: char| c.is_whitespace() || c == ')') {
        return Err(ObserverError::invalid_subscription(format!(
            "malformed name in '{}'",
            input
        )));
    }

    let depends_on = deps
        .map(|list| {
            if list.contains('(') || list.contains(')') {
                return Err(ObserverError::invalid_subscription(format!(
                    "nested parenthesis in '{}'",
                    input
                )));
            }
            Ok(list.split_whitespace().map(str::to_string).collect())
        })
        .transpose()?
        .unwrap_or_default();

    Ok(Subscription {
        name: name.to_string(),
        depends_on,
    })
}
