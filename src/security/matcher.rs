//! Topic selector matching and the authorization rules built on it.
//!
//! The rules are pure functions of their arguments. Compiled URI templates
//! are memoized in a bounded process-wide cache, and long-lived listeners
//! hold a [`Selector`] compiled once at subscription time.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use crate::broker::message::Message;
use crate::security::claim::Claim;
use crate::security::uri_template::UriTemplate;

/// Selector matching every topic.
pub const WILDCARD: &str = "*";

/// Number of distinct templates kept compiled; the cache is reset past it.
pub const TEMPLATE_CACHE_LIMIT: usize = 4096;

static TEMPLATES: LazyLock<RwLock<HashMap<String, Option<UriTemplate>>>> =
    LazyLock::new(Default::default);

/// Compiles `selector` once; `None` for malformed templates.
fn cached_template(selector: &str) -> Option<UriTemplate> {
    if let Ok(cache) = TEMPLATES.read() {
        if let Some(template) = cache.get(selector) {
            return template.clone();
        }
    }

    let template = UriTemplate::parse(selector);
    if let Ok(mut cache) = TEMPLATES.write() {
        if cache.len() >= TEMPLATE_CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(selector.to_string(), template.clone());
    }
    template
}

/// A topic selector compiled for repeated matching.
#[derive(Debug, Clone)]
pub enum Selector {
    Wildcard,
    Exact(String),
    /// A selector containing `{`. A malformed template only matches itself.
    Template(String, Option<UriTemplate>),
}

impl Selector {
    pub fn new(selector: &str) -> Self {
        if selector == WILDCARD {
            Selector::Wildcard
        } else if selector.contains('{') {
            Selector::Template(selector.to_string(), cached_template(selector))
        } else {
            Selector::Exact(selector.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Selector::Wildcard => WILDCARD,
            Selector::Exact(selector) | Selector::Template(selector, _) => selector,
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Selector::Wildcard => true,
            Selector::Exact(selector) => selector == topic,
            Selector::Template(selector, template) => {
                selector == topic || template.as_ref().is_some_and(|t| t.matches(topic))
            }
        }
    }
}

/// True if `topic` is listed in `selectors`, `*` is listed, or a URI template
/// selector matches it.
pub fn matches_selectors<S: AsRef<str>>(topic: &str, selectors: &[S]) -> bool {
    selectors.iter().map(AsRef::as_ref).any(|selector| {
        selector == topic
            || selector == WILDCARD
            || (selector.contains('{')
                && cached_template(selector).is_some_and(|template| template.matches(topic)))
    })
}

/// Publishing requires a `publish` list. Private updates must also match it;
/// public ones are only checked against `publish_exclude`.
pub fn can_publish(topic: &str, claim: &Claim, private: bool) -> bool {
    let Some(publish) = &claim.publish else {
        return false;
    };

    if matches_selectors(topic, &claim.publish_exclude) {
        return false;
    }

    !private || matches_selectors(topic, publish)
}

pub fn can_subscribe(selector: &str, claim: Option<&Claim>, allow_anonymous: bool) -> bool {
    if allow_anonymous {
        return true;
    }

    claim.is_some_and(|claim| claim_allows(selector, claim))
}

/// Decides whether an update published on `topic` is delivered to a subscriber.
pub fn can_receive<S: AsRef<str>>(
    topic: &str,
    message: &Message,
    subscribed: &[S],
    claim: Option<&Claim>,
    allow_anonymous: bool,
) -> bool {
    if !matches_selectors(topic, subscribed) {
        return false;
    }

    if claim.is_none() && !allow_anonymous {
        return false;
    }

    if !message.private {
        return true;
    }

    claim.is_some_and(|claim| claim_allows(topic, claim))
}

fn claim_allows(topic: &str, claim: &Claim) -> bool {
    let Some(subscribe) = &claim.subscribe else {
        return false;
    };

    matches_selectors(topic, subscribe) && !matches_selectors(topic, &claim.subscribe_exclude)
}
