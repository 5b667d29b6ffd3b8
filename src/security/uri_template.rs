//! Matching of topics against RFC 6570 URI templates.
//!
//! A template such as `/books/{id}` or `/users{/id,section}{?format}` is
//! compiled into an anchored regular expression that accepts every URI the
//! template could expand to. Only matching is needed by the hub, so variable
//! values are never extracted into a map.

use regex::Regex;

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    source: String,
    pattern: Regex,
}

impl UriTemplate {
    /// Compiles `template`, returning `None` when it is not a valid template.
    pub fn parse(template: &str) -> Option<Self> {
        let mut pattern = String::from("^");
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            if literal.contains('}') {
                return None;
            }
            pattern.push_str(&regex::escape(literal));

            let close = tail.find('}')?;
            let expression = &tail[1..close];
            pattern.push_str(&expression_pattern(expression)?);
            rest = &tail[close + 1..];
        }

        if rest.contains('}') {
            return None;
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        Some(Self {
            source: template.to_string(),
            pattern: Regex::new(&pattern).ok()?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when `uri` is a possible expansion of the template.
    pub fn matches(&self, uri: &str) -> bool {
        self.pattern.is_match(uri)
    }
}

/// Expansion rules of one operator: prefix, separator, whether values are
/// named (`name=value`) and the characters a single value cannot contain.
struct Operator {
    prefix: &'static str,
    separator: &'static str,
    named: bool,
    excluded: &'static str,
}

fn operator(symbol: Option<char>) -> Option<Operator> {
    let op = match symbol {
        None => ("", ",", false, "/?#,"),
        Some('+') => ("", ",", false, "?#,"),
        Some('#') => ("#", ",", false, ","),
        Some('.') => (".", ".", false, "/?#."),
        Some('/') => ("/", "/", false, "/?#"),
        Some(';') => (";", ";", true, "/?#;"),
        Some('?') => ("?", "&", true, "#&"),
        Some('&') => ("&", "&", true, "#&"),
        Some(_) => return None,
    };
    let (prefix, separator, named, excluded) = op;
    Some(Operator {
        prefix,
        separator,
        named,
        excluded,
    })
}

fn expression_pattern(expression: &str) -> Option<String> {
    let mut chars = expression.chars();
    let first = chars.next()?;
    let (op, variables) = if first.is_ascii_alphanumeric() || first == '_' || first == '%' {
        (operator(None)?, expression)
    } else {
        (operator(Some(first))?, chars.as_str())
    };

    let value = format!("[^{}]*", regex::escape(op.excluded));
    let mut parts = Vec::new();
    for varspec in variables.split(',') {
        let (name, explode) = match varspec.strip_suffix('*') {
            Some(name) => (name, true),
            None => (varspec.split(':').next().unwrap_or(varspec), false),
        };
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '%')
        {
            return None;
        }

        let single = if op.named {
            format!("{}(?:={})?", regex::escape(name), value)
        } else {
            value.clone()
        };
        let item = if explode {
            let exploded = if op.named {
                format!("[^{}=]+(?:={})?", regex::escape(op.excluded), value)
            } else {
                value.clone()
            };
            format!("{exploded}(?:{}{exploded})*", regex::escape(op.separator))
        } else {
            single
        };
        parts.push(item);
    }

    // Undefined variables are omitted from the expansion, so every variable
    // after the first is optional and the whole expression may be empty.
    let separator = regex::escape(op.separator);
    let mut body = format!("(?:{})", parts[0]);
    for part in &parts[1..] {
        body.push_str(&format!("(?:{separator}{part})?"));
    }
    Some(format!("(?:{}{})?", regex::escape(op.prefix), body))
}
