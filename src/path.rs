//! URL path template resolution.
//!
//! Templates use `{name}` placeholders, e.g. `/pets/{petId}/photos/{photoId}`.
//! Resolution substitutes the current parameter values and reports whether
//! every placeholder was filled; unresolved placeholders keep their literal
//! `{name}` token so the result is still inspectable.
//!
//! Resolution is a pure function of the template and the current parameter
//! value. Callers re-run it on every reactive tick and immediately before
//! each request dispatch, so a request is always built from the values
//! current at dispatch time.

use serde_json::Value;

use crate::source::Params;

/// The result of substituting parameters into a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// The substituted URL. Unresolved placeholders keep their `{name}` token.
    pub url: String,
    /// `true` iff no `{name}` tokens remain.
    pub is_fully_resolved: bool,
}

/// Extracts the placeholder names of a template, in template order.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        names.push(&rest[open + 1..open + close]);
        rest = &rest[open + close + 1..];
    }
    names
}

/// Substitutes parameter values into `template`.
///
/// A parameter counts as defined when it is present and is a scalar
/// (string, number, or boolean). `None` params leave every placeholder
/// unresolved.
pub fn resolve(template: &str, params: Option<&Params>) -> ResolvedPath {
    let mut url = String::with_capacity(template.len());
    let mut is_fully_resolved = true;
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        url.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        match params.and_then(|p| p.get(name)).and_then(scalar) {
            Some(value) => url.push_str(&value),
            None => {
                is_fully_resolved = false;
                url.push('{');
                url.push_str(name);
                url.push('}');
            }
        }
        rest = &rest[open + close + 1..];
    }
    url.push_str(rest);

    ResolvedPath {
        url,
        is_fully_resolved,
    }
}

/// The placeholder names that `params` does not currently satisfy.
pub fn unresolved(template: &str, params: Option<&Params>) -> Vec<String> {
    placeholders(template)
        .into_iter()
        .filter(|name| {
            params
                .and_then(|p| p.get(*name))
                .and_then(scalar)
                .is_none()
        })
        .map(str::to_string)
        .collect()
}

/// Renders a scalar JSON value as a path segment. Null, arrays, and objects
/// have no canonical path encoding and count as undefined.
pub(crate) fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
