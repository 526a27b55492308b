//! Hierarchical cache keys.
//!
//! A [`QueryKey`] is an ordered sequence of parts derived from an operation's
//! path template and its resolved parameters: literal template segments stay
//! verbatim, placeholder segments carry the resolved parameter value, and an
//! optional final part holds query parameters sorted by name. Segment order
//! always follows the template, never resolution order, so two resolutions
//! with equal parameter values produce structurally equal keys.
//!
//! Keys are hierarchical on purpose: invalidating the prefix `["pets"]`
//! reaches `["pets"]`, `["pets", "123"]`, and every other descendant.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::path;
use crate::source::Params;

/// One part of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyPart {
    /// A path segment: a literal template segment or a resolved parameter
    /// value.
    Segment(String),
    /// The trailing query-parameter part, sorted by parameter name.
    Params(BTreeMap<String, String>),
}

/// A deterministic, hierarchical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct QueryKey(pub Vec<KeyPart>);

impl QueryKey {
    /// Returns `true` if `prefix` is a component-wise prefix of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0.iter().zip(&prefix.0).all(|(a, b)| a == b)
    }

    /// The number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the empty key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match part {
                KeyPart::Segment(s) => f.write_str(s)?,
                KeyPart::Params(map) => {
                    f.write_str("?")?;
                    for (j, (k, v)) in map.iter().enumerate() {
                        if j > 0 {
                            f.write_str("&")?;
                        }
                        write!(f, "{k}={v}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for QueryKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        QueryKey(
            iter.into_iter()
                .map(|s| KeyPart::Segment(s.into()))
                .collect(),
        )
    }
}

/// Derives the cache key for one resolution of a template.
///
/// Every template segment contributes one [`KeyPart::Segment`] in template
/// order; placeholders are substituted from `params`. Unresolved placeholders
/// keep their `{name}` token (such keys belong to disabled endpoints and are
/// never fetched into). Query parameters, when given, are appended as a
/// final structured part.
pub fn derive_key(template: &str, params: Option<&Params>, query: Option<&Params>) -> QueryKey {
    let mut parts: Vec<KeyPart> = template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| KeyPart::Segment(path::resolve(segment, params).url))
        .collect();

    if let Some(query) = query {
        let rendered: BTreeMap<String, String> = query
            .iter()
            .filter_map(|(name, value)| path::scalar(value).map(|v| (name.clone(), v)))
            .collect();
        if !rendered.is_empty() {
            parts.push(KeyPart::Params(rendered));
        }
    }

    QueryKey(parts)
}

/// Derives the invalidation prefix for a template and a (possibly partial)
/// parameter set: the key parts up to, and excluding, the first segment with
/// an unresolved placeholder.
///
/// `derive_prefix("/pets/{petId}", None)` is `["pets"]` — matching every
/// cached `/pets/*` variant — while supplying `petId` narrows it to that one
/// entry's subtree.
pub fn derive_prefix(template: &str, params: Option<&Params>) -> QueryKey {
    let mut parts = Vec::new();
    for segment in template.split('/').filter(|segment| !segment.is_empty()) {
        let resolved = path::resolve(segment, params);
        if !resolved.is_fully_resolved {
            break;
        }
        parts.push(KeyPart::Segment(resolved.url));
    }
    QueryKey(parts)
}
