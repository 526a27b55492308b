//! Polymorphic, reactive value sources.
//!
//! Endpoint parameters (and the `enabled` override) can be supplied three
//! ways: as a static value, as a reactive cell backed by
//! [`tokio::sync::watch`], or as a zero-argument accessor closure. All three
//! shapes hide behind [`Source`], which exposes a single "read the current
//! value" operation so that downstream computations (resolved path, cache
//! key, enablement) stay pure functions of the current value.
//!
//! Accessor closures are re-invoked on every read and never memoized, since
//! their captured environment may read external mutable state. Cells
//! additionally provide a change notification that endpoint streams wait on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

/// A parameter object: property name → JSON value, with deterministic
/// iteration order.
pub type Params = BTreeMap<String, Value>;

/// Builds a [`Params`] map from `(name, value)` pairs.
///
/// ```
/// use opquery::source::params;
///
/// let p = params([("petId", "123"), ("limit", "10")]);
/// assert_eq!(p["petId"], "123");
/// ```
pub fn params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A readable value that is either static, a reactive cell, or an accessor
/// closure.
pub enum Source<T> {
    /// A fixed value.
    Value(T),
    /// A reactive cell; reads observe the latest written value.
    Cell(watch::Receiver<T>),
    /// An accessor closure, re-invoked on every read.
    Thunk(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> Source<T> {
    /// Reads the current value, dispatching on the source shape.
    pub fn get(&self) -> T {
        match self {
            Source::Value(value) => value.clone(),
            Source::Cell(rx) => rx.borrow().clone(),
            Source::Thunk(f) => f(),
        }
    }
}

impl<T> Source<T> {
    /// Wraps an accessor closure.
    pub fn thunk(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Source::Thunk(Arc::new(f))
    }

    /// A receiver for change notifications, available only for cell-backed
    /// sources. Static values and thunks have no change signal; consumers
    /// re-read them on other wakeups.
    pub fn changes(&self) -> Option<watch::Receiver<T>> {
        match self {
            Source::Cell(rx) => Some(rx.clone()),
            _ => None,
        }
    }
}

impl<T> Clone for Source<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Source::Value(value) => Source::Value(value.clone()),
            Source::Cell(rx) => Source::Cell(rx.clone()),
            Source::Thunk(f) => Source::Thunk(f.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Source::Cell(rx) => f.debug_tuple("Cell").field(&*rx.borrow()).finish(),
            Source::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

/// The parameter source attached to an endpoint. `None` means "no parameters
/// provided": all placeholders stay unresolved.
pub type ParamSource = Source<Option<Params>>;

impl ParamSource {
    /// A source that never supplies parameters.
    #[must_use]
    pub fn none() -> Self {
        Source::Value(None)
    }
}

impl From<Params> for ParamSource {
    fn from(params: Params) -> Self {
        Source::Value(Some(params))
    }
}

impl From<Option<Params>> for ParamSource {
    fn from(params: Option<Params>) -> Self {
        Source::Value(params)
    }
}

impl From<watch::Receiver<Option<Params>>> for ParamSource {
    fn from(rx: watch::Receiver<Option<Params>>) -> Self {
        Source::Cell(rx)
    }
}

impl From<bool> for Source<bool> {
    fn from(value: bool) -> Self {
        Source::Value(value)
    }
}

impl From<watch::Receiver<bool>> for Source<bool> {
    fn from(rx: watch::Receiver<bool>) -> Self {
        Source::Cell(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_static_value() {
        let source: Source<u32> = Source::Value(7);
        assert_eq!(source.get(), 7);
        assert!(source.changes().is_none());
    }

    #[test]
    fn test_cell_reads_latest_value() {
        let (tx, rx) = watch::channel(1u32);
        let source = Source::Cell(rx);

        assert_eq!(source.get(), 1);
        tx.send(2).unwrap();
        assert_eq!(source.get(), 2);
        assert!(source.changes().is_some());
    }

    #[test]
    fn test_thunk_reinvoked_on_every_read() {
        let counter = Arc::new(AtomicU32::new(0));
        let counted = counter.clone();
        let source = Source::thunk(move || counted.fetch_add(1, Ordering::SeqCst));

        assert_eq!(source.get(), 0);
        assert_eq!(source.get(), 1);
        assert_eq!(source.get(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_param_source_conversions() {
        let from_map: ParamSource = params([("petId", "123")]).into();
        assert_eq!(
            from_map.get().unwrap()["petId"],
            Value::String("123".to_string())
        );

        let empty = ParamSource::none();
        assert!(empty.get().is_none());
    }
}
