//! Lazy, composable pipelines over shared backing lists.
//!
//! # Responsibility
//! - Record map / filter / keep steps and run them only on iteration.
//! - Share one backing list between every view built from it, so a view
//!   reflects later mutations of the list.
//!
//! # Invariants
//! - Building a pipeline never evaluates a step.
//! - Iteration works on a snapshot of the backing list and of the steps taken
//!   when iteration starts.
//! - A safe query never changes its own pipeline; builder calls return a new
//!   query. An unsafe query appends the step to its pipeline and returns a
//!   handle to that same pipeline.

use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::iter::Sum;
use std::rc::Rc;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// `remove` / `replace` target is not in the backing list.
    NotFound,
    /// The query is a projection and owns no backing list.
    Detached,
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "item not found in query backing list"),
            Self::Detached => write!(f, "projected query has no backing list to mutate"),
        }
    }
}

impl Error for QueryError {}

/// Items that expose named attributes to `where_eq` and `getattr`.
pub trait Record {
    fn attr(&self, name: &str) -> Option<Value>;
}

impl Record for Value {
    fn attr(&self, name: &str) -> Option<Value> {
        self.as_map().and_then(|entries| entries.get(name).cloned())
    }
}

impl Record for BTreeMap<String, Value> {
    fn attr(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

enum Source<T> {
    Rows(Rc<RefCell<Vec<T>>>),
    Derived(Rc<dyn Fn() -> Vec<T>>),
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Rows(rows) => Self::Rows(Rc::clone(rows)),
            Self::Derived(producer) => Self::Derived(Rc::clone(producer)),
        }
    }
}

enum Step<T> {
    Map(Rc<dyn Fn(T) -> T>),
    Filter(Rc<dyn Fn(&T) -> bool>),
    Keep(Rc<dyn Fn(&T) -> bool>),
}

impl<T> Clone for Step<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Map(f) => Self::Map(Rc::clone(f)),
            Self::Filter(f) => Self::Filter(Rc::clone(f)),
            Self::Keep(f) => Self::Keep(Rc::clone(f)),
        }
    }
}

/// Lazy view over a shared list of `T`.
///
/// Cloning a query clones the handle: both clones share the backing list and
/// the pipeline.
pub struct Query<T> {
    source: Source<T>,
    steps: Rc<RefCell<Vec<Step<T>>>>,
    safe: bool,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            steps: Rc::clone(&self.steps),
            safe: self.safe,
        }
    }
}

impl<T: Clone + 'static> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Query<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(rows: Vec<T>) -> Self {
        Self {
            source: Source::Rows(Rc::new(RefCell::new(rows))),
            steps: Rc::new(RefCell::new(Vec::new())),
            safe: false,
        }
    }

    /// Marks this handle safe: later builder calls return new queries.
    pub fn safe(mut self) -> Self {
        self.safe = true;
        self
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// New query over the same backing list with a private copy of the steps.
    pub fn copy(&self, safe: Option<bool>) -> Self {
        Self {
            source: self.source.clone(),
            steps: Rc::new(RefCell::new(self.steps.borrow().clone())),
            safe: safe.unwrap_or(self.safe),
        }
    }

    /// Materializes the current result into a new, independent backing list.
    pub fn finalize(&self, safe: Option<bool>) -> Self {
        let mut finalized = Self::from_vec(self.list());
        finalized.safe = safe.unwrap_or(self.safe);
        finalized
    }

    fn push(&self, step: Step<T>) -> Self {
        let query = if self.safe {
            self.copy(Some(false))
        } else {
            self.clone()
        };
        query.steps.borrow_mut().push(step);
        query
    }

    pub fn map(&self, f: impl Fn(T) -> T + 'static) -> Self {
        self.push(Step::Map(Rc::new(f)))
    }

    /// Drops items for which `f` is true.
    pub fn filter(&self, f: impl Fn(&T) -> bool + 'static) -> Self {
        self.push(Step::Filter(Rc::new(f)))
    }

    /// Keeps only items for which `f` is true.
    pub fn keep(&self, f: impl Fn(&T) -> bool + 'static) -> Self {
        self.push(Step::Keep(Rc::new(f)))
    }

    /// Type-changing map. The result is a detached view that re-runs this
    /// pipeline (as it is now) every time it is iterated.
    pub fn project<U: Clone + 'static>(&self, f: impl Fn(T) -> U + 'static) -> Query<U> {
        let parent = self.copy(Some(false));
        Query {
            source: Source::Derived(Rc::new(move || parent.iter().map(&f).collect())),
            steps: Rc::new(RefCell::new(Vec::new())),
            safe: self.safe,
        }
    }

    pub fn iter(&self) -> QueryIter<T> {
        let rows = match &self.source {
            Source::Rows(rows) => rows.borrow().clone(),
            Source::Derived(producer) => producer(),
        };
        QueryIter {
            rows: rows.into_iter(),
            steps: self.steps.borrow().clone(),
        }
    }

    pub fn first(&self) -> Option<T> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<T> {
        self.iter().last()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }

    pub fn list(&self) -> Vec<T> {
        self.iter().collect()
    }

    pub fn sorted_by_key<K: Ord>(&self, key: impl FnMut(&T) -> K) -> Vec<T> {
        let mut items = self.list();
        items.sort_by_key(key);
        items
    }

    fn rows(&self) -> QueryResult<&Rc<RefCell<Vec<T>>>> {
        match &self.source {
            Source::Rows(rows) => Ok(rows),
            Source::Derived(_) => Err(QueryError::Detached),
        }
    }

    /// Appends to the backing list; visible to every view sharing it.
    pub fn append(&self, item: T) -> QueryResult<()> {
        self.rows()?.borrow_mut().push(item);
        Ok(())
    }

    /// Removes every backing item matching `f`; returns how many went.
    pub fn remove_where(&self, f: impl Fn(&T) -> bool) -> QueryResult<usize> {
        let mut rows = self.rows()?.borrow_mut();
        let before = rows.len();
        rows.retain(|item| !f(item));
        Ok(before - rows.len())
    }

    /// Replaces the first backing item matching `f`.
    pub fn replace_where(&self, f: impl Fn(&T) -> bool, new: T) -> QueryResult<()> {
        let mut rows = self.rows()?.borrow_mut();
        let slot = rows.iter_mut().find(|item| f(item)).ok_or(QueryError::NotFound)?;
        *slot = new;
        Ok(())
    }

    /// Number of items in the backing list, ignoring the pipeline.
    pub fn backing_len(&self) -> usize {
        match &self.source {
            Source::Rows(rows) => rows.borrow().len(),
            Source::Derived(producer) => producer().len(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Query<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.iter().any(|candidate| &candidate == item)
    }

    /// Removes the first occurrence of `item` from the backing list.
    pub fn remove(&self, item: &T) -> QueryResult<()> {
        let mut rows = self.rows()?.borrow_mut();
        let index = rows
            .iter()
            .position(|candidate| candidate == item)
            .ok_or(QueryError::NotFound)?;
        rows.remove(index);
        Ok(())
    }

    /// Replaces the first occurrence of `old` in the backing list.
    pub fn replace(&self, old: &T, new: T) -> QueryResult<()> {
        let mut rows = self.rows()?.borrow_mut();
        let slot = rows
            .iter_mut()
            .find(|candidate| *candidate == old)
            .ok_or(QueryError::NotFound)?;
        *slot = new;
        Ok(())
    }
}

impl<T: Clone + PartialOrd + 'static> Query<T> {
    pub fn max(&self, default: T) -> T {
        self.iter()
            .reduce(|best, item| if item > best { item } else { best })
            .unwrap_or(default)
    }

    pub fn min(&self, default: T) -> T {
        self.iter()
            .reduce(|best, item| if item < best { item } else { best })
            .unwrap_or(default)
    }
}

impl<T: Clone + Sum + 'static> Query<T> {
    pub fn sum(&self) -> T {
        self.iter().sum()
    }
}

impl<T: Record + Clone + 'static> Query<T> {
    /// Keeps items whose attribute `name` equals `value` (missing reads as null).
    pub fn where_eq(&self, name: &str, value: Value) -> Self {
        let name = name.to_string();
        self.keep(move |item| item.attr(&name).unwrap_or_default() == value)
    }

    /// Keeps items matching every `(name, value)` pair.
    pub fn where_all(&self, pairs: Vec<(String, Value)>) -> Self {
        self.keep(move |item| {
            pairs
                .iter()
                .all(|(name, value)| &item.attr(name).unwrap_or_default() == value)
        })
    }

    /// Projects every item onto its attribute `name` (missing reads as null).
    pub fn getattr(&self, name: &str) -> Query<Value> {
        let name = name.to_string();
        self.project(move |item| item.attr(&name).unwrap_or_default())
    }
}

impl<K: Ord + Clone + 'static, V: Clone + 'static> Query<(K, V)> {
    pub fn dict(&self) -> BTreeMap<K, V> {
        self.iter().collect()
    }
}

impl<'a, T: Clone + 'static> IntoIterator for &'a Query<T> {
    type Item = T;
    type IntoIter = QueryIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a query snapshot.
pub struct QueryIter<T> {
    rows: std::vec::IntoIter<T>,
    steps: Vec<Step<T>>,
}

impl<T> Iterator for QueryIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        'rows: for mut item in self.rows.by_ref() {
            for step in &self.steps {
                match step {
                    Step::Map(f) => item = f(item),
                    Step::Filter(f) => {
                        if f(&item) {
                            continue 'rows;
                        }
                    }
                    Step::Keep(f) => {
                        if !f(&item) {
                            continue 'rows;
                        }
                    }
                }
            }
            return Some(item);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{Query, QueryError};
    use crate::value::Value;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn steps_run_only_on_iteration() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let query = Query::from_vec(vec![1, 2, 3]).map(move |x| {
            seen.set(seen.get() + 1);
            x * 10
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(query.list(), vec![10, 20, 30]);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn first_excluding_step_short_circuits() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let query = Query::from_vec(vec![1, 2, 3, 4])
            .keep(|x| x % 2 == 0)
            .map(move |x| {
                seen.set(seen.get() + 1);
                x
            });
        assert_eq!(query.list(), vec![2, 4]);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unsafe_query_grows_shared_pipeline() {
        let base = Query::from_vec(vec![1, 2, 3, 4]);
        let view = base.keep(|x| *x > 1);
        assert_eq!(base.list(), vec![2, 3, 4]);
        assert_eq!(view.list(), vec![2, 3, 4]);
    }

    #[test]
    fn safe_query_is_untouched_by_builders() {
        let base = Query::from_vec(vec![1, 2, 3, 4]).safe();
        let view = base.keep(|x| *x > 2);
        assert_eq!(base.list(), vec![1, 2, 3, 4]);
        assert_eq!(view.list(), vec![3, 4]);
        assert!(!view.is_safe());
    }

    #[test]
    fn views_observe_later_backing_mutations() {
        let base = Query::from_vec(vec![1, 2]).safe();
        let evens = base.keep(|x| x % 2 == 0);
        base.append(4).unwrap();
        assert_eq!(evens.list(), vec![2, 4]);
    }

    #[test]
    fn remove_and_replace_report_missing_items() {
        let query = Query::from_vec(vec!["a", "b"]);
        assert_eq!(query.remove(&"z"), Err(QueryError::NotFound));
        assert_eq!(query.replace(&"z", "y"), Err(QueryError::NotFound));
        query.replace(&"a", "c").unwrap();
        assert_eq!(query.list(), vec!["c", "b"]);
    }

    #[test]
    fn projection_is_detached_but_live() {
        let base = Query::from_vec(vec![1_i64, 2]).safe();
        let values = base.project(Value::Int);
        assert_eq!(values.append(Value::Null), Err(QueryError::Detached));
        base.append(3).unwrap();
        assert_eq!(values.sum(), Value::Int(6));
        assert_eq!(values.max(Value::Int(0)), Value::Int(3));
    }

    #[test]
    fn terminals_on_empty_queries() {
        let query: Query<i64> = Query::new();
        assert_eq!(query.first(), None);
        assert_eq!(query.max(-1), -1);
        assert_eq!(query.count(), 0);
    }

    #[test]
    fn finalize_freezes_current_result() {
        let base = Query::from_vec(vec![3, 1, 2]).safe();
        let frozen = base.keep(|x| *x > 1).finalize(None);
        base.append(5).unwrap();
        assert_eq!(frozen.list(), vec![3, 2]);
        assert_eq!(frozen.sorted_by_key(|x| *x), vec![2, 3]);
    }
}
