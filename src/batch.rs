//! Positional batch results

use crate::error::{is_problem, MultiError, Result, StoreError};

/// Outcome of a multi-key call, aligned with the input.
///
/// Slot `i` holds the value or the per-item error for input position `i`.
#[derive(Debug)]
pub struct BatchResult<T> {
    items: Vec<Result<T>>,
}

impl<T> BatchResult<T> {
    pub fn new(items: Vec<Result<T>>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if every position succeeded
    pub fn is_ok(&self) -> bool {
        self.items.iter().all(|r| r.is_ok())
    }

    /// True if any position failed with something other than not-found
    pub fn is_problem(&self) -> bool {
        self.items.iter().any(|r| matches!(r, Err(e) if is_problem(e)))
    }

    pub fn get(&self, index: usize) -> Option<&Result<T>> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Result<T>> {
        self.items.iter()
    }

    /// Input positions that failed
    pub fn failed_positions(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_err().then_some(i))
            .collect()
    }

    pub fn into_items(self) -> Vec<Result<T>> {
        self.items
    }

    /// All values, or a positional `MultiError` if any position failed
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.into_parts() {
            (values, None) => Ok(values.into_iter().flatten().collect()),
            (_, Some(merr)) => Err(StoreError::MultiError(merr)),
        }
    }

    /// Split into positional values and positional errors
    pub fn into_parts(self) -> (Vec<Option<T>>, Option<MultiError>) {
        let mut values = Vec::with_capacity(self.items.len());
        let mut errors = Vec::with_capacity(self.items.len());
        let mut failed = false;
        for item in self.items {
            match item {
                Ok(v) => {
                    values.push(Some(v));
                    errors.push(None);
                }
                Err(e) => {
                    failed = true;
                    values.push(None);
                    errors.push(Some(e));
                }
            }
        }
        let merr = failed.then(|| MultiError::new(errors));
        (values, merr)
    }
}

impl<T> IntoIterator for BatchResult<T> {
    type Item = Result<T>;
    type IntoIter = std::vec::IntoIter<Result<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
