use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ReactiveError, Result};
use crate::reactive::{Runtime, Signal};

use super::Shape;

struct VecState<T> {
    raw: RefCell<Vec<T>>,
    /// Entry cells by index, created on first read. `None` past the end.
    cells: RefCell<Vec<Option<Signal<Option<T>>>>>,
    shape: Shape,
}

/// A vector whose elements are individually reactive.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use strand_core::{ReactiveVec, Runtime};
///
/// let rt = Runtime::new();
/// let items = ReactiveVec::new(&rt, vec![1, 2, 3]);
///
/// let first_runs = Rc::new(Cell::new(0));
/// let _first = {
///     let (items, runs) = (items.clone(), first_runs.clone());
///     rt.effect(move || {
///         items.get(0);
///         runs.set(runs.get() + 1);
///     })
/// };
///
/// // Writing another index leaves readers of index 0 alone.
/// items.set(2, 30).unwrap();
/// assert_eq!(first_runs.get(), 1);
///
/// // Shifting everything right changes index 0.
/// items.insert(0, 0).unwrap();
/// assert_eq!(first_runs.get(), 2);
/// assert_eq!(items.raw(), vec![0, 1, 2, 30]);
/// ```
pub struct ReactiveVec<T> {
    state: Rc<VecState<T>>,
}

impl<T: Clone + PartialEq + 'static> ReactiveVec<T> {
    /// Wrap `items`. Entry cells will belong to the runtime's current scope.
    pub fn new(runtime: &Runtime, items: Vec<T>) -> Self {
        Self {
            state: Rc::new(VecState {
                raw: RefCell::new(items),
                cells: RefCell::new(Vec::new()),
                shape: Shape::new(runtime),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The element at `index`, tracking that index only.
    pub fn get(&self, index: usize) -> Option<T> {
        self.track_index(index);
        self.state.raw.borrow().get(index).cloned()
    }

    /// Borrow the element at `index`, tracking that index only.
    pub fn with<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.track_index(index);
        let raw = self.state.raw.borrow();
        let len = raw.len();
        raw.get(index)
            .map(f)
            .ok_or(ReactiveError::OutOfRange { index, len })
    }

    pub fn len(&self) -> usize {
        self.state.shape.track();
        self.state.raw.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone out every element, tracking the structure and each index.
    pub fn to_vec(&self) -> Vec<T> {
        self.track_all();
        self.state.raw.borrow().clone()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.position(value).is_some()
    }

    pub fn position(&self, value: &T) -> Option<usize> {
        self.track_all();
        self.state.raw.borrow().iter().position(|item| item == value)
    }

    /// The backing vector, without tracking anything.
    pub fn raw(&self) -> Vec<T> {
        self.state.raw.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Replace the element at `index`. Only readers of that index rerun.
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        {
            let mut raw = self.state.raw.borrow_mut();
            let len = raw.len();
            let slot = raw
                .get_mut(index)
                .ok_or(ReactiveError::OutOfRange { index, len })?;
            *slot = value.clone();
        }
        let cell = self.state.cells.borrow().get(index).cloned().flatten();
        if let Some(cell) = cell {
            cell.set(Some(value));
        }
        Ok(())
    }

    pub fn push(&self, value: T) {
        let from = {
            let mut raw = self.state.raw.borrow_mut();
            raw.push(value);
            raw.len() - 1
        };
        self.restructure(from);
    }

    pub fn pop(&self) -> Option<T> {
        let (value, from) = {
            let mut raw = self.state.raw.borrow_mut();
            let value = raw.pop()?;
            (value, raw.len())
        };
        self.restructure(from);
        Some(value)
    }

    pub fn insert(&self, index: usize, value: T) -> Result<()> {
        {
            let mut raw = self.state.raw.borrow_mut();
            let len = raw.len();
            if index > len {
                return Err(ReactiveError::OutOfRange { index, len });
            }
            raw.insert(index, value);
        }
        self.restructure(index);
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<T> {
        let value = {
            let mut raw = self.state.raw.borrow_mut();
            let len = raw.len();
            if index >= len {
                return Err(ReactiveError::OutOfRange { index, len });
            }
            raw.remove(index)
        };
        self.restructure(index);
        Ok(value)
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        {
            let mut raw = self.state.raw.borrow_mut();
            let len = raw.len();
            if let Some(index) = [a, b].into_iter().find(|&i| i >= len) {
                return Err(ReactiveError::OutOfRange { index, len });
            }
            raw.swap(a, b);
        }
        self.restructure(a.min(b));
        Ok(())
    }

    pub fn reverse(&self) {
        self.state.raw.borrow_mut().reverse();
        self.restructure(0);
    }

    pub fn truncate(&self, len: usize) {
        let changed = {
            let mut raw = self.state.raw.borrow_mut();
            let before = raw.len();
            raw.truncate(len);
            before != raw.len()
        };
        if changed {
            self.restructure(len);
        }
    }

    pub fn clear(&self) {
        self.truncate(0);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let from = {
            let mut raw = self.state.raw.borrow_mut();
            let from = raw.len();
            raw.extend(items);
            if raw.len() == from {
                return;
            }
            from
        };
        self.restructure(from);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Past-the-end reads depend on `shape`, so they wake on growth without
    /// allocating a cell per requested index.
    fn track_index(&self, index: usize) {
        let value = self.state.raw.borrow().get(index).cloned();
        let Some(value) = value else {
            self.state.shape.track();
            return;
        };
        let cell = {
            let mut cells = self.state.cells.borrow_mut();
            if cells.len() <= index {
                cells.resize_with(index + 1, || None);
            }
            match &cells[index] {
                Some(cell) => Some(cell.clone()),
                None => {
                    let cell = self.state.shape.cell(Some(value));
                    cells[index] = cell.clone();
                    cell
                }
            }
        };
        if let Some(cell) = cell {
            cell.with(|_| ());
        }
    }

    fn track_all(&self) {
        self.state.shape.track();
        let len = self.state.raw.borrow().len();
        for index in 0..len {
            self.track_index(index);
        }
    }

    /// Resync entry cells from `from` onwards and bump `shape`, as one batch.
    fn restructure(&self, from: usize) {
        let updates: Vec<(Signal<Option<T>>, Option<T>)> = {
            let raw = self.state.raw.borrow();
            let cells = self.state.cells.borrow();
            cells
                .iter()
                .enumerate()
                .skip(from)
                .filter_map(|(index, cell)| Some((cell.clone()?, raw.get(index).cloned())))
                .collect()
        };
        self.state.shape.batch(|| {
            for (cell, value) in updates {
                cell.set(value);
            }
            self.state.shape.bump();
        });
    }
}

impl<T> Clone for ReactiveVec<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.state.raw.borrow().iter()).finish()
    }
}
