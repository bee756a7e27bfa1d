use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::reactive::{Runtime, Signal};

use super::Shape;

struct MapState<K, V> {
    raw: RefCell<IndexMap<K, V>>,
    /// Per-key cells, created on first read. Removed keys keep their cell
    /// (holding `None`) so readers wake up if the key comes back.
    cells: RefCell<IndexMap<K, Signal<Option<V>>>>,
    shape: Shape,
}

/// An insertion-ordered map whose entries are individually reactive.
///
/// Reading a key only depends on that key, present or not:
///
/// ```rust
/// use strand_core::{ReactiveMap, Runtime};
///
/// let rt = Runtime::new();
/// let scores = ReactiveMap::new(&rt);
/// scores.insert("ann", 3);
///
/// let bob = {
///     let scores = scores.clone();
///     rt.memo(move || scores.get(&"bob").unwrap_or(0))
/// };
/// assert_eq!(bob.get(), 0);
///
/// scores.insert("bob", 5);
/// assert_eq!(bob.get(), 5);
/// ```
pub struct ReactiveMap<K, V> {
    state: Rc<MapState<K, V>>,
}

impl<K, V> ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + PartialEq + 'static,
{
    pub fn new(runtime: &Runtime) -> Self {
        Self::from_entries(runtime, IndexMap::new())
    }

    /// Wrap existing entries. Key cells will belong to the runtime's current
    /// scope.
    pub fn from_entries(runtime: &Runtime, entries: IndexMap<K, V>) -> Self {
        Self {
            state: Rc::new(MapState {
                raw: RefCell::new(entries),
                cells: RefCell::new(IndexMap::new()),
                shape: Shape::new(runtime),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.track_key(key);
        self.state.raw.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.track_key(key);
        self.state.raw.borrow().contains_key(key)
    }

    /// Keys in insertion order. Depends on the key set, not on values.
    pub fn keys(&self) -> Vec<K> {
        self.state.shape.track();
        self.state.raw.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.shape.track();
        self.state.raw.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone out every entry, tracking the key set and each value.
    pub fn to_map(&self) -> IndexMap<K, V> {
        self.state.shape.track();
        let keys: Vec<K> = self.state.raw.borrow().keys().cloned().collect();
        for key in &keys {
            self.track_key(key);
        }
        self.state.raw.borrow().clone()
    }

    /// The backing map, without tracking anything.
    pub fn raw(&self) -> IndexMap<K, V> {
        self.state.raw.borrow().clone()
    }

    /// Insert or overwrite. Returns the previous value.
    ///
    /// Overwriting only wakes readers of `key`; a new key also wakes readers
    /// of the key set.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let previous = self
            .state
            .raw
            .borrow_mut()
            .insert(key.clone(), value.clone());
        let cell = self.state.cells.borrow().get(&key).cloned();
        self.state.shape.batch(|| {
            if let Some(cell) = cell {
                cell.set(Some(value));
            }
            if previous.is_none() {
                self.state.shape.bump();
            }
        });
        previous
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(&self, key: &K) -> Option<V> {
        let previous = self.state.raw.borrow_mut().shift_remove(key)?;
        let cell = self.state.cells.borrow().get(key).cloned();
        self.state.shape.batch(|| {
            if let Some(cell) = cell {
                cell.set(None);
            }
            self.state.shape.bump();
        });
        Some(previous)
    }

    pub fn clear(&self) {
        let removed: Vec<K> = self.state.raw.borrow_mut().drain(..).map(|(k, _)| k).collect();
        if removed.is_empty() {
            return;
        }
        let cells: Vec<Signal<Option<V>>> = {
            let cells = self.state.cells.borrow();
            removed.iter().filter_map(|k| cells.get(k).cloned()).collect()
        };
        self.state.shape.batch(|| {
            for cell in cells {
                cell.set(None);
            }
            self.state.shape.bump();
        });
    }

    fn track_key(&self, key: &K) {
        let cell = {
            let mut cells = self.state.cells.borrow_mut();
            match cells.get(key) {
                Some(cell) => Some(cell.clone()),
                None => {
                    let value = self.state.raw.borrow().get(key).cloned();
                    let cell = self.state.shape.cell(value);
                    if let Some(cell) = &cell {
                        cells.insert(key.clone(), cell.clone());
                    }
                    cell
                }
            }
        };
        if let Some(cell) = cell {
            cell.with(|_| ());
        }
    }
}

impl<K, V> Clone for ReactiveMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ReactiveMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.state.raw.borrow().iter()).finish()
    }
}
