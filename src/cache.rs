use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;
use log::{debug, trace};
use ndarray::ArrayViewD;

use crate::error::Result;

/// Hit/miss/size counters reported by the instance and global caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheInfo {
    pub hits: usize,
    pub misses: usize,
    pub currsize: usize,
}

/// Exact content of an `(x, t)` pair: shape plus every value's bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PairKey {
    shape: Vec<usize>,
    x: Vec<u64>,
    t: Vec<u64>,
}

impl PairKey {
    fn new(x: &ArrayViewD<'_, f64>, t: &[f64]) -> Self {
        Self {
            shape: x.shape().to_vec(),
            x: x.iter().map(|v| v.to_bits()).collect(),
            t: t.iter().map(|v| v.to_bits()).collect(),
        }
    }
}

/// Memo cell for an intermediate shared by smoothing and differentiation.
///
/// Lives inside one method instance and is read through `&self`, so entries
/// and counters sit behind `RefCell`/`Cell`. Entries are never evicted on
/// their own; `cache_clear` is the only way to release them.
pub struct GlobalCache<T> {
    entries: RefCell<AHashMap<PairKey, Rc<T>>>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<T> GlobalCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(AHashMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Returns the cached value for this exact `(x, t)` content, computing it
    /// with `compute` on first use. A failed computation counts as a miss and
    /// stores nothing.
    pub fn get_or_try_insert_with<F>(&self, x: &ArrayViewD<'_, f64>, t: &[f64], compute: F) -> Result<Rc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let key = PairKey::new(x, t);
        if let Some(value) = self.entries.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            trace!("global cache hit for shape {:?}", key.shape);
            return Ok(Rc::clone(value));
        }

        self.misses.set(self.misses.get() + 1);
        debug!("global cache miss for shape {:?}", key.shape);
        let value = Rc::new(compute()?);
        self.entries.borrow_mut().insert(key, Rc::clone(&value));
        Ok(value)
    }

    pub fn cache_info(&self) -> CacheInfo {
        CacheInfo {
            hits: self.hits.get(),
            misses: self.misses.get(),
            currsize: self.entries.borrow().len(),
        }
    }

    /// Drops every entry and resets the counters. Values already handed out stay valid.
    pub fn cache_clear(&self) {
        self.entries.borrow_mut().clear();
        self.hits.set(0);
        self.misses.set(0);
    }
}

impl<T> Default for GlobalCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DerivativeError;
    use ndarray::{arr1, Array1};

    #[test]
    fn test_single_miss_then_hits() {
        let cache = GlobalCache::new();
        let x = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        let t = [0.0, 1.0, 2.0];
        let mut calls = 0;

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with(&x.view(), &t, || {
                    calls += 1;
                    Ok(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }

        assert_eq!(calls, 1);
        assert_eq!(
            cache.cache_info(),
            CacheInfo {
                hits: 2,
                misses: 1,
                currsize: 1
            }
        );
    }

    #[test]
    fn test_different_pairs_are_separate_entries() {
        let cache = GlobalCache::new();
        let x = Array1::<f64>::ones(3).into_dyn();
        let y = Array1::<f64>::zeros(3).into_dyn();
        let t = [0.0, 1.0, 2.0];

        cache.get_or_try_insert_with(&x.view(), &t, || Ok(1)).unwrap();
        cache.get_or_try_insert_with(&y.view(), &t, || Ok(2)).unwrap();
        cache
            .get_or_try_insert_with(&x.view(), &[0.0, 1.0, 3.0], || Ok(3))
            .unwrap();

        assert_eq!(cache.cache_info().misses, 3);
        assert_eq!(cache.cache_info().currsize, 3);
    }

    #[test]
    fn test_failure_is_not_stored() {
        let cache: GlobalCache<i32> = GlobalCache::new();
        let x = Array1::<f64>::ones(2).into_dyn();
        let t = [0.0, 1.0];

        let result = cache.get_or_try_insert_with(&x.view(), &t, || {
            Err(DerivativeError::NumericalFailure("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(cache.cache_info().currsize, 0);
        assert_eq!(cache.cache_info().misses, 1);
    }

    #[test]
    fn test_clear_keeps_outstanding_values() {
        let cache = GlobalCache::new();
        let x = Array1::<f64>::ones(2).into_dyn();
        let t = [0.0, 1.0];

        let held = cache.get_or_try_insert_with(&x.view(), &t, || Ok(vec![7.0])).unwrap();
        cache.cache_clear();

        assert_eq!(cache.cache_info(), CacheInfo::default());
        assert_eq!(*held, vec![7.0]);
    }
}
