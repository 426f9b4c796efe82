//! Reusable object pool.
//!
//! Items are never dropped while the pool lives: releasing one marks its
//! slot free and the next `acquire` hands it out again, so the pool grows to
//! the largest number of items ever live at once and stays there.

/// Handle to one pooled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey(usize);

#[derive(Debug, Clone)]
pub struct Pool<T> {
    items: Vec<T>,
    in_use: Vec<bool>,
    free: Vec<usize>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self { items: Vec::new(), in_use: Vec::new(), free: Vec::new() }
    }

    /// Take a released item, or build one with `create` when none is free.
    /// `reset` runs on the item either way.
    pub fn acquire(&mut self, create: impl FnOnce() -> T, reset: impl FnOnce(&mut T)) -> PoolKey {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.items.push(create());
                self.in_use.push(false);
                self.items.len() - 1
            }
        };
        self.in_use[index] = true;
        reset(&mut self.items[index]);
        PoolKey(index)
    }

    /// Return an item to the pool. Releasing twice is a no-op; returns
    /// whether this call released it.
    pub fn release(&mut self, key: PoolKey) -> bool {
        match self.in_use.get_mut(key.0) {
            Some(in_use) if *in_use => {
                *in_use = false;
                self.free.push(key.0);
                true
            }
            _ => false,
        }
    }

    pub fn release_all(&mut self) {
        for index in 0..self.in_use.len() {
            self.release(PoolKey(index));
        }
    }

    pub fn is_released(&self, key: PoolKey) -> bool {
        !self.in_use.get(key.0).copied().unwrap_or(false)
    }

    /// The item behind a live key.
    pub fn get(&self, key: PoolKey) -> Option<&T> {
        if self.is_released(key) {
            return None;
        }
        self.items.get(key.0)
    }

    pub fn get_mut(&mut self, key: PoolKey) -> Option<&mut T> {
        if self.is_released(key) {
            return None;
        }
        self.items.get_mut(key.0)
    }

    pub fn used_count(&self) -> usize {
        self.items.len() - self.free.len()
    }

    pub fn unused_count(&self) -> usize {
        self.free.len()
    }

    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    /// Live items.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items
            .iter()
            .zip(&self.in_use)
            .filter_map(|(item, &in_use)| in_use.then_some(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_reuses_released_items() {
        let mut pool: Pool<String> = Pool::new();
        let a = pool.acquire(String::new, |s| s.push('a'));
        let b = pool.acquire(String::new, |s| s.push('b'));
        assert_eq!(pool.total_count(), 2);

        assert!(pool.release(a));
        assert_eq!(pool.used_count(), 1);
        assert_eq!(pool.unused_count(), 1);

        let c = pool.acquire(|| unreachable!(), |s| s.push('c'));
        assert_eq!(c, a);
        assert_eq!(pool.get(c).map(String::as_str), Some("ac"));
        assert_eq!(pool.get(b).map(String::as_str), Some("b"));
        assert_eq!(pool.total_count(), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut pool: Pool<u32> = Pool::new();
        let key = pool.acquire(|| 7, |_| {});
        assert!(pool.release(key));
        assert!(!pool.release(key));
        assert_eq!(pool.unused_count(), 1);
        assert!(pool.get(key).is_none());
    }

    #[test]
    fn test_release_all_keeps_capacity() {
        let mut pool: Pool<u32> = Pool::new();
        for i in 0..5 {
            pool.acquire(|| i, |_| {});
        }
        pool.release_all();
        assert_eq!(pool.used_count(), 0);
        assert_eq!(pool.total_count(), 5);
        assert_eq!(pool.iter().count(), 0);
    }
}
