use crate::utils::errors::BrolgaError;

/// Stable index into an [`ObjectPool`]. Handles remain valid across pool
/// growth and across frees of unrelated handles.
pub type PoolHandle = u32;

/// Sentinel for "no object". Doubles as the list terminator for intrusive
/// linked structures built over pool handles.
pub const NULL_HANDLE: PoolHandle = u32::MAX;

/**
 * Typed slab allocator with an explicit free list.
 *
 * Objects are addressed by `u32` handles which are indices into the backing
 * vector, never raw addresses. The backing storage grows in block-sized
 * increments and never shrinks within a run; freed slots are recycled in LIFO
 * order before fresh slots are carved out.
 */
#[derive(Debug, Clone)]
pub struct ObjectPool<T> {
    slots: Vec<T>,
    free_list: Vec<PoolHandle>,
    block_size: usize,
}

impl<T: Clone + Default> ObjectPool<T> {
    pub fn with_block_size(block_size: usize) -> Result<ObjectPool<T>, BrolgaError> {
        if block_size == 0 {
            return Err(BrolgaError::InvalidConfiguration(
                "object pool block size must be nonzero".to_string(),
            ));
        }
        Ok(ObjectPool {
            slots: Vec::with_capacity(block_size),
            free_list: Vec::new(),
            block_size,
        })
    }

    /// Place `value` in a slot and return its handle. Recycles freed slots
    /// before growing the backing storage by one block.
    pub fn alloc(&mut self, value: T) -> PoolHandle {
        if let Some(handle) = self.free_list.pop() {
            self.slots[handle as usize] = value;
            return handle;
        }
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve(self.block_size);
        }
        let handle = self.slots.len() as PoolHandle;
        self.slots.push(value);
        handle
    }

    /// Return a slot to the free list. The slot's contents are replaced with
    /// the default value so no stale data survives recycling.
    pub fn free(&mut self, handle: PoolHandle) {
        debug_assert!((handle as usize) < self.slots.len());
        self.slots[handle as usize] = T::default();
        self.free_list.push(handle);
    }

    pub fn get(&self, handle: PoolHandle) -> &T {
        &self.slots[handle as usize]
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> &mut T {
        &mut self.slots[handle as usize]
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_returns_distinct_handles() {
        let mut pool: ObjectPool<usize> = ObjectPool::with_block_size(4).unwrap();
        let a = pool.alloc(10);
        let b = pool.alloc(20);
        assert_ne!(a, b);
        assert_eq!(*pool.get(a), 10);
        assert_eq!(*pool.get(b), 20);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_free_slots_are_recycled() {
        let mut pool: ObjectPool<usize> = ObjectPool::with_block_size(4).unwrap();
        let a = pool.alloc(1);
        let _b = pool.alloc(2);
        pool.free(a);
        assert_eq!(pool.len(), 1);
        let c = pool.alloc(3);
        assert_eq!(c, a);
        assert_eq!(*pool.get(c), 3);
    }

    #[test]
    fn test_handles_stable_across_growth() {
        let mut pool: ObjectPool<usize> = ObjectPool::with_block_size(2).unwrap();
        let handles: Vec<PoolHandle> = (0..100).map(|i| pool.alloc(i)).collect();
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(*pool.get(*h), i);
        }
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let pool: Result<ObjectPool<usize>, _> = ObjectPool::with_block_size(0);
        assert!(pool.is_err());
    }
}
