//! Device-resident buffers
//!
//! A buffer is a shared handle: launches clone it into the queued job so the
//! storage outlives the asynchronous decode. Jobs take the source read lock
//! and the destination write lock for the duration of one kernel.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a device buffer of `T`
#[derive(Debug, Default)]
pub struct DeviceBuffer<T> {
    data: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for DeviceBuffer<T> {
    fn clone(&self) -> Self {
        Self { data: Arc::clone(&self.data) }
    }
}

impl<T> DeviceBuffer<T> {
    /// Wrap caller-allocated storage
    pub fn from_vec(data: Vec<T>) -> Self {
        Self { data: Arc::new(RwLock::new(data)) }
    }

    /// Element count. Blocks while a queued job writes the buffer.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read access. Synchronize the stream first to observe finished decodes.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.data.write()
    }

    /// Whether two handles refer to the same storage
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T: Clone> DeviceBuffer<T> {
    /// Copy the contents back to the host
    pub fn to_vec(&self) -> Vec<T> {
        self.data.read().clone()
    }
}

impl<T: Copy + Default> DeviceBuffer<T> {
    /// Allocate `len` default-initialized elements
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![T::default(); len])
    }
}

impl<T> From<Vec<T>> for DeviceBuffer<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_storage() {
        let a = DeviceBuffer::from_vec(vec![1u8, 2, 3]);
        let b = a.clone();
        b.write()[0] = 9;
        assert_eq!(a.to_vec(), vec![9, 2, 3]);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&DeviceBuffer::from_vec(vec![1u8])));
    }

    #[test]
    fn test_zeroed() {
        let buf: DeviceBuffer<f32> = DeviceBuffer::zeroed(4);
        assert_eq!(buf.len(), 4);
        assert!(buf.to_vec().iter().all(|v| *v == 0.0));
        assert!(DeviceBuffer::<f32>::zeroed(0).is_empty());
    }
}
