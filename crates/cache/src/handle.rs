//! Shared, lifetime-tracked access to a cached image.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::data::ImageData;
use crate::key::ImageKey;
use crate::store::ImageStore;

/// A cloneable handle to a cached image.
///
/// Every live handle is counted by the store: cloning registers another
/// holder, dropping releases one, and the release that leaves the store as
/// sole holder may evict the record synchronously on the dropping thread.
///
/// The pixel payload is shared, so a handle stays readable for exactly as
/// long as it exists. The store refuses to evict records with outside
/// holders, and the shared buffer makes a dangling dereference
/// unrepresentable regardless.
pub struct ImageHandle {
    payload: Arc<ImageData>,
    key: ImageKey,
    generation: u64,
    store: Weak<ImageStore>,
}

impl ImageHandle {
    pub(crate) fn new(
        payload: Arc<ImageData>,
        key: ImageKey,
        generation: u64,
        store: Weak<ImageStore>,
    ) -> Self {
        Self { payload, key, generation, store }
    }

    /// The key this handle was issued for.
    pub fn key(&self) -> &ImageKey {
        &self.key
    }
}

impl Deref for ImageHandle {
    type Target = ImageData;

    fn deref(&self) -> &ImageData {
        &self.payload
    }
}

impl Clone for ImageHandle {
    fn clone(&self) -> Self {
        if let Some(store) = self.store.upgrade() {
            store.retain(&self.key, self.generation);
        }
        Self {
            payload: Arc::clone(&self.payload),
            key: self.key.clone(),
            generation: self.generation,
            store: Weak::clone(&self.store),
        }
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.release(&self.key, self.generation);
        }
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("key", &self.key)
            .field("width", &self.payload.width())
            .field("height", &self.payload.height())
            .finish()
    }
}
