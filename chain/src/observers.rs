//! Synchronous observer dispatch (§9): callers subscribe boxed closures
//! instead of holding a handle back into the cache, so the cache never
//! needs to track observers as anything but values it owns — breaking
//! the cyclic-reference shape the reference observer interface has.

use crate::types::Height;

type HeightHook = Box<dyn Fn(Height) + Send + Sync>;
type CountHook = Box<dyn Fn(usize) + Send + Sync>;

/// Registry of callbacks fired synchronously at well-defined points in
/// `push_block`/`split`. Dispatch order is registration order; a panic in
/// one hook is not caught, matching the reference's "observers run
/// inline, on the same thread, before the call returns" behavior.
#[derive(Default)]
pub struct Observers {
    blockchain_updated: Vec<HeightHook>,
    pool_updated: Vec<HeightHook>,
    blockchain_synchronized: Vec<HeightHook>,
    last_known_block_height_updated: Vec<HeightHook>,
    peer_count_updated: Vec<CountHook>,
}

impl Observers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_blockchain_updated(&mut self, hook: impl Fn(Height) + Send + Sync + 'static) {
        self.blockchain_updated.push(Box::new(hook));
    }

    pub fn on_pool_updated(&mut self, hook: impl Fn(Height) + Send + Sync + 'static) {
        self.pool_updated.push(Box::new(hook));
    }

    pub fn on_blockchain_synchronized(&mut self, hook: impl Fn(Height) + Send + Sync + 'static) {
        self.blockchain_synchronized.push(Box::new(hook));
    }

    pub fn on_last_known_block_height_updated(&mut self, hook: impl Fn(Height) + Send + Sync + 'static) {
        self.last_known_block_height_updated.push(Box::new(hook));
    }

    pub fn on_peer_count_updated(&mut self, hook: impl Fn(usize) + Send + Sync + 'static) {
        self.peer_count_updated.push(Box::new(hook));
    }

    pub(crate) fn fire_blockchain_updated(&self, height: Height) {
        for hook in &self.blockchain_updated {
            hook(height);
        }
    }

    pub(crate) fn fire_pool_updated(&self, height: Height) {
        for hook in &self.pool_updated {
            hook(height);
        }
    }

    pub(crate) fn fire_blockchain_synchronized(&self, height: Height) {
        for hook in &self.blockchain_synchronized {
            hook(height);
        }
    }

    pub(crate) fn fire_last_known_block_height_updated(&self, height: Height) {
        for hook in &self.last_known_block_height_updated {
            hook(height);
        }
    }

    pub(crate) fn fire_peer_count_updated(&self, count: usize) {
        for hook in &self.peer_count_updated {
            hook(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn hooks_fire_in_registration_order_with_the_right_value() {
        let seen = Arc::new(AtomicU32::new(0));
        let mut observers = Observers::new();
        let seen_clone = seen.clone();
        observers.on_blockchain_updated(move |height| seen_clone.store(height, Ordering::SeqCst));
        observers.fire_blockchain_updated(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
