use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process mutual exclusion keyed by content digest.
///
/// Concurrent ingestions of the same bytes are serialized so the second one observes the
/// first one's catalog record. Entries are dropped as soon as nobody holds or waits on them.
#[derive(Default)]
pub struct DigestLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub struct DigestGuard<'a> {
    owner: &'a DigestLocks,
    digest: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DigestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, digest: &str) -> DigestGuard<'_> {
        let lock = self
            .map()
            .entry(digest.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        DigestGuard {
            owner: self,
            digest: digest.to_string(),
            guard: Some(guard),
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

impl Drop for DigestGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.owner.map();
        let unused = map
            .get(&self.digest)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if unused {
            map.remove(&self.digest);
        }
    }
}
