use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use innkeep_core::domain::conversation::ConversationKey;

/// One async mutex per conversation key. Guest turns and approver decisions for the same key
/// queue behind each other; different keys never contend.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    slots: Arc<Mutex<HashMap<ConversationKey, Arc<AsyncMutex<()>>>>>,
}

impl ConversationLocks {
    pub async fn lock(&self, key: &ConversationKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Idle slots are only referenced by the map itself.
            slots.retain(|existing, slot| existing == key || Arc::strong_count(slot) > 1);
            slots.entry(key.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn tracked_keys(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use innkeep_core::domain::conversation::ConversationKey;

    use super::ConversationLocks;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = ConversationLocks::default();
        let key = ConversationKey::new("guest-1", "prop-1");
        let trail = Arc::new(Mutex::new(Vec::new()));

        let first_guard = locks.lock(&key).await;
        let task = {
            let locks = locks.clone();
            let key = key.clone();
            let trail = trail.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
                trail.lock().await.push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        trail.lock().await.push("first");
        drop(first_guard);
        task.await.expect("second turn");

        assert_eq!(*trail.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = ConversationLocks::default();
        let _held = locks.lock(&ConversationKey::new("guest-1", "prop-1")).await;

        let other = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(&ConversationKey::new("guest-2", "prop-1")),
        )
        .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = ConversationLocks::default();
        drop(locks.lock(&ConversationKey::new("guest-1", "prop-1")).await);
        drop(locks.lock(&ConversationKey::new("guest-2", "prop-1")).await);
        assert_eq!(locks.tracked_keys(), 1);
    }
}
