use std::sync::Arc;

use kinship_core::messages::Participants;
use kinship_core::{ChatError, ConversationId, UserId};
use kinship_store::{ChatStore, StoreError};

/// Async face of the blocking [`ChatStore`]: every call runs on the
/// blocking thread pool against a pooled connection.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn ChatStore>,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { inner: store }
    }

    pub async fn call<T, F>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&dyn ChatStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| ChatError::persistence(format!("storage task failed: {e}")))?
            .map_err(ChatError::from)
    }

    /// Load the conversation's participants and require `user` to be one
    /// of them.
    pub async fn participants_of(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<Participants, ChatError> {
        let participants = self.call(move |s| s.participants(conversation)).await?;
        if !participants.contains(user) {
            return Err(ChatError::validation(format!(
                "user {user} is not a participant of conversation {conversation}"
            )));
        }
        Ok(participants)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use kinship_core::messages::Identity;
    use kinship_core::ErrorKind;
    use kinship_store::{Database, SqliteChatStore};

    fn handle() -> StoreHandle {
        StoreHandle::new(Arc::new(SqliteChatStore::new(Database::in_memory().unwrap())))
    }

    #[tokio::test]
    async fn call_runs_store_operation() {
        let store = handle();
        store
            .call(|s| s.upsert_user(&Identity::new(UserId::new(1), "Ada")))
            .await
            .unwrap();
        let profile = store.call(|s| s.user_profile(UserId::new(1))).await.unwrap();
        assert_eq!(profile.name, "Ada");
    }

    #[tokio::test]
    async fn store_errors_are_classified() {
        let store = handle();
        let err = store.call(|s| s.user_profile(UserId::new(5))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn participants_of_rejects_outsiders() {
        let store = handle();
        let conv = store
            .call(|s| {
                for (id, name) in [(1, "Ada"), (2, "Bea"), (3, "Cy")] {
                    s.upsert_user(&Identity::new(UserId::new(id), name))?;
                }
                s.open_conversation(UserId::new(1), UserId::new(2))
            })
            .await
            .unwrap();
        assert!(store.participants_of(conv, UserId::new(2)).await.is_ok());
        let err = store.participants_of(conv, UserId::new(3)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
