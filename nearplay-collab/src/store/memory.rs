use async_trait::async_trait;
use dashmap::DashMap;

use super::{ChangeCallback, SessionData, SessionPatch, SessionStore, StoreError, StoreSubscription};

/// An in-process session store, used in tests and single-device composition.
///
/// Patches are applied field-by-field, the revision is bumped on every commit,
/// and live subscribers are notified synchronously with the full new document.
#[derive(Default)]
pub struct MemorySessionStore {
    documents: DashMap<String, SessionData>,
    subscribers: DashMap<String, Vec<Subscriber>>,
}

struct Subscriber {
    subscription: StoreSubscription,
    on_change: ChangeCallback,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Default::default()
    }

    fn notify(&self, session_id: &str, session: &SessionData) {
        let Some(mut subscribers) = self.subscribers.get_mut(session_id) else {
            return;
        };

        subscribers.retain(|s| !s.subscription.is_cancelled());

        for subscriber in subscribers.iter() {
            (subscriber.on_change)(session.clone());
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionData, StoreError> {
        self.documents
            .get(session_id)
            .map(|d| d.clone())
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn set(&self, mut session: SessionData) -> Result<(), StoreError> {
        let previous_revision = self
            .documents
            .get(&session.id)
            .map(|d| d.revision)
            .unwrap_or_default();

        session.revision = previous_revision + 1;

        let session_id = session.id.clone();
        self.documents.insert(session_id.clone(), session.clone());

        self.notify(&session_id, &session);
        Ok(())
    }

    async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<(), StoreError> {
        let committed = {
            let mut document = self
                .documents
                .get_mut(session_id)
                .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

            patch.apply_to(&mut document);
            document.revision += 1;
            document.clone()
        };

        self.notify(session_id, &committed);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.documents
            .remove(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

        self.subscribers.remove(session_id);
        Ok(())
    }

    fn subscribe(&self, session_id: &str, on_change: ChangeCallback) -> StoreSubscription {
        let subscription = StoreSubscription::default();

        self.subscribers
            .entry(session_id.to_string())
            .or_default()
            .push(Subscriber {
                subscription: subscription.clone(),
                on_change,
            });

        subscription
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use parking_lot::Mutex;

    use crate::SessionMode;

    use super::*;

    fn session(id: &str) -> SessionData {
        let now = Utc::now();

        SessionData {
            id: id.to_string(),
            name: "Listening party".to_string(),
            host_user_id: "user-1".to_string(),
            mode: SessionMode::Roaming,
            member_ids: vec!["user-1".to_string()],
            playlist: vec![],
            current_track_index: None,
            mood_level: 0.5,
            excluded_genres: vec![],
            excluded_artists: vec![],
            playback: None,
            created_at: now,
            last_activity_at: now,
            revision: 0,
        }
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let store = MemorySessionStore::new();

        let result = store.get("missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_patches_merge_concurrent_fields() {
        let store = MemorySessionStore::new();
        store.set(session("session-1")).await.expect("set succeeds");

        // Two members commit different fields moments apart
        store
            .update(
                "session-1",
                SessionPatch {
                    mood_level: Some(0.9),
                    ..Default::default()
                },
            )
            .await
            .expect("mood patch commits");

        store
            .update(
                "session-1",
                SessionPatch {
                    excluded_genres: Some(vec!["Polka".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .expect("genre patch commits");

        let document = store.get("session-1").await.expect("document exists");
        assert_eq!(document.mood_level, 0.9);
        assert_eq!(document.excluded_genres, vec!["Polka".to_string()]);
        assert_eq!(document.revision, 3);
    }

    #[tokio::test]
    async fn test_cancelled_subscription_stops_delivering() {
        let store = MemorySessionStore::new();
        store.set(session("session-1")).await.expect("set succeeds");

        let seen: Arc<Mutex<Vec<u64>>> = Default::default();

        let subscription = {
            let seen = seen.clone();
            store.subscribe(
                "session-1",
                Box::new(move |document| seen.lock().push(document.revision)),
            )
        };

        store
            .update("session-1", SessionPatch::touch(Utc::now()))
            .await
            .expect("patch commits");

        subscription.cancel();
        subscription.cancel();

        store
            .update("session-1", SessionPatch::touch(Utc::now()))
            .await
            .expect("patch commits");

        assert_eq!(*seen.lock(), vec![2]);
    }
}
