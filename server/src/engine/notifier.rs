use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::db::queries::notifications;

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub receiver: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Sending half of the notification channel. Delivery belongs to whoever
/// holds the receiver.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn notify(&self, receiver: &str, description: impl Into<String>) {
        let notice = Notice {
            receiver: receiver.to_string(),
            description: description.into(),
            created_at: Utc::now(),
        };
        debug!(receiver = %notice.receiver, description = %notice.description, "notice");
        if let Err(e) = self.sender.send(notice) {
            error!("failed to queue notice: {}", e);
        }
    }
}

impl Default for Notifier {
    /// A notifier whose notices are dropped.
    fn default() -> Self {
        let (sender, _) = mpsc::unbounded_channel();
        Self { sender }
    }
}

/// Store every notice in the `notifications` table until the channel closes.
pub async fn persist_notices(pool: SqlitePool, mut receiver: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = receiver.recv().await {
        let id = uuid::Uuid::new_v4().to_string();
        if let Err(e) =
            notifications::insert_notification(&pool, &id, &notice.receiver, &notice.description)
                .await
        {
            error!(receiver = %notice.receiver, "failed to store notification: {}", e);
        }
    }
    info!("notification channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::users;

    #[tokio::test]
    async fn test_notices_arrive_in_order() {
        let (notifier, mut rx) = Notifier::new();
        notifier.notify("u1", "first");
        notifier.notify("u2", "second");

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!((a.receiver.as_str(), a.description.as_str()), ("u1", "first"));
        assert_eq!((b.receiver.as_str(), b.description.as_str()), ("u2", "second"));
    }

    #[tokio::test]
    async fn test_default_notifier_drops_silently() {
        Notifier::default().notify("u1", "nobody listening");
    }

    #[tokio::test]
    async fn test_persister_stores_notices() {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        users::create_user(&pool, "u1", "alice").await.unwrap();

        let (notifier, rx) = Notifier::new();
        notifier.notify("u1", "welcome");
        drop(notifier);

        persist_notices(pool.clone(), rx).await;

        let stored = notifications::list_for_user(&pool, "u1", 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].description, "welcome");
    }
}
