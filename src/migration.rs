//! Polling of server-side migrations.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::api::{Migration, MigrationStatus};
use crate::client::PortApi;
use crate::error::ProviderError;

/// Default delay between migration polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Resolves once `cancel` holds `true`. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Poll a migration until it reaches a terminal status.
///
/// `COMPLETED` returns the migration; `FAILURE` and `CANCELLED` are errors.
/// Any other status, including ones this crate does not know, keeps polling.
/// Cancellation is checked between polls.
#[instrument(skip(api, cancel))]
pub async fn wait_for_migration(
    api: &dyn PortApi,
    migration_id: &str,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Result<Migration, ProviderError> {
    loop {
        if *cancel.borrow() {
            return Err(ProviderError::Cancelled(format!(
                "waiting for migration {}",
                migration_id
            )));
        }

        let migration = api.read_migration(migration_id).await?;
        debug!(status = ?migration.status, "polled migration");
        match migration.status {
            MigrationStatus::Completed => return Ok(migration),
            MigrationStatus::Failure | MigrationStatus::Cancelled => {
                return Err(ProviderError::FailedPrecondition(format!(
                    "migration {} ended with status {:?}",
                    migration_id, migration.status
                )));
            },
            _ => {},
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = cancelled(&mut cancel) => {
                return Err(ProviderError::Cancelled(format!(
                    "waiting for migration {}",
                    migration_id
                )));
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryPortal;

    #[tokio::test]
    async fn test_polls_until_completed() {
        let portal = InMemoryPortal::new();
        portal.script_migration(
            "m1",
            vec![
                MigrationStatus::Pending,
                MigrationStatus::Running,
                MigrationStatus::Other("QUEUED".to_string()),
                MigrationStatus::Completed,
            ],
        );
        let (_tx, rx) = watch::channel(false);

        let migration = wait_for_migration(&portal, "m1", Duration::from_millis(1), rx)
            .await
            .unwrap();
        assert_eq!(migration.status, MigrationStatus::Completed);
        assert_eq!(portal.migration_polls("m1"), 4);
    }

    #[tokio::test]
    async fn test_failure_is_an_error() {
        let portal = InMemoryPortal::new();
        portal.script_migration("m2", vec![MigrationStatus::Failure]);
        let (_tx, rx) = watch::channel(false);

        let err = wait_for_migration(&portal, "m2", Duration::from_millis(1), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_cancel_between_polls() {
        let portal = InMemoryPortal::new();
        portal.script_migration("m3", vec![MigrationStatus::Running]);
        let (tx, rx) = watch::channel(false);

        let poll = tokio::spawn({
            let portal = portal.clone();
            async move {
                wait_for_migration(&portal, "m3", Duration::from_secs(3600), rx).await
            }
        });
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        let err = poll.await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
    }
}
