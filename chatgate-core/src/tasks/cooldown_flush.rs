// File: chatgate-core/src/tasks/cooldown_flush.rs
//! Persists the cooldown governor's state. Waits for the governor's dirty signal,
//! lets further changes settle for `debounce`, then writes one snapshot. Does a final
//! flush when shutdown is signalled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use chatgate_common::traits::repository_traits::CooldownRepository;
use crate::Error;
use crate::services::cooldown_governor::CooldownGovernor;

/// Loads persisted state into `governor`. Returns the number of restored entries.
pub async fn restore_cooldowns(
    governor: &CooldownGovernor,
    repo: &dyn CooldownRepository,
) -> Result<usize, Error> {
    let snapshot = repo.load().await?;
    let count = snapshot.user_cooldowns.len() + snapshot.event_executions.len();
    governor.restore(snapshot);
    info!("Restored {} cooldown/quota entries", count);
    Ok(count)
}

async fn flush(governor: &CooldownGovernor, repo: &dyn CooldownRepository) {
    let snapshot = governor.snapshot();
    match repo.save(&snapshot).await {
        Ok(()) => debug!(
            "Flushed {} user cooldowns and {} event executions",
            snapshot.user_cooldowns.len(),
            snapshot.event_executions.len()
        ),
        Err(e) => error!("Cooldown flush failed: {:?}", e),
    }
}

pub fn spawn_cooldown_flush_task(
    governor: Arc<CooldownGovernor>,
    repo: Arc<dyn CooldownRepository>,
    debounce: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let dirty = governor.dirty_signal();

    tokio::spawn(async move {
        info!("Cooldown flush task started with debounce={:?}", debounce);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Cooldown flush task shutting down");
                        break;
                    }
                }
                _ = dirty.notified() => {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => {
                            info!("Cooldown flush task shutting down");
                            break;
                        }
                        _ = sleep(debounce) => {}
                    }
                    flush(&governor, repo.as_ref()).await;
                }
            }
        }

        flush(&governor, repo.as_ref()).await;
        info!("Cooldown flush task finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_common::models::{CommandDescriptor, CooldownSnapshot, EventType, UserCooldownEntry};
    use chrono::{TimeZone, Utc};
    use crate::repositories::memory::InMemoryCooldownRepository;
    use crate::services::cooldown_governor::QuotaSettings;

    #[tokio::test]
    async fn restores_snapshot_into_governor() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let repo = InMemoryCooldownRepository::with_snapshot(CooldownSnapshot {
            user_cooldowns: vec![UserCooldownEntry {
                identity_key: "u1".into(),
                command_name: "weather".into(),
                last_used: t0,
            }],
            event_executions: vec![],
        });
        let governor = CooldownGovernor::new(QuotaSettings::default());
        let restored = restore_cooldowns(&governor, &repo).await.unwrap();
        assert_eq!(restored, 1);

        let weather = CommandDescriptor::new("weather").with_cooldown(5);
        assert!(governor
            .check_user_cooldown("u1", &weather, t0 + chrono::Duration::seconds(2))
            .is_err());
    }

    #[tokio::test]
    async fn flushes_after_success_and_on_shutdown() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let governor = Arc::new(CooldownGovernor::new(
            QuotaSettings::new(1).with_capacity(EventType::Good, 3),
        ));
        let repo = InMemoryCooldownRepository::default();
        let (tx, rx) = watch::channel(false);
        let handle = spawn_cooldown_flush_task(
            governor.clone(),
            Arc::new(repo.clone()),
            Duration::from_millis(10),
            rx,
        );

        let hug = CommandDescriptor::new("hug")
            .with_cooldown(30)
            .with_event_type(EventType::Good);
        let permit = governor.try_reserve_quota(EventType::Good, t0).unwrap();
        let claim = governor.try_claim_cooldown("u1", &hug, t0).unwrap();
        governor.record_success(permit, claim, t0);

        let mut flushed = false;
        for _ in 0..100 {
            if repo.save_count() > 0 {
                flushed = true;
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(flushed, "debounced flush never happened");
        assert_eq!(repo.stored().user_cooldowns.len(), 1);
        assert_eq!(repo.stored().event_executions.len(), 1);

        let before = repo.save_count();
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(repo.save_count(), before + 1);
    }
}
