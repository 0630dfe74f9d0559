// File: chatgate-core/src/services/cooldown_governor.rs
//! Per-user fixed cooldowns and the global, event-type sliding-window quota.
//!
//! Both maps are sharded (`DashMap`) so that unrelated (user, command) pairs and
//! unrelated event types never contend on the same lock. Every check is synchronous,
//! in-memory and bounded. Pruning happens passively when an entry is read.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, trace};

use chatgate_common::models::{
    CommandDescriptor, CooldownSnapshot, EventExecution, EventType, UserCooldownEntry,
};

/// Upper bound accepted for `QuotaSettings::window_days` (100 years).
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Upper bound accepted for a command's `cooldown_seconds` (one year).
pub const MAX_COOLDOWN_SECONDS: i64 = 365 * 24 * 60 * 60;

fn default_window_days() -> u32 {
    1
}

/// Saturates instead of panicking on values chrono cannot represent.
fn cooldown_length(seconds: i64) -> Duration {
    Duration::try_seconds(seconds).unwrap_or(Duration::MAX)
}

/// Global quota configuration: one sliding window length shared by every event type,
/// and a capacity per event type. Types without a capacity (and `none`) are unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSettings {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default)]
    pub capacities: HashMap<EventType, u32>,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            capacities: HashMap::new(),
        }
    }
}

impl QuotaSettings {
    pub fn new(window_days: u32) -> Self {
        Self { window_days, capacities: HashMap::new() }
    }

    pub fn with_capacity(mut self, event_type: EventType, capacity: u32) -> Self {
        self.capacities.insert(event_type, capacity);
        self
    }

    pub fn capacity_for(&self, event_type: EventType) -> Option<u32> {
        if event_type == EventType::None {
            return None;
        }
        self.capacities.get(&event_type).copied()
    }

    pub fn window(&self) -> Duration {
        Duration::try_days(i64::from(self.window_days)).unwrap_or(Duration::MAX)
    }

    /// Executions strictly older than this have left the window.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Returned when an event type has no capacity left in the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExhausted {
    pub event_type: EventType,
    pub capacity: u32,
    pub window_days: u32,
}

/// Returned while a viewer's per-command cooldown is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownActive {
    pub remaining: Duration,
}

#[derive(Debug, Default)]
struct QuotaLedger {
    /// Counted executions, oldest first.
    executions: VecDeque<DateTime<Utc>>,
    /// Slots handed out by `try_reserve_quota` that are still executing.
    reserved: usize,
}

impl QuotaLedger {
    fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.executions.len();
        while self.executions.front().is_some_and(|t| *t < cutoff) {
            self.executions.pop_front();
        }
        before - self.executions.len()
    }

    fn in_use(&self) -> usize {
        self.executions.len() + self.reserved
    }

    fn record(&mut self, at: DateTime<Utc>) {
        let pos = self.executions.partition_point(|t| *t <= at);
        self.executions.insert(pos, at);
    }
}

type QuotaLedgers = Arc<DashMap<EventType, QuotaLedger>>;

/// A quota slot held for the duration of one command execution.
///
/// Committed through [`CooldownGovernor::record_success`]; dropping it uncommitted
/// (rejection by a later gate, handler fault) gives the slot back.
#[must_use]
pub struct QuotaPermit {
    slot: Option<(QuotaLedgers, EventType)>,
}

impl QuotaPermit {
    fn unlimited() -> Self {
        Self { slot: None }
    }

    /// `false` when the command's event type is not quota-limited.
    pub fn is_counted(&self) -> bool {
        self.slot.is_some()
    }

    pub fn event_type(&self) -> Option<EventType> {
        self.slot.as_ref().map(|(_, et)| *et)
    }

    fn commit(mut self, at: DateTime<Utc>) {
        if let Some((ledgers, event_type)) = self.slot.take() {
            let mut ledger = ledgers.entry(event_type).or_default();
            ledger.reserved = ledger.reserved.saturating_sub(1);
            ledger.record(at);
        }
    }
}

impl Drop for QuotaPermit {
    fn drop(&mut self) {
        if let Some((ledgers, event_type)) = self.slot.take() {
            if let Some(mut ledger) = ledgers.get_mut(&event_type) {
                ledger.reserved = ledger.reserved.saturating_sub(1);
            }
        }
    }
}

impl std::fmt::Debug for QuotaPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaPermit")
            .field("event_type", &self.event_type())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CooldownSlot {
    Used(DateTime<Utc>),
    /// Claimed by an execution that has not finished yet.
    InFlight { previous: Option<DateTime<Utc>> },
}

type CooldownKey = (String, String);
type UserCooldowns = Arc<DashMap<CooldownKey, CooldownSlot>>;

/// Exclusive hold on one (identity, command) cooldown while the command executes.
///
/// Other checks for the same key see it as an active cooldown. Committed through
/// [`CooldownGovernor::record_success`]; dropping it uncommitted puts the previous
/// timestamp back.
#[must_use]
pub struct CooldownClaim {
    slot: Option<(UserCooldowns, CooldownKey)>,
}

impl CooldownClaim {
    fn unclaimed() -> Self {
        Self { slot: None }
    }

    /// `false` for commands without a cooldown.
    pub fn is_held(&self) -> bool {
        self.slot.is_some()
    }

    fn commit(mut self, at: DateTime<Utc>) {
        if let Some((cooldowns, key)) = self.slot.take() {
            cooldowns.insert(key, CooldownSlot::Used(at));
        }
    }
}

impl Drop for CooldownClaim {
    fn drop(&mut self) {
        let Some((cooldowns, key)) = self.slot.take() else {
            return;
        };
        if let Entry::Occupied(mut entry) = cooldowns.entry(key) {
            if let CooldownSlot::InFlight { previous } = *entry.get() {
                match previous {
                    Some(last_used) => {
                        entry.insert(CooldownSlot::Used(last_used));
                    }
                    None => {
                        entry.remove();
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CooldownClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownClaim")
            .field("key", &self.slot.as_ref().map(|(_, key)| key))
            .finish()
    }
}

/// Owns all cooldown and quota state for one dispatcher instance.
pub struct CooldownGovernor {
    /// (identity key, lowercased command name) -> last successful use
    user_cooldowns: UserCooldowns,
    quotas: QuotaLedgers,
    settings: RwLock<QuotaSettings>,
    dirty: Arc<Notify>,
}

impl CooldownGovernor {
    pub fn new(settings: QuotaSettings) -> Self {
        Self {
            user_cooldowns: Arc::new(DashMap::new()),
            quotas: Arc::new(DashMap::new()),
            settings: RwLock::new(settings),
            dirty: Arc::new(Notify::new()),
        }
    }

    pub fn quota_settings(&self) -> QuotaSettings {
        self.settings.read().clone()
    }

    /// Hot-swaps window length and capacities. Recorded executions are kept and
    /// re-counted against the new values on the next check.
    pub fn set_quota_settings(&self, settings: QuotaSettings) {
        debug!("Quota settings updated: window={}d capacities={:?}", settings.window_days, settings.capacities);
        *self.settings.write() = settings;
    }

    /// Signalled after every state mutation worth persisting.
    pub fn dirty_signal(&self) -> Arc<Notify> {
        self.dirty.clone()
    }

    /// Global quota gate. On success a slot is reserved until the permit is committed
    /// or dropped, so concurrent executions can never push the count past capacity.
    pub fn try_reserve_quota(
        &self,
        event_type: EventType,
        now: DateTime<Utc>,
    ) -> Result<QuotaPermit, QuotaExhausted> {
        let (capacity, cutoff, window_days) = {
            let settings = self.settings.read();
            match settings.capacity_for(event_type) {
                Some(capacity) => (capacity, settings.cutoff(now), settings.window_days),
                None => return Ok(QuotaPermit::unlimited()),
            }
        };

        let mut ledger = self.quotas.entry(event_type).or_default();
        let pruned = ledger.prune(cutoff);
        if pruned > 0 {
            trace!("Pruned {} expired '{}' executions", pruned, event_type);
        }
        if ledger.in_use() >= capacity as usize {
            return Err(QuotaExhausted { event_type, capacity, window_days });
        }
        ledger.reserved += 1;
        drop(ledger);

        Ok(QuotaPermit { slot: Some((self.quotas.clone(), event_type)) })
    }

    /// Per-user gate. On success the (identity, command) key is claimed until the
    /// claim is committed or dropped, so a second concurrent execution by the same
    /// viewer is rejected as on cooldown. A non-positive cooldown always passes.
    pub fn try_claim_cooldown(
        &self,
        identity_key: &str,
        descriptor: &CommandDescriptor,
        now: DateTime<Utc>,
    ) -> Result<CooldownClaim, CooldownActive> {
        if descriptor.cooldown_seconds <= 0 {
            return Ok(CooldownClaim::unclaimed());
        }
        let key = (identity_key.to_string(), descriptor.name.to_ascii_lowercase());
        let cooldown = cooldown_length(descriptor.cooldown_seconds);

        let previous = match self.user_cooldowns.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(CooldownSlot::InFlight { previous: None });
                None
            }
            Entry::Occupied(mut entry) => match *entry.get() {
                CooldownSlot::InFlight { .. } => {
                    trace!("Cooldown '{}' for '{}' is held by a running execution", key.1, key.0);
                    return Err(CooldownActive { remaining: cooldown });
                }
                CooldownSlot::Used(last_used) => {
                    remaining_cooldown(cooldown, last_used, now)?;
                    entry.insert(CooldownSlot::InFlight { previous: Some(last_used) });
                    Some(last_used)
                }
            },
        };
        trace!("Claimed cooldown '{}' for '{}' (previous={:?})", key.1, key.0, previous);

        Ok(CooldownClaim { slot: Some((self.user_cooldowns.clone(), key)) })
    }

    /// Read-only variant of [`Self::try_claim_cooldown`]: reports whether the gate
    /// would pass right now without claiming anything.
    pub fn check_user_cooldown(
        &self,
        identity_key: &str,
        descriptor: &CommandDescriptor,
        now: DateTime<Utc>,
    ) -> Result<(), CooldownActive> {
        if descriptor.cooldown_seconds <= 0 {
            return Ok(());
        }
        let key = (identity_key.to_string(), descriptor.name.to_ascii_lowercase());
        let cooldown = cooldown_length(descriptor.cooldown_seconds);
        let slot = self.user_cooldowns.get(&key).map(|r| *r);
        match slot {
            None => Ok(()),
            Some(CooldownSlot::InFlight { .. }) => Err(CooldownActive { remaining: cooldown }),
            Some(CooldownSlot::Used(last_used)) => {
                remaining_cooldown(cooldown, last_used, now)?;
                self.user_cooldowns.remove_if(&key, |_, slot| {
                    matches!(slot, CooldownSlot::Used(at) if now.signed_duration_since(*at) >= cooldown)
                });
                Ok(())
            }
        }
    }

    /// Stamps the per-user cooldown and commits the quota slot. Call only after a
    /// successful, non-error execution.
    pub fn record_success(&self, permit: QuotaPermit, claim: CooldownClaim, now: DateTime<Utc>) {
        claim.commit(now);
        permit.commit(now);
        self.dirty.notify_one();
    }

    /// Executions of `event_type` still inside the window (pending reservations excluded).
    pub fn quota_used(&self, event_type: EventType, now: DateTime<Utc>) -> usize {
        let cutoff = self.settings.read().cutoff(now);
        match self.quotas.get_mut(&event_type) {
            Some(mut ledger) => {
                ledger.prune(cutoff);
                ledger.executions.len()
            }
            None => 0,
        }
    }

    pub fn snapshot(&self) -> CooldownSnapshot {
        let user_cooldowns = self
            .user_cooldowns
            .iter()
            .filter_map(|entry| {
                let last_used = match *entry.value() {
                    CooldownSlot::Used(at) => at,
                    CooldownSlot::InFlight { previous } => previous?,
                };
                let (identity_key, command_name) = entry.key();
                Some(UserCooldownEntry {
                    identity_key: identity_key.clone(),
                    command_name: command_name.clone(),
                    last_used,
                })
            })
            .collect();

        let event_executions = self
            .quotas
            .iter()
            .flat_map(|entry| {
                let event_type = *entry.key();
                entry
                    .value()
                    .executions
                    .iter()
                    .map(|t| EventExecution { event_type, executed_at: *t })
                    .collect::<Vec<_>>()
            })
            .collect();

        CooldownSnapshot { user_cooldowns, event_executions }
    }

    /// Replaces all state with `snapshot` (startup restore).
    pub fn restore(&self, snapshot: CooldownSnapshot) {
        self.user_cooldowns.clear();
        self.quotas.clear();

        for entry in snapshot.user_cooldowns {
            self.user_cooldowns.insert(
                (entry.identity_key, entry.command_name.to_ascii_lowercase()),
                CooldownSlot::Used(entry.last_used),
            );
        }
        for exec in snapshot.event_executions {
            self.quotas.entry(exec.event_type).or_default().record(exec.executed_at);
        }
        debug!(
            "Restored cooldown state: {} user cooldowns, {} event types",
            self.user_cooldowns.len(),
            self.quotas.len()
        );
    }
}

fn remaining_cooldown(
    cooldown: Duration,
    last_used: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), CooldownActive> {
    let elapsed = now.signed_duration_since(last_used);
    if elapsed < cooldown {
        let remaining = cooldown.checked_sub(&elapsed).unwrap_or(cooldown);
        return Err(CooldownActive { remaining });
    }
    Ok(())
}
