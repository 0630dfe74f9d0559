// File: chatgate-core/src/services/dispatcher.rs
//! Per-message state machine:
//!
//! `Received -> Classified -> TokenParsed -> Resolved -> GateChain -> Executed|Rejected -> ResultEmitted`
//!
//! Gate order: enabled, global quota, ban, per-user cooldown, permission. Only a
//! successful execution stamps the cooldown and commits the quota slot. Nothing that
//! goes wrong while handling one message escapes `process_message`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn};

use chatgate_common::models::{ChatMessage, CommandDescriptor, Viewer};
use crate::config::GovernanceConfig;
use crate::eventbus::observer::panic_message;
use crate::eventbus::{BotEvent, EventBus};
use crate::services::command_handler::{CommandContext, HandlerRegistry};
use crate::services::command_registry::CommandRegistry;
use crate::services::cooldown_governor::{
    CooldownClaim, CooldownGovernor, QuotaExhausted, QuotaPermit,
};
use crate::services::message_sender::OutboundRouter;
use crate::services::permission::{self, PermissionDecision};
use crate::services::viewer_service::{StartingBalance, ViewerService};
use crate::utils::time::{ceil_seconds, Clock};

pub const DEFAULT_COMMAND_PREFIX: &str = "!";

/// Why a resolved command was not executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Disabled,
    QuotaExhausted(QuotaExhausted),
    Banned,
    Cooldown { remaining_secs: i64 },
    /// `required` is the configured level, verbatim when it was not recognized.
    PermissionDenied { required: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Shutdown has begun; the message was not looked at.
    ShuttingDown,
    /// The viewer ledger failed; nothing else ran.
    ViewerUnavailable,
    /// Not a command; handed to the passive chat handler.
    Chat,
    UnknownCommand,
    Rejected { command: String, reason: Rejection },
    Executed { command: String, response: String },
    /// The handler returned an error or panicked.
    Failed { command: String },
}

/// Receives every message that is not a command (chat-activity rewards etc.).
#[async_trait]
pub trait PassiveChatHandler: Send + Sync {
    async fn handle_chat(&self, message: &ChatMessage, viewer: &Viewer);
}

struct Invocation<'a> {
    token: &'a str,
    args: &'a str,
}

fn parse_invocation<'a>(text: &'a str, prefix: &str) -> Option<Invocation<'a>> {
    if prefix.is_empty() {
        return None;
    }
    let rest = text.trim_start().strip_prefix(prefix)?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let token = parts.next().unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    Some(Invocation {
        token,
        args: parts.next().unwrap_or_default().trim(),
    })
}

fn rejection_text(
    msg: &ChatMessage,
    descriptor: &CommandDescriptor,
    reason: &Rejection,
    prefix: &str,
) -> Option<String> {
    let user = msg.reply_name();
    let name = &descriptor.name;
    match reason {
        Rejection::Banned => None,
        Rejection::Disabled => Some(format!(
            "@{} the command {}{} is currently disabled.",
            user, prefix, name
        )),
        Rejection::QuotaExhausted(q) => Some(format!(
            "@{} the global limit for {} events has been reached ({} per {} day(s)). Try again later.",
            user, q.event_type, q.capacity, q.window_days
        )),
        Rejection::Cooldown { remaining_secs } => Some(format!(
            "@{} {}{} is on cooldown, try again in {}s.",
            user, prefix, name, remaining_secs
        )),
        Rejection::PermissionDenied { required } => Some(format!(
            "@{} {}{} requires {} permission.",
            user, prefix, name, required
        )),
    }
}

/// Shared entry point for every platform connector.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    governor: Arc<CooldownGovernor>,
    handlers: HandlerRegistry,
    viewer_service: Arc<ViewerService>,
    router: Arc<OutboundRouter>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    prefix: RwLock<String>,
    passive: Option<Arc<dyn PassiveChatHandler>>,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard<'a>(&'a Dispatcher);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        governor: Arc<CooldownGovernor>,
        handlers: HandlerRegistry,
        viewer_service: Arc<ViewerService>,
        router: Arc<OutboundRouter>,
        event_bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!("Initializing Dispatcher with handlers {:?}", handlers.keys());
        Self {
            registry,
            governor,
            handlers,
            viewer_service,
            router,
            event_bus,
            clock,
            prefix: RwLock::new(DEFAULT_COMMAND_PREFIX.to_string()),
            passive: None,
            accepting: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub fn with_passive_handler(mut self, handler: Arc<dyn PassiveChatHandler>) -> Self {
        self.passive = Some(handler);
        self
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn governor(&self) -> &Arc<CooldownGovernor> {
        &self.governor
    }

    pub fn viewer_service(&self) -> &Arc<ViewerService> {
        &self.viewer_service
    }

    pub fn router(&self) -> &Arc<OutboundRouter> {
        &self.router
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn command_prefix(&self) -> String {
        self.prefix.read().clone()
    }

    /// Applies a (re)loaded configuration. Safe to call while messages are in flight:
    /// each dispatch sees either the old or the new command set.
    pub fn apply_config(&self, config: &GovernanceConfig) {
        let descriptors: Vec<CommandDescriptor> = config
            .commands
            .iter()
            .filter(|d| {
                let bound = self.handlers.contains(&d.handler_key());
                if !bound {
                    warn!(
                        "Command '{}' names unknown handler '{}'; skipping it",
                        d.name,
                        d.handler_key()
                    );
                }
                bound
            })
            .cloned()
            .collect();

        let loaded = self.registry.replace_all(descriptors);
        self.governor.set_quota_settings(config.quota.clone());
        self.viewer_service.set_starting_balance(StartingBalance {
            coins: config.starting_coins,
            karma: config.starting_karma,
        });
        *self.prefix.write() = config.command_prefix.clone();
        for (platform, limits) in &config.platforms {
            self.router.set_limits(*platform, *limits);
        }
        info!("Configuration applied: {} commands, prefix '{}'", loaded, config.command_prefix);
    }

    /// Stop accepting new messages. In-flight dispatches run to completion.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        info!("Dispatcher no longer accepting messages");
    }

    /// Resolves once no dispatch is in flight.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Inbound entry point. Safe to call concurrently from any number of connectors.
    pub async fn process_message(&self, msg: ChatMessage) -> DispatchOutcome {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(self);
        if !self.accepting.load(Ordering::SeqCst) {
            debug!("Dropping message from '{}': shutting down", msg.username);
            return DispatchOutcome::ShuttingDown;
        }

        let outcome = self.dispatch(&msg).await;
        self.event_bus.publish(BotEvent::MessageProcessed {
            message: msg,
            timestamp: self.clock.now(),
        });
        outcome
    }

    async fn dispatch(&self, msg: &ChatMessage) -> DispatchOutcome {
        let viewer = match self.viewer_service.get_or_create_viewer(msg).await {
            Ok(v) => v,
            Err(e) => {
                error!("Viewer ledger unavailable for '{}': {:?}", msg.username, e);
                return DispatchOutcome::ViewerUnavailable;
            }
        };

        let prefix = self.prefix.read().clone();
        let Some(invocation) = parse_invocation(&msg.text, &prefix) else {
            self.forward_chat(msg, &viewer).await;
            return DispatchOutcome::Chat;
        };

        let Some(descriptor) = self.registry.resolve(invocation.token) else {
            trace!("Unknown command token '{}'", invocation.token);
            return DispatchOutcome::UnknownCommand;
        };

        self.run_command(msg, &viewer, descriptor, invocation.args, &prefix)
            .await
    }

    async fn forward_chat(&self, msg: &ChatMessage, viewer: &Viewer) {
        let Some(passive) = &self.passive else {
            return;
        };
        if let Err(panic) = AssertUnwindSafe(passive.handle_chat(msg, viewer))
            .catch_unwind()
            .await
        {
            error!("Passive chat handler panicked: {}", panic_message(panic.as_ref()));
        }
    }

    fn run_gates(
        &self,
        viewer: &Viewer,
        descriptor: &CommandDescriptor,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(QuotaPermit, CooldownClaim), Rejection> {
        if !descriptor.enabled {
            return Err(Rejection::Disabled);
        }

        let permit = self
            .governor
            .try_reserve_quota(descriptor.event_type, now)
            .map_err(Rejection::QuotaExhausted)?;

        if viewer.banned {
            return Err(Rejection::Banned);
        }

        let claim = self
            .governor
            .try_claim_cooldown(&viewer.identity_key, descriptor, now)
            .map_err(|active| Rejection::Cooldown {
                remaining_secs: ceil_seconds(active.remaining),
            })?;

        match permission::evaluate(&viewer.roles, &descriptor.permission) {
            PermissionDecision::Granted => {}
            PermissionDecision::Denied { required } => {
                return Err(Rejection::PermissionDenied { required: required.to_string() });
            }
            PermissionDecision::Unrecognized { configured } => {
                warn!(
                    "Command '{}' requires unrecognized permission level '{}'; denying",
                    descriptor.name, configured
                );
                return Err(Rejection::PermissionDenied { required: configured });
            }
        }

        Ok((permit, claim))
    }

    async fn run_command(
        &self,
        msg: &ChatMessage,
        viewer: &Viewer,
        resolved: Arc<CommandDescriptor>,
        args: &str,
        prefix: &str,
    ) -> DispatchOutcome {
        let now = self.clock.now();
        let mut descriptor = resolved;
        let mut passes = 0;

        // Gates run against the resolved descriptor; if a reload swapped it meanwhile,
        // run them once more against the current one.
        let (permit, claim) = loop {
            passes += 1;
            let (permit, claim) = match self.run_gates(viewer, &descriptor, now) {
                Ok(held) => held,
                Err(reason) => return self.reject(msg, &descriptor, reason, prefix),
            };
            match self.registry.resolve(&descriptor.name) {
                None => {
                    debug!("Command '{}' was removed mid-dispatch", descriptor.name);
                    return DispatchOutcome::UnknownCommand;
                }
                Some(current) if Arc::ptr_eq(&current, &descriptor) || passes >= 2 => {
                    break (permit, claim);
                }
                Some(current) => {
                    debug!("Command '{}' changed mid-dispatch; re-checking", descriptor.name);
                    drop((permit, claim));
                    descriptor = current;
                }
            }
        };

        let Some(handler) = self.handlers.get(&descriptor.handler_key()) else {
            warn!(
                "No handler bound to '{}' for command '{}'",
                descriptor.handler_key(),
                descriptor.name
            );
            return DispatchOutcome::UnknownCommand;
        };

        let ctx = CommandContext {
            message: msg,
            viewer,
            descriptor: &descriptor,
            args,
            prefix,
            registry: self.registry.as_ref(),
            viewer_service: self.viewer_service.as_ref(),
        };

        let fault = match AssertUnwindSafe(handler.execute(&ctx)).catch_unwind().await {
            Ok(Ok(response)) => {
                self.governor.record_success(permit, claim, now);
                if !response.trim().is_empty() {
                    self.router.route(msg.platform, &msg.channel, &response);
                }
                self.event_bus.publish(BotEvent::CommandExecuted {
                    message: msg.clone(),
                    command: descriptor.name.clone(),
                    result_text: response.clone(),
                    timestamp: self.clock.now(),
                });
                debug!("Executed {}{} for '{}'", prefix, descriptor.name, viewer.identity_key);
                return DispatchOutcome::Executed {
                    command: descriptor.name.clone(),
                    response,
                };
            }
            Ok(Err(e)) => format!("{:?}", e),
            Err(panic) => format!("panic: {}", panic_message(panic.as_ref())),
        };

        error!(
            "Command '{}' failed for '{}' (text={:?}): {}",
            descriptor.name, viewer.identity_key, msg.text, fault
        );
        let reply = format!(
            "@{} something went wrong while running {}{}.",
            msg.reply_name(),
            prefix,
            descriptor.name
        );
        self.router.route(msg.platform, &msg.channel, &reply);
        DispatchOutcome::Failed { command: descriptor.name.clone() }
    }

    fn reject(
        &self,
        msg: &ChatMessage,
        descriptor: &CommandDescriptor,
        reason: Rejection,
        prefix: &str,
    ) -> DispatchOutcome {
        if reason == Rejection::Banned {
            debug!("Ignoring {}{} from banned viewer '{}'", prefix, descriptor.name, msg.identity_key());
        } else {
            debug!("Rejected {}{} for '{}': {:?}", prefix, descriptor.name, msg.identity_key(), reason);
        }
        if let Some(text) = rejection_text(msg, descriptor, &reason, prefix) {
            self.router.route(msg.platform, &msg.channel, &text);
        }
        DispatchOutcome::Rejected {
            command: descriptor.name.clone(),
            reason,
        }
    }
}
