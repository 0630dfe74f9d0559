// File: chatgate-core/tests/dispatch_tests.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;

use chatgate_common::models::{
    ChatMessage, CommandDescriptor, EventType, Platform, Viewer, ViewerRoles,
};
use chatgate_common::traits::repository_traits::ViewerRepository;
use chatgate_core::eventbus::{BotEvent, EventBus};
use chatgate_core::repositories::InMemoryViewerRepository;
use chatgate_core::services::{
    CommandContext, CommandHandler, CommandRegistry, CooldownGovernor, DispatchOutcome,
    Dispatcher, HandlerRegistry, OutboundRouter, PassiveChatHandler, PlatformLimits,
    QuotaSettings, Rejection, StartingBalance, ViewerService,
};
use chatgate_core::test_utils::{ManualClock, RecordingSender};
use chatgate_core::utils::time::Clock;
use chatgate_core::{Error, GovernanceConfig};

mock! {
    ViewerRepo {}
    #[async_trait]
    impl ViewerRepository for ViewerRepo {
        async fn get_or_create(&self, template: &Viewer) -> Result<Viewer, Error>;
        async fn get(&self, identity_key: &str) -> Result<Option<Viewer>, Error>;
        async fn update(&self, viewer: &Viewer) -> Result<(), Error>;
    }
}

struct FailingCommand;

#[async_trait]
impl CommandHandler for FailingCommand {
    async fn execute(&self, _ctx: &CommandContext<'_>) -> Result<String, Error> {
        Err(Error::Handler("weather service unreachable".into()))
    }
}

struct PanickingCommand;

#[async_trait]
impl CommandHandler for PanickingCommand {
    async fn execute(&self, _ctx: &CommandContext<'_>) -> Result<String, Error> {
        panic!("handler blew up");
    }
}

struct SlowCommand;

#[async_trait]
impl CommandHandler for SlowCommand {
    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<String, Error> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(format!("cloudy for {}", ctx.message.reply_name()))
    }
}

#[derive(Default)]
struct ChatCounter {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl PassiveChatHandler for ChatCounter {
    async fn handle_chat(&self, message: &ChatMessage, _viewer: &Viewer) {
        self.seen.lock().push(message.text.clone());
    }
}

struct Harness {
    dispatcher: Arc<Dispatcher>,
    clock: ManualClock,
    sender: RecordingSender,
    chat: Arc<ChatCounter>,
}

impl Harness {
    async fn say(&self, user: &str, text: &str) -> DispatchOutcome {
        self.dispatcher
            .process_message(ChatMessage::new(Platform::Twitch, user, text).with_channel("#stream"))
            .await
    }

    async fn say_as(&self, user: &str, roles: ViewerRoles, text: &str) -> DispatchOutcome {
        self.dispatcher
            .process_message(
                ChatMessage::new(Platform::Twitch, user, text)
                    .with_channel("#stream")
                    .with_roles(roles),
            )
            .await
    }

    /// Drains the outbound queue and returns everything that was sent.
    async fn replies(&self) -> Vec<String> {
        self.dispatcher.router().close().await;
        self.sender.texts()
    }
}

fn config(commands: Vec<CommandDescriptor>, quota: QuotaSettings) -> GovernanceConfig {
    GovernanceConfig {
        starting_coins: 150,
        starting_karma: 100,
        quota,
        commands,
        ..GovernanceConfig::default()
    }
}

fn reply(name: &str, response: &str) -> CommandDescriptor {
    CommandDescriptor::new(name)
        .with_handler("reply")
        .with_response(response)
}

fn harness(config: GovernanceConfig) -> Harness {
    let mut handlers = HandlerRegistry::with_builtins();
    handlers
        .register("failing", Arc::new(FailingCommand))
        .register("panicking", Arc::new(PanickingCommand))
        .register("slow", Arc::new(SlowCommand));
    harness_with(config, handlers, Arc::new(InMemoryViewerRepository::new()))
}

fn harness_with(
    config: GovernanceConfig,
    handlers: HandlerRegistry,
    viewer_repo: Arc<dyn ViewerRepository>,
) -> Harness {
    let clock = ManualClock::default();
    let sender = RecordingSender::new();
    let router = Arc::new(OutboundRouter::default());
    router.register_sender(
        Platform::Twitch,
        Arc::new(sender.clone()),
        PlatformLimits { part_delay_ms: 1, ..PlatformLimits::default() },
    );
    let chat = Arc::new(ChatCounter::default());

    let dispatcher = Dispatcher::new(
        Arc::new(CommandRegistry::new()),
        Arc::new(CooldownGovernor::new(QuotaSettings::default())),
        handlers,
        Arc::new(ViewerService::new(
            viewer_repo,
            Arc::new(clock.clone()),
            StartingBalance::default(),
        )),
        router,
        Arc::new(EventBus::new()),
        Arc::new(clock.clone()),
    )
    .with_passive_handler(chat.clone());
    dispatcher.apply_config(&config);

    Harness {
        dispatcher: Arc::new(dispatcher),
        clock,
        sender,
        chat,
    }
}

fn executed(command: &str, response: &str) -> DispatchOutcome {
    DispatchOutcome::Executed {
        command: command.to_string(),
        response: response.to_string(),
    }
}

#[tokio::test]
async fn per_user_cooldown_blocks_only_the_same_viewer() {
    let h = harness(config(
        vec![reply("weather", "Sunny for {user}").with_cooldown(5)],
        QuotaSettings::default(),
    ));

    assert_eq!(h.say("alice", "!weather").await, executed("weather", "Sunny for alice"));

    h.clock.advance_secs(2);
    assert_eq!(
        h.say("alice", "!weather").await,
        DispatchOutcome::Rejected {
            command: "weather".into(),
            reason: Rejection::Cooldown { remaining_secs: 3 },
        }
    );
    assert_eq!(h.say("bob", "!weather").await, executed("weather", "Sunny for bob"));

    h.clock.advance_secs(4);
    assert_eq!(h.say("alice", "!weather").await, executed("weather", "Sunny for alice"));

    assert_eq!(
        h.replies().await,
        vec![
            "Sunny for alice",
            "@alice !weather is on cooldown, try again in 3s.",
            "Sunny for bob",
            "Sunny for alice",
        ]
    );
}

#[tokio::test]
async fn global_quota_is_shared_across_viewers() {
    let h = harness(config(
        vec![
            reply("hug", "hug!").with_event_type(EventType::Good),
            reply("pat", "pat!").with_event_type(EventType::Good),
            reply("wave", "wave!").with_event_type(EventType::Neutral),
        ],
        QuotaSettings::new(1).with_capacity(EventType::Good, 2),
    ));

    assert!(matches!(h.say("a", "!hug").await, DispatchOutcome::Executed { .. }));
    assert!(matches!(h.say("b", "!pat").await, DispatchOutcome::Executed { .. }));
    assert_eq!(
        h.say("c", "!hug").await,
        DispatchOutcome::Rejected {
            command: "hug".into(),
            reason: Rejection::QuotaExhausted(
                chatgate_core::services::cooldown_governor::QuotaExhausted {
                    event_type: EventType::Good,
                    capacity: 2,
                    window_days: 1,
                }
            ),
        }
    );
    // Neutral has no capacity configured.
    assert!(matches!(h.say("c", "!wave").await, DispatchOutcome::Executed { .. }));

    h.clock.advance(chrono::Duration::days(1) + chrono::Duration::seconds(1));
    assert!(matches!(h.say("c", "!hug").await, DispatchOutcome::Executed { .. }));

    let replies = h.replies().await;
    assert!(replies.contains(
        &"@c the global limit for good events has been reached (2 per 1 day(s)). Try again later."
            .to_string()
    ));
}

#[tokio::test]
async fn single_slot_good_quota_across_three_viewers() {
    let h = harness(config(
        vec![reply("hug", "hug!").with_event_type(EventType::Good)],
        QuotaSettings::new(1).with_capacity(EventType::Good, 1),
    ));

    assert!(matches!(h.say("a", "!hug").await, DispatchOutcome::Executed { .. }));
    for user in ["b", "c"] {
        assert!(matches!(
            h.say(user, "!hug").await,
            DispatchOutcome::Rejected { reason: Rejection::QuotaExhausted(_), .. }
        ));
    }

    // Exactly one window later A's execution still counts; one second after it does not.
    h.clock.advance(chrono::Duration::days(1));
    assert!(matches!(
        h.say("c", "!hug").await,
        DispatchOutcome::Rejected { reason: Rejection::QuotaExhausted(_), .. }
    ));
    h.clock.advance_secs(1);
    assert!(matches!(h.say("c", "!hug").await, DispatchOutcome::Executed { .. }));
}

#[tokio::test]
async fn alias_resolves_to_primary_and_shares_cooldown() {
    let h = harness(config(
        vec![reply("weather", "Sunny").with_alias("w").with_cooldown(30)],
        QuotaSettings::default(),
    ));

    assert_eq!(h.say("alice", "!W").await, executed("weather", "Sunny"));
    assert!(matches!(
        h.say("alice", "!weather").await,
        DispatchOutcome::Rejected { reason: Rejection::Cooldown { .. }, .. }
    ));
}

#[tokio::test]
async fn permission_gate_uses_role_hierarchy() {
    let h = harness(config(
        vec![
            reply("ban", "done").with_permission("moderator"),
            reply("secret", "shh").with_permission("superadmin"),
        ],
        QuotaSettings::default(),
    ));

    assert_eq!(
        h.say("viewer", "!ban").await,
        DispatchOutcome::Rejected {
            command: "ban".into(),
            reason: Rejection::PermissionDenied { required: "moderator".into() },
        }
    );
    assert_eq!(h.say_as("mod", ViewerRoles::moderator(), "!ban").await, executed("ban", "done"));
    assert_eq!(
        h.say_as("owner", ViewerRoles::broadcaster(), "!ban").await,
        executed("ban", "done")
    );
    assert_eq!(
        h.say_as("owner", ViewerRoles::broadcaster(), "!secret").await,
        DispatchOutcome::Rejected {
            command: "secret".into(),
            reason: Rejection::PermissionDenied { required: "superadmin".into() },
        }
    );

    let replies = h.replies().await;
    assert_eq!(replies[0], "@viewer !ban requires moderator permission.");
}

#[tokio::test]
async fn first_contact_creates_viewer_with_starting_balance() {
    let h = harness(config(
        vec![CommandDescriptor::new("balance")],
        QuotaSettings::default(),
    ));
    let service = h.dispatcher.viewer_service();
    assert!(service.get_viewer("newbie").await.unwrap().is_none());

    assert_eq!(
        h.say("newbie", "!balance").await,
        executed("balance", "@newbie you have 150 coins and 100 karma.")
    );
    let viewer = service.get_viewer("newbie").await.unwrap().unwrap();
    assert_eq!((viewer.coins, viewer.karma), (150, 100));

    // Plain chat from a new viewer also creates them.
    assert_eq!(h.say("lurker", "hello").await, DispatchOutcome::Chat);
    assert!(service.get_viewer("lurker").await.unwrap().is_some());
}

#[tokio::test]
async fn handler_faults_are_contained_and_do_not_stamp() {
    let h = harness(config(
        vec![
            CommandDescriptor::new("forecast")
                .with_handler("failing")
                .with_cooldown(60)
                .with_event_type(EventType::Good),
            CommandDescriptor::new("boom").with_handler("panicking"),
            CommandDescriptor::new("ping"),
        ],
        QuotaSettings::new(1).with_capacity(EventType::Good, 1),
    ));

    let failed = DispatchOutcome::Failed { command: "forecast".into() };
    assert_eq!(h.say("alice", "!forecast").await, failed);
    // No cooldown stamp, no quota consumed.
    assert_eq!(h.say("alice", "!forecast").await, failed);
    assert_eq!(
        h.dispatcher.governor().quota_used(EventType::Good, h.clock.now()),
        0
    );

    assert_eq!(
        h.say("alice", "!boom").await,
        DispatchOutcome::Failed { command: "boom".into() }
    );
    assert_eq!(h.say("alice", "!ping").await, executed("ping", "pong"));

    let replies = h.replies().await;
    assert_eq!(
        replies,
        vec![
            "@alice something went wrong while running !forecast.",
            "@alice something went wrong while running !forecast.",
            "@alice something went wrong while running !boom.",
            "pong",
        ]
    );
}

#[tokio::test]
async fn disabled_banned_and_unknown_commands() {
    let h = harness(config(
        vec![reply("raid", "raid!").disabled(), CommandDescriptor::new("ping")],
        QuotaSettings::default(),
    ));

    assert_eq!(
        h.say("alice", "!raid").await,
        DispatchOutcome::Rejected { command: "raid".into(), reason: Rejection::Disabled }
    );
    assert_eq!(h.say("alice", "!nope").await, DispatchOutcome::UnknownCommand);

    h.say("troll", "hi").await;
    h.dispatcher
        .viewer_service()
        .set_banned("troll", true)
        .await
        .unwrap();
    assert_eq!(
        h.say("troll", "!ping").await,
        DispatchOutcome::Rejected { command: "ping".into(), reason: Rejection::Banned }
    );

    // Only the disabled notice is sent: unknown and banned are silent.
    assert_eq!(h.replies().await, vec!["@alice the command !raid is currently disabled."]);
}

#[tokio::test]
async fn non_commands_go_to_the_passive_handler() {
    let h = harness(config(vec![CommandDescriptor::new("ping")], QuotaSettings::default()));

    assert_eq!(h.say("alice", "hello chat").await, DispatchOutcome::Chat);
    assert_eq!(h.say("alice", "!").await, DispatchOutcome::Chat);
    assert_eq!(h.say("alice", "!ping").await, executed("ping", "pong"));
    assert_eq!(*h.chat.seen.lock(), vec!["hello chat".to_string(), "!".to_string()]);
}

#[tokio::test]
async fn executions_are_published_on_the_bus() {
    let h = harness(config(vec![CommandDescriptor::new("ping")], QuotaSettings::default()));
    let mut rx = h.dispatcher.event_bus().subscribe(None);

    h.say("alice", "!ping").await;

    match rx.recv().await {
        Some(BotEvent::CommandExecuted { command, result_text, message, .. }) => {
            assert_eq!(command, "ping");
            assert_eq!(result_text, "pong");
            assert_eq!(message.username, "alice");
        }
        other => panic!("expected CommandExecuted, got {:?}", other),
    }
    assert!(matches!(rx.recv().await, Some(BotEvent::MessageProcessed { .. })));
}

#[tokio::test]
async fn ledger_failure_stops_processing() {
    let mut repo = MockViewerRepo::new();
    repo.expect_get_or_create()
        .returning(|_| Err(Error::Platform("ledger offline".into())));
    repo.expect_update().never();

    let h = harness_with(
        config(vec![CommandDescriptor::new("ping")], QuotaSettings::default()),
        HandlerRegistry::with_builtins(),
        Arc::new(repo),
    );
    assert_eq!(h.say("alice", "!ping").await, DispatchOutcome::ViewerUnavailable);
    assert!(h.replies().await.is_empty());
}

#[tokio::test]
async fn concurrent_dispatch_never_overshoots_quota() {
    let h = harness(config(
        vec![reply("hug", "hug!").with_event_type(EventType::Good)],
        QuotaSettings::new(1).with_capacity(EventType::Good, 3),
    ));

    let count = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for i in 0..20 {
        let dispatcher = h.dispatcher.clone();
        let count = count.clone();
        tasks.push(tokio::spawn(async move {
            let msg = ChatMessage::new(Platform::Twitch, &format!("user{}", i), "!hug");
            if let DispatchOutcome::Executed { .. } = dispatcher.process_message(msg).await {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatch_from_one_viewer_respects_cooldown() {
    let h = harness(config(
        vec![CommandDescriptor::new("weather").with_handler("slow").with_cooldown(60)],
        QuotaSettings::default(),
    ));

    let executed = Arc::new(AtomicUsize::new(0));
    let on_cooldown = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for _ in 0..5 {
        let dispatcher = h.dispatcher.clone();
        let executed = executed.clone();
        let on_cooldown = on_cooldown.clone();
        tasks.push(tokio::spawn(async move {
            let msg = ChatMessage::new(Platform::Twitch, "alice", "!weather");
            match dispatcher.process_message(msg).await {
                DispatchOutcome::Executed { .. } => {
                    executed.fetch_add(1, Ordering::SeqCst);
                }
                DispatchOutcome::Rejected { reason: Rejection::Cooldown { .. }, .. } => {
                    on_cooldown.fetch_add(1, Ordering::SeqCst);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert_eq!(on_cooldown.load(Ordering::SeqCst), 4);

    // the committed stamp keeps blocking afterwards, other viewers are unaffected
    assert!(matches!(
        h.say("alice", "!weather").await,
        DispatchOutcome::Rejected { reason: Rejection::Cooldown { remaining_secs: 60 }, .. }
    ));
    assert!(matches!(h.say("bob", "!weather").await, DispatchOutcome::Executed { .. }));
}

#[tokio::test]
async fn huge_quota_window_does_not_break_dispatch() {
    let h = harness(config(
        vec![
            reply("hug", "hug!").with_event_type(EventType::Good),
            CommandDescriptor::new("ping"),
        ],
        QuotaSettings::default(),
    ));
    h.dispatcher
        .governor()
        .set_quota_settings(QuotaSettings::new(u32::MAX).with_capacity(EventType::Good, 1));

    assert_eq!(h.say("alice", "!hug").await, executed("hug", "hug!"));
    h.clock.advance_secs(3600);
    assert!(matches!(
        h.say("bob", "!hug").await,
        DispatchOutcome::Rejected { reason: Rejection::QuotaExhausted(_), .. }
    ));
    assert_eq!(h.say("carol", "!ping").await, executed("ping", "pong"));
}

#[tokio::test]
async fn reload_replaces_command_set_and_skips_unknown_handlers() {
    let h = harness(config(vec![CommandDescriptor::new("ping")], QuotaSettings::default()));
    assert_eq!(h.dispatcher.registry().len(), 1);

    let mut next = config(
        vec![
            reply("hello", "hi {user}").with_alias("hi"),
            CommandDescriptor::new("dance").with_handler("not-a-handler"),
        ],
        QuotaSettings::default(),
    );
    next.command_prefix = "?".into();
    h.dispatcher.apply_config(&next);

    assert_eq!(h.dispatcher.registry().len(), 1);
    assert_eq!(h.dispatcher.command_prefix(), "?");
    assert_eq!(h.say("alice", "?ping").await, DispatchOutcome::UnknownCommand);
    assert_eq!(h.say("alice", "?dance").await, DispatchOutcome::UnknownCommand);
    assert_eq!(h.say("alice", "?hi").await, executed("hello", "hi alice"));
    assert_eq!(h.say("alice", "!hello").await, DispatchOutcome::Chat);
}

#[tokio::test]
async fn shutdown_rejects_new_messages() {
    let h = harness(config(vec![CommandDescriptor::new("ping")], QuotaSettings::default()));
    h.dispatcher.shutdown();
    assert_eq!(h.say("alice", "!ping").await, DispatchOutcome::ShuttingDown);
    h.dispatcher.drain().await;
    assert!(h.replies().await.is_empty());
}
