// File: chatgate-core/src/services/message_sender.rs
//! Outbound routing: platform-keyed, queued sending with splitting and backoff.
//!
//! Each registered platform gets its own bounded queue and worker task. `route` only
//! enqueues, so inter-part delays and retry backoff never hold up dispatch decisions.

use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chatgate_common::models::Platform;
use chatgate_common::traits::platform_traits::PlatformSender;

/// Maximum length for Twitch chat messages (kept under the hard 500 limit).
pub const TWITCH_MAX_MSG_LENGTH: usize = 450;
const DISCORD_MAX_MSG_LENGTH: usize = 2000;
const YOUTUBE_MAX_MSG_LENGTH: usize = 200;
const DEFAULT_QUEUE_SIZE: usize = 256;
const MIN_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF: Duration = Duration::from_secs(10);

fn default_max_message_length() -> usize {
    TWITCH_MAX_MSG_LENGTH
}

fn default_part_delay_ms() -> u64 {
    500
}

fn default_max_send_attempts() -> u32 {
    3
}

/// Per-platform sending constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLimits {
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Pause between the parts of a split message, and the initial retry backoff.
    #[serde(default = "default_part_delay_ms")]
    pub part_delay_ms: u64,
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            part_delay_ms: default_part_delay_ms(),
            max_send_attempts: default_max_send_attempts(),
        }
    }
}

impl PlatformLimits {
    pub fn for_platform(platform: Platform) -> Self {
        let max_message_length = match platform {
            Platform::Twitch | Platform::Kick => TWITCH_MAX_MSG_LENGTH,
            Platform::Discord => DISCORD_MAX_MSG_LENGTH,
            Platform::YouTube => YOUTUBE_MAX_MSG_LENGTH,
            Platform::Console => 4096,
        };
        Self { max_message_length, ..Self::default() }
    }
}

/// Splits over-long text into ordered parts no longer than `max_len` characters.
pub trait MessageSplitter: Send + Sync {
    fn split(&self, text: &str, max_len: usize) -> Vec<String>;
}

/// Room kept for the "(i/n) " prefix and the "..." suffix on multi-part messages.
const PART_PREFIX_RESERVE: usize = 10;
const ELLIPSIS: &str = "...";
/// How far back from the hard cut we look for a nicer break point.
const BREAK_SEARCH_WINDOW: usize = 150;
const BREAK_STRINGS: [&str; 6] = [". ", "! ", "? ", "; ", ", ", " "];

/// Default splitter: prefers sentence ends, then clause breaks, then spaces, and
/// numbers the parts `(1/3) ...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceSplitter;

fn find_break(window: &[char]) -> Option<usize> {
    for pattern in BREAK_STRINGS {
        let pat: Vec<char> = pattern.chars().collect();
        if window.len() < pat.len() {
            continue;
        }
        if let Some(pos) = (0..=window.len() - pat.len())
            .rev()
            .find(|&i| window[i..i + pat.len()] == pat[..])
        {
            return Some(pos + pat.len());
        }
    }
    None
}

impl MessageSplitter for SentenceSplitter {
    fn split(&self, text: &str, max_len: usize) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        if max_len == 0 || chars.len() <= max_len {
            return vec![text.to_string()];
        }

        let budget = max_len
            .saturating_sub(PART_PREFIX_RESERVE + ELLIPSIS.len())
            .max(1);

        let mut segments = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = (start + budget).min(chars.len());
            if end < chars.len() {
                let search_start = end.saturating_sub(BREAK_SEARCH_WINDOW).max(start);
                if let Some(pos) = find_break(&chars[search_start..end]) {
                    end = search_start + pos;
                }
            }
            let segment: String = chars[start..end].iter().collect();
            let segment = segment.trim();
            if !segment.is_empty() {
                segments.push(segment.to_string());
            }
            start = end;
        }

        if segments.len() > 1 {
            let total = segments.len();
            for (i, segment) in segments.iter_mut().enumerate() {
                let suffix = if i + 1 < total { ELLIPSIS } else { "" };
                *segment = format!("({}/{}) {}{}", i + 1, total, segment, suffix);
            }
        }
        segments
    }
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: String,
    pub text: String,
}

struct PlatformRoute {
    tx: mpsc::Sender<OutboundMessage>,
    sender: Arc<dyn PlatformSender>,
    limits: Arc<RwLock<PlatformLimits>>,
    worker: JoinHandle<()>,
}

/// Routes replies to the sender registered for the originating platform.
pub struct OutboundRouter {
    routes: DashMap<Platform, PlatformRoute>,
    splitter: Arc<dyn MessageSplitter>,
    queue_size: usize,
}

impl Default for OutboundRouter {
    fn default() -> Self {
        Self::new(Arc::new(SentenceSplitter))
    }
}

impl OutboundRouter {
    pub fn new(splitter: Arc<dyn MessageSplitter>) -> Self {
        Self {
            routes: DashMap::new(),
            splitter,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    /// Registers (or replaces) the sender for `platform` and starts its worker.
    /// Must be called from within a tokio runtime.
    pub fn register_sender(
        &self,
        platform: Platform,
        sender: Arc<dyn PlatformSender>,
        limits: PlatformLimits,
    ) {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let limits = Arc::new(RwLock::new(limits));
        let worker = tokio::spawn(run_platform_worker(
            platform,
            sender.clone(),
            limits.clone(),
            self.splitter.clone(),
            rx,
        ));

        // The old worker (if any) finishes its queue and exits once its sender is dropped.
        if self
            .routes
            .insert(platform, PlatformRoute { tx, sender, limits, worker })
            .is_some()
        {
            info!("Replaced outbound sender for {}", platform);
        } else {
            info!("Registered outbound sender for {}", platform);
        }
    }

    pub fn unregister_sender(&self, platform: Platform) -> bool {
        self.routes.remove(&platform).is_some()
    }

    pub fn has_sender(&self, platform: Platform) -> bool {
        self.routes.contains_key(&platform)
    }

    pub fn set_limits(&self, platform: Platform, limits: PlatformLimits) {
        if let Some(route) = self.routes.get(&platform) {
            *route.limits.write() = limits;
        }
    }

    /// Queues `text` for delivery. Never errors: a missing or disconnected sender, a
    /// full queue, or empty text just drops the reply (logged). Returns whether it was queued.
    pub fn route(&self, platform: Platform, channel: &str, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(route) = self.routes.get(&platform) else {
            warn!("No outbound sender registered for {}; dropping reply", platform);
            return false;
        };
        if !route.sender.is_connected() {
            warn!("Outbound sender for {} is disconnected; dropping reply", platform);
            return false;
        }

        let msg = OutboundMessage {
            channel: channel.to_string(),
            text: text.to_string(),
        };
        match route.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue for {} is full; dropping reply", platform);
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!("Outbound worker for {} is gone; dropping reply", platform);
                false
            }
        }
    }

    /// Stops accepting replies and waits until every queued reply has been handled.
    pub async fn close(&self) {
        let platforms: Vec<Platform> = self.routes.iter().map(|r| *r.key()).collect();
        for platform in platforms {
            if let Some((_, route)) = self.routes.remove(&platform) {
                drop(route.tx);
                if let Err(e) = route.worker.await {
                    error!("Outbound worker for {} ended abnormally: {:?}", platform, e);
                }
            }
        }
    }
}

async fn run_platform_worker(
    platform: Platform,
    sender: Arc<dyn PlatformSender>,
    limits: Arc<RwLock<PlatformLimits>>,
    splitter: Arc<dyn MessageSplitter>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    debug!("Outbound worker for {} started", platform);
    while let Some(msg) = rx.recv().await {
        let limits = *limits.read();
        let parts = splitter.split(&msg.text, limits.max_message_length);
        let total = parts.len();

        for (i, part) in parts.iter().enumerate() {
            if !send_with_backoff(platform, sender.as_ref(), &msg.channel, part, &limits).await {
                if i + 1 < total {
                    warn!("Dropping remaining {} part(s) for {}", total - i - 1, platform);
                }
                break;
            }
            if i + 1 < total {
                tokio::time::sleep(Duration::from_millis(limits.part_delay_ms)).await;
            }
        }
    }
    debug!("Outbound worker for {} stopped", platform);
}

async fn send_with_backoff(
    platform: Platform,
    sender: &dyn PlatformSender,
    channel: &str,
    part: &str,
    limits: &PlatformLimits,
) -> bool {
    let attempts = limits.max_send_attempts.max(1);
    let mut backoff = Duration::from_millis(limits.part_delay_ms.max(MIN_BACKOFF_MS));

    for attempt in 1..=attempts {
        if !sender.is_connected() {
            warn!("{} sender disconnected; dropping message part", platform);
            return false;
        }
        match sender.send(channel, part).await {
            Ok(()) => return true,
            Err(e) if attempt < attempts => {
                warn!(
                    "Send to {} failed (attempt {}/{}): {:?}; retrying in {:?}",
                    platform, attempt, attempts, e, backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => {
                error!("Send to {} failed after {} attempts: {:?}", platform, attempts, e);
            }
        }
    }
    false
}
