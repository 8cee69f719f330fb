//! Support-ticket lifecycle: creation, claiming, inactivity tracking, SLA
//! escalation, and closure with transcript archival.
//!
//! Per-channel state machine: `none -> open -> (claimed | unclaimed) -> closed`.
//! All check-then-set mutations (claim, close, timer rearm) run without an
//! await point in between, so two racing handlers can interleave but never
//! observe a half-applied transition.
//!
//! Ticket metadata is mirrored into the channel topic as
//! `owner:<id> | nick:<n> | modalidad:<m> | categoria:<c> [| claimed:<id>]`
//! so that tickets survive a bot restart: a channel whose topic parses back
//! into a ticket is re-adopted on the first event that touches it.

use dashmap::{DashMap, DashSet};
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{ChannelId, Http, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::managers::timer_manager::{SharedTimerManager, TimerKey};
use crate::managers::transcript;
use crate::messages;

/// Fixed set of ticket categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketCategory {
    Support,
    BugReport,
    Purchase,
    Appeal,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 4] = [
        TicketCategory::Support,
        TicketCategory::BugReport,
        TicketCategory::Purchase,
        TicketCategory::Appeal,
    ];

    /// Stable token used in custom IDs, channel names, and the topic encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::Support => "soporte",
            TicketCategory::BugReport => "bug",
            TicketCategory::Purchase => "compra",
            TicketCategory::Appeal => "apelacion",
        }
    }

    /// Member-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            TicketCategory::Support => "Soporte",
            TicketCategory::BugReport => "Reporte de bug",
            TicketCategory::Purchase => "Compra",
            TicketCategory::Appeal => "Apelación",
        }
    }

    pub fn from_str(token: &str) -> Option<TicketCategory> {
        TicketCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == token)
    }
}

/// In-memory state of one open ticket, keyed by its channel.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub owner: UserId,
    pub category: TicketCategory,
    /// Requester's in-game nickname, collected by the creation form.
    pub nickname: String,
    /// Game mode the request is about ("modalidad" in the form).
    pub game_mode: String,
    /// Staff member handling the ticket. Set at most once.
    pub claimed_by: Option<UserId>,
    pub created_at_ms: u64,
}

impl Ticket {
    pub fn new(owner: UserId, category: TicketCategory, nickname: String, game_mode: String) -> Self {
        Self {
            owner,
            category,
            nickname,
            game_mode,
            claimed_by: None,
            created_at_ms: now_ms(),
        }
    }

    /// Render the channel-topic encoding. Field order is fixed; downstream
    /// tooling and the restart re-adoption path both parse it.
    pub fn encode_topic(&self) -> String {
        let mut topic = format!(
            "owner:{} | nick:{} | modalidad:{} | categoria:{}",
            self.owner,
            self.nickname,
            self.game_mode,
            self.category.as_str()
        );
        if let Some(staff) = self.claimed_by {
            topic.push_str(&format!(" | claimed:{}", staff));
        }
        topic
    }

    /// Parse a channel topic back into a ticket. Returns `None` unless an
    /// `owner:` field with a valid ID is present; other fields default.
    pub fn decode_topic(topic: &str) -> Option<Ticket> {
        let mut owner = None;
        let mut nickname = String::new();
        let mut game_mode = String::new();
        let mut category = TicketCategory::Support;
        let mut claimed_by = None;

        for field in topic.split('|') {
            let field = field.trim();
            let (key, value) = match field.split_once(':') {
                Some(pair) => pair,
                None => continue,
            };
            match key.trim() {
                "owner" => owner = value.trim().parse::<u64>().ok().map(UserId::new),
                "nick" => nickname = value.trim().to_string(),
                "modalidad" => game_mode = value.trim().to_string(),
                "categoria" => {
                    if let Some(parsed) = TicketCategory::from_str(value.trim()) {
                        category = parsed;
                    }
                }
                "claimed" => claimed_by = value.trim().parse::<u64>().ok().map(UserId::new),
                _ => {}
            }
        }

        Some(Ticket {
            owner: owner?,
            category,
            nickname,
            game_mode,
            claimed_by,
            created_at_ms: now_ms(),
        })
    }
}

/// Owns all per-ticket state and drives the timer manager.
pub struct TicketManager {
    tickets: DashMap<ChannelId, Ticket>,
    /// Channels already checked and found not to be tickets, so the
    /// restart re-adoption path doesn't refetch them on every message.
    non_tickets: DashSet<ChannelId>,
    timers: SharedTimerManager,
    config: Arc<BotConfig>,
}

impl TicketManager {
    pub fn new(config: Arc<BotConfig>, timers: SharedTimerManager) -> Self {
        Self {
            tickets: DashMap::new(),
            non_tickets: DashSet::new(),
            timers,
            config,
        }
    }

    pub fn get(&self, channel_id: ChannelId) -> Option<Ticket> {
        self.tickets.get(&channel_id).map(|entry| entry.clone())
    }

    pub fn is_ticket(&self, channel_id: ChannelId) -> bool {
        self.tickets.contains_key(&channel_id)
    }

    /// Register a freshly created ticket channel.
    pub fn insert(&self, channel_id: ChannelId, ticket: Ticket) {
        self.non_tickets.remove(&channel_id);
        self.tickets.insert(channel_id, ticket);
    }

    /// Re-adopt a ticket recovered from a channel topic after a restart.
    pub fn adopt(&self, channel_id: ChannelId, ticket: Ticket) {
        info!(
            "Adopted ticket channel {} (owner {}) from topic metadata",
            channel_id, ticket.owner
        );
        self.insert(channel_id, ticket);
    }

    pub fn mark_non_ticket(&self, channel_id: ChannelId) {
        self.non_tickets.insert(channel_id);
    }

    pub fn is_known_non_ticket(&self, channel_id: ChannelId) -> bool {
        self.non_tickets.contains(&channel_id)
    }

    /// Claim a ticket for `staff`. First-claimer-wins: the check and the
    /// mutation happen under the entry lock with no await in between, so a
    /// racing second claim always observes [`BotError::AlreadyClaimed`].
    /// Cancels both SLA timers. Returns the updated ticket so the caller can
    /// mirror the claim into the channel topic.
    pub fn claim(&self, channel_id: ChannelId, staff: UserId) -> Result<Ticket> {
        let ticket = {
            let mut entry =
                self.tickets
                    .get_mut(&channel_id)
                    .ok_or_else(|| BotError::UnknownTicket {
                        channel_id: channel_id.to_string(),
                    })?;
            if let Some(existing) = entry.claimed_by {
                return Err(BotError::AlreadyClaimed {
                    claimed_by: existing.to_string(),
                });
            }
            entry.claimed_by = Some(staff);
            entry.clone()
        };

        self.timers.cancel(TimerKey::SlaStaff(channel_id));
        self.timers.cancel(TimerKey::SlaAdmin(channel_id));
        info!("Ticket {} claimed by {}", channel_id, staff);
        Ok(ticket)
    }

    /// Atomically take the ticket out of the open set and cancel all of its
    /// timers. Returns `None` when the ticket is already closed or closing,
    /// which makes every close path idempotent: the map removal is the
    /// single commit point.
    pub fn begin_close(&self, channel_id: ChannelId) -> Option<Ticket> {
        let (_, ticket) = self.tickets.remove(&channel_id)?;
        self.timers.cancel_ticket(channel_id);
        Some(ticket)
    }

    /// Channels of unclaimed tickets owned by `owner`.
    pub fn unclaimed_owned_by(&self, owner: UserId) -> Vec<ChannelId> {
        self.tickets
            .iter()
            .filter(|entry| entry.owner == owner && entry.claimed_by.is_none())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Arm the SLA escalation pair for a fresh or re-adopted unclaimed
    /// ticket. Both timers ping into the ticket channel and are cancelled by
    /// claim or close, whichever comes first.
    pub fn arm_sla(&self, http: &Arc<Http>, channel_id: ChannelId) {
        let staff_delay = Duration::from_secs(self.config.sla_staff_minutes * 60);
        let admin_delay = Duration::from_secs(self.config.sla_admin_minutes * 60);

        let staff_http = Arc::clone(http);
        let staff_role = self.config.staff_role;
        let staff_minutes = self.config.sla_staff_minutes;
        self.timers.schedule(
            TimerKey::SlaStaff(channel_id),
            staff_delay,
            async move {
                let content = format!(
                    "<@&{}> ⏰ Este ticket lleva {} minutos sin atender.",
                    staff_role, staff_minutes
                );
                if let Err(e) = channel_id
                    .send_message(&staff_http, serenity::CreateMessage::new().content(content))
                    .await
                {
                    warn!("Failed to post staff SLA ping in {}: {}", channel_id, e);
                }
            },
        );

        let admin_http = Arc::clone(http);
        let admin_role = self.config.admin_role;
        let admin_minutes = self.config.sla_admin_minutes;
        self.timers.schedule(
            TimerKey::SlaAdmin(channel_id),
            admin_delay,
            async move {
                let content = format!(
                    "<@&{}> 🚨 Ticket sin reclamar después de {} minutos.",
                    admin_role, admin_minutes
                );
                if let Err(e) = channel_id
                    .send_message(&admin_http, serenity::CreateMessage::new().content(content))
                    .await
                {
                    warn!("Failed to post admin SLA ping in {}: {}", channel_id, e);
                }
            },
        );
    }

    /// Rearm the inactivity pair after qualifying owner activity. This is a
    /// debounce: scheduling under the same keys replaces the previous
    /// timers, so a flurry of messages leaves exactly one warning and one
    /// auto-close pending.
    pub fn rearm_inactivity(self: Arc<Self>, http: &Arc<Http>, channel_id: ChannelId) {
        let limit = self.config.ticket_inactivity_minutes;
        let lead = self.config.ticket_warning_minutes;
        let warning_delay = Duration::from_secs((limit - lead) * 60);
        let close_delay = Duration::from_secs(limit * 60);

        let owner = match self.get(channel_id) {
            Some(ticket) => ticket.owner,
            None => return,
        };

        let warning_http = Arc::clone(http);
        self.timers.schedule(
            TimerKey::TicketWarning(channel_id),
            warning_delay,
            async move {
                let content = format!(
                    "<@{}> ⚠️ Este ticket se cerrará en {} minutos por inactividad.",
                    owner, lead
                );
                if let Err(e) = channel_id
                    .send_message(&warning_http, serenity::CreateMessage::new().content(content))
                    .await
                {
                    warn!("Failed to post inactivity warning in {}: {}", channel_id, e);
                }
            },
        );

        let close_http = Arc::clone(http);
        let timers = Arc::clone(&self.timers);
        let manager = self;
        timers.schedule(
            TimerKey::TicketClose(channel_id),
            close_delay,
            async move {
                if let Err(e) = manager
                    .close(&close_http, channel_id, "closed automatically due to inactivity")
                    .await
                {
                    error!("Auto-close of ticket {} failed: {}", channel_id, e);
                }
            },
        );
    }

    /// Close a ticket: cancel every timer, archive the transcript, then
    /// delete the channel. Archive failure is logged and never blocks the
    /// deletion. Returns `Ok(false)` when the ticket was already closed.
    pub async fn close(
        &self,
        http: &Arc<Http>,
        channel_id: ChannelId,
        reason: &str,
    ) -> Result<bool> {
        let ticket = match self.begin_close(channel_id) {
            Some(ticket) => ticket,
            None => return Ok(false),
        };

        let (channel_name, guild_name) = fetch_names(http, channel_id).await;

        if let Err(e) = transcript::archive_channel(
            http,
            channel_id,
            &channel_name,
            &guild_name,
            reason,
            self.config.ticket_log_channel,
        )
        .await
        {
            error!("Failed to archive transcript of {}: {}", channel_name, e);
        }

        channel_id.delete(http).await?;
        info!("Closed ticket {} ({})", channel_name, reason);

        messages::post_ticket_log(
            http,
            self.config.ticket_log_channel,
            &channel_name,
            &ticket,
            reason,
        )
        .await;

        Ok(true)
    }

    /// Close every unclaimed ticket owned by a member who just got removed
    /// from the guild through the verification paths.
    pub async fn close_unclaimed_for_owner(
        &self,
        http: &Arc<Http>,
        owner: UserId,
        reason: &str,
    ) {
        for channel_id in self.unclaimed_owned_by(owner) {
            if let Err(e) = self.close(http, channel_id, reason).await {
                error!(
                    "Failed to close ticket {} of removed owner {}: {}",
                    channel_id, owner, e
                );
            }
        }
    }
}

async fn fetch_names(http: &Arc<Http>, channel_id: ChannelId) -> (String, String) {
    let guild_channel = match http.get_channel(channel_id).await {
        Ok(channel) => channel.guild(),
        Err(_) => None,
    };
    match guild_channel {
        Some(channel) => {
            let guild_name = channel
                .guild_id
                .to_partial_guild(http)
                .await
                .map(|guild| guild.name)
                .unwrap_or_else(|_| "unknown guild".to_string());
            (channel.name.clone(), guild_name)
        }
        None => (format!("ticket-{}", channel_id), "unknown guild".to_string()),
    }
}

/// Shared ticket manager type
pub type SharedTicketManager = Arc<TicketManager>;

pub fn create_shared_ticket_manager(
    config: Arc<BotConfig>,
    timers: SharedTimerManager,
) -> SharedTicketManager {
    Arc::new(TicketManager::new(config, timers))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::timer_manager::create_shared_timer_manager;
    use std::collections::HashMap;

    fn test_config() -> Arc<BotConfig> {
        let vars = HashMap::from([
            ("DISCORD_TOKEN", "token"),
            ("GUILD_ID", "100"),
            ("UNVERIFIED_ROLE_ID", "1"),
            ("VERIFY_ROLE_ID", "2"),
            ("STAFF_ROLE_ID", "3"),
            ("ADMIN_ROLE_ID", "4"),
            ("TICKET_CATEGORY_ID", "5"),
            ("VERIFY_CHANNEL_ID", "6"),
            ("VERIFY_LOG_CHANNEL_ID", "7"),
            ("TICKET_LOG_CHANNEL_ID", "8"),
            ("MC_IP", "play.example.net"),
        ]);
        Arc::new(BotConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap())
    }

    fn manager() -> SharedTicketManager {
        create_shared_ticket_manager(test_config(), create_shared_timer_manager())
    }

    fn sample_ticket(owner: u64) -> Ticket {
        Ticket::new(
            UserId::new(owner),
            TicketCategory::BugReport,
            "Steve".to_string(),
            "survival".to_string(),
        )
    }

    #[test]
    fn test_topic_round_trip() {
        let mut ticket = sample_ticket(111);
        let decoded = Ticket::decode_topic(&ticket.encode_topic()).unwrap();
        assert_eq!(decoded.owner, ticket.owner);
        assert_eq!(decoded.category, TicketCategory::BugReport);
        assert_eq!(decoded.nickname, "Steve");
        assert_eq!(decoded.game_mode, "survival");
        assert_eq!(decoded.claimed_by, None);

        ticket.claimed_by = Some(UserId::new(222));
        let decoded = Ticket::decode_topic(&ticket.encode_topic()).unwrap();
        assert_eq!(decoded.claimed_by, Some(UserId::new(222)));
    }

    #[test]
    fn test_topic_encoding_layout() {
        let ticket = sample_ticket(111);
        assert_eq!(
            ticket.encode_topic(),
            "owner:111 | nick:Steve | modalidad:survival | categoria:bug"
        );
    }

    #[test]
    fn test_decode_rejects_foreign_topics() {
        assert!(Ticket::decode_topic("General chat about the server").is_none());
        assert!(Ticket::decode_topic("").is_none());
        assert!(Ticket::decode_topic("owner:not-a-number | nick:x").is_none());
    }

    #[test]
    fn test_category_tokens() {
        for category in TicketCategory::ALL {
            assert_eq!(TicketCategory::from_str(category.as_str()), Some(category));
        }
        assert_eq!(TicketCategory::from_str("nonsense"), None);
    }

    #[tokio::test]
    async fn test_claim_is_first_claimer_wins() {
        let manager = manager();
        let channel = ChannelId::new(500);
        manager.insert(channel, sample_ticket(111));

        let claimed = manager.claim(channel, UserId::new(10)).unwrap();
        assert_eq!(claimed.claimed_by, Some(UserId::new(10)));

        let err = manager.claim(channel, UserId::new(20)).unwrap_err();
        assert!(matches!(err, BotError::AlreadyClaimed { claimed_by } if claimed_by == "10"));

        // Stored claimant is still the first one.
        assert_eq!(manager.get(channel).unwrap().claimed_by, Some(UserId::new(10)));
    }

    #[tokio::test]
    async fn test_claim_unknown_channel() {
        let manager = manager();
        assert!(matches!(
            manager.claim(ChannelId::new(999), UserId::new(1)),
            Err(BotError::UnknownTicket { .. })
        ));
    }

    #[tokio::test]
    async fn test_begin_close_is_idempotent() {
        let manager = manager();
        let channel = ChannelId::new(500);
        manager.insert(channel, sample_ticket(111));

        assert!(manager.begin_close(channel).is_some());
        assert!(manager.begin_close(channel).is_none());
        assert!(!manager.is_ticket(channel));
    }

    #[tokio::test]
    async fn test_claim_cancels_sla_timers() {
        let manager = manager();
        let channel = ChannelId::new(500);
        manager.insert(channel, sample_ticket(111));

        manager
            .timers
            .schedule(TimerKey::SlaStaff(channel), Duration::from_secs(600), async {});
        manager
            .timers
            .schedule(TimerKey::SlaAdmin(channel), Duration::from_secs(3600), async {});
        assert!(manager.timers.is_pending(TimerKey::SlaStaff(channel)));

        manager.claim(channel, UserId::new(10)).unwrap();
        assert!(!manager.timers.is_pending(TimerKey::SlaStaff(channel)));
        assert!(!manager.timers.is_pending(TimerKey::SlaAdmin(channel)));
    }

    #[tokio::test]
    async fn test_begin_close_cancels_all_timers() {
        let manager = manager();
        let channel = ChannelId::new(500);
        manager.insert(channel, sample_ticket(111));
        for timer_key in TimerKey::ticket_keys(channel) {
            manager
                .timers
                .schedule(timer_key, Duration::from_secs(600), async {});
        }

        manager.begin_close(channel).unwrap();
        assert_eq!(manager.timers.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_rearm_leaves_exactly_one_timer_pair() {
        let manager = manager();
        let channel = ChannelId::new(500);
        manager.insert(channel, sample_ticket(111));

        let http = Arc::new(Http::new("test-token"));
        for _ in 0..5 {
            manager.clone().rearm_inactivity(&http, channel);
        }

        assert!(manager.timers.is_pending(TimerKey::TicketWarning(channel)));
        assert!(manager.timers.is_pending(TimerKey::TicketClose(channel)));
        assert_eq!(manager.timers.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_rearm_on_closed_ticket_is_noop() {
        let manager = manager();
        let channel = ChannelId::new(500);
        let http = Arc::new(Http::new("test-token"));

        manager.clone().rearm_inactivity(&http, channel);
        assert_eq!(manager.timers.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unclaimed_owned_by() {
        let manager = manager();
        let owner = UserId::new(111);
        manager.insert(ChannelId::new(1), sample_ticket(111));
        manager.insert(ChannelId::new(2), sample_ticket(111));
        manager.insert(ChannelId::new(3), sample_ticket(333));

        manager.claim(ChannelId::new(2), UserId::new(10)).unwrap();

        let mut unclaimed = manager.unclaimed_owned_by(owner);
        unclaimed.sort();
        assert_eq!(unclaimed, vec![ChannelId::new(1)]);
    }

    #[test]
    fn test_non_ticket_cache() {
        let manager = manager();
        let channel = ChannelId::new(77);
        assert!(!manager.is_known_non_ticket(channel));
        manager.mark_non_ticket(channel);
        assert!(manager.is_known_non_ticket(channel));

        // Becoming a ticket clears the negative entry.
        manager.insert(channel, sample_ticket(111));
        assert!(!manager.is_known_non_ticket(channel));
    }
}
