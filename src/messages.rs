// src/messages.rs
//
// Embed builders and best-effort audit posting. Log-channel writes never
// propagate failure into the calling handler.

use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{ChannelId, Http, UserId};
use tracing::warn;

use crate::managers::Ticket;

const BRAND_COLOR: u32 = 0xfacc15;
const SUCCESS_COLOR: u32 = 0x22c55e;
const FAILURE_COLOR: u32 = 0xef4444;

/// Base embed shared by all member-facing panels.
pub fn base_embed() -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .color(BRAND_COLOR)
        .footer(serenity::CreateEmbedFooter::new("UnionCraft • Soporte"))
        .timestamp(serenity::Timestamp::now())
}

/// Audit embed for the verification log channel.
pub fn verify_log_embed(
    user_tag: &str,
    user_id: UserId,
    success: bool,
    reason: &str,
) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .color(if success { SUCCESS_COLOR } else { FAILURE_COLOR })
        .title(if success {
            "✅ Verificación Exitosa"
        } else {
            "❌ Verificación Fallida"
        })
        .field("Usuario", user_tag, true)
        .field("ID", user_id.to_string(), true)
        .field("Motivo", reason, false)
        .timestamp(serenity::Timestamp::now())
}

/// Audit embed for the ticket log channel.
pub fn ticket_log_embed(channel_name: &str, ticket: &Ticket, reason: &str) -> serenity::CreateEmbed {
    let claimed = ticket
        .claimed_by
        .map(|staff| format!("<@{}>", staff))
        .unwrap_or_else(|| "sin reclamar".to_string());
    serenity::CreateEmbed::new()
        .color(BRAND_COLOR)
        .title("🎫 Ticket cerrado")
        .field("Canal", format!("#{}", channel_name), true)
        .field("Categoría", ticket.category.label(), true)
        .field("Dueño", format!("<@{}>", ticket.owner), true)
        .field("Atendido por", claimed, true)
        .field("Abierto", format!("<t:{}:R>", ticket.created_at_ms / 1000), true)
        .field("Motivo", reason, false)
        .timestamp(serenity::Timestamp::now())
}

/// Post an audit embed to a log channel. Best-effort: failures are logged
/// and swallowed so they never block the primary operation.
pub async fn post_log(http: &Http, channel_id: ChannelId, embed: serenity::CreateEmbed) {
    if let Err(e) = channel_id
        .send_message(http, serenity::CreateMessage::new().embed(embed))
        .await
    {
        warn!("Failed to post log entry to {}: {}", channel_id, e);
    }
}

/// Record a verification outcome in the verify-log channel.
pub async fn post_verify_log(
    http: &Http,
    channel_id: ChannelId,
    user_tag: &str,
    user_id: UserId,
    success: bool,
    reason: &str,
) {
    post_log(
        http,
        channel_id,
        verify_log_embed(user_tag, user_id, success, reason),
    )
    .await;
}

/// Record a ticket closure in the ticket-log channel.
pub async fn post_ticket_log(
    http: &Http,
    channel_id: ChannelId,
    channel_name: &str,
    ticket: &Ticket,
    reason: &str,
) {
    post_log(
        http,
        channel_id,
        ticket_log_embed(channel_name, ticket, reason),
    )
    .await;
}
