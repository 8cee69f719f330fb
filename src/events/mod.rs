pub mod guild;
pub mod interaction;
pub mod message;

pub use guild::{handle_member_add, handle_member_remove};
pub use interaction::{handle_interaction, notify_interaction_failure};
pub use message::handle_message;

use poise::serenity_prelude as serenity;

use crate::managers::Ticket;
use crate::Data;

/// Resolve a channel to its ticket, re-adopting from topic metadata when the
/// in-memory state was lost to a restart. Channels that turn out not to be
/// tickets are negatively cached so they are fetched at most once.
pub(crate) async fn resolve_ticket(
    ctx: &serenity::Context,
    data: &Data,
    channel_id: serenity::ChannelId,
) -> Option<Ticket> {
    if let Some(ticket) = data.tickets.get(channel_id) {
        return Some(ticket);
    }
    if data.tickets.is_known_non_ticket(channel_id) {
        return None;
    }

    let channel = ctx.http.get_channel(channel_id).await.ok()?.guild()?;
    if channel.parent_id != Some(data.config.ticket_category) {
        data.tickets.mark_non_ticket(channel_id);
        return None;
    }

    let ticket = match channel.topic.as_deref().and_then(Ticket::decode_topic) {
        Some(ticket) => ticket,
        None => {
            data.tickets.mark_non_ticket(channel_id);
            return None;
        }
    };

    data.tickets.adopt(channel_id, ticket.clone());
    data.tickets.clone().rearm_inactivity(&ctx.http, channel_id);
    if ticket.claimed_by.is_none() {
        data.tickets.arm_sla(&ctx.http, channel_id);
    }
    Some(ticket)
}
