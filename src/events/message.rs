use poise::serenity_prelude as serenity;
use tracing::debug;

use crate::{Data, Error};

/// Handle incoming messages.
///
/// The only message-driven behavior is the inactivity debounce: a message
/// from the ticket owner rearms the warning/auto-close pair to their full
/// durations. Staff and bystander messages don't touch the timers.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if msg.author.bot || msg.guild_id.is_none() {
        return Ok(());
    }

    let channel_id = msg.channel_id;
    let ticket = match super::resolve_ticket(ctx, data, channel_id).await {
        Some(ticket) => ticket,
        None => return Ok(()),
    };

    if ticket.owner == msg.author.id {
        data.tickets.clone().rearm_inactivity(&ctx.http, channel_id);
        debug!("Owner activity in ticket {}, timers rearmed", channel_id);
    }

    Ok(())
}
