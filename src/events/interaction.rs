//! Button and modal dispatch for the verification gate and ticket flows.
//!
//! Every branch either succeeds visibly or replies with a short reason;
//! only secondary side effects (role mutations, log posts) are allowed to
//! fail silently into the log.

use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::error::BotError;
use crate::managers::{SubmitOutcome, Ticket, TicketCategory, TimerKey};
use crate::messages::{self, base_embed};
use crate::{Data, Error};

pub async fn handle_interaction(
    ctx: &serenity::Context,
    interaction: &serenity::Interaction,
    data: &Data,
) -> Result<(), Error> {
    match interaction {
        serenity::Interaction::Component(component) => {
            handle_component(ctx, component, data).await
        }
        serenity::Interaction::Modal(modal) => handle_modal(ctx, modal, data).await,
        _ => Ok(()),
    }
}

/// Last-resort acknowledgment after a component/modal handler error, so the
/// interaction never ends up permanently unacknowledged. Best-effort: if the
/// handler already responded before failing, this fails silently.
pub async fn notify_interaction_failure(
    ctx: &serenity::Context,
    interaction: &serenity::Interaction,
) {
    let response = serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content("❌ Ocurrió un error. Inténtalo de nuevo.")
            .ephemeral(true),
    );
    let result = match interaction {
        serenity::Interaction::Component(component) => {
            component.create_response(&ctx.http, response).await
        }
        serenity::Interaction::Modal(modal) => modal.create_response(&ctx.http, response).await,
        _ => return,
    };
    if let Err(e) = result {
        debug!("Interaction already acknowledged or gone: {}", e);
    }
}

async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let custom_id = component.data.custom_id.as_str();

    if custom_id == "start_verify" {
        return start_verify(ctx, component, data).await;
    }
    if let Some(raw) = custom_id.strip_prefix("captcha_") {
        return grade_captcha(ctx, component, data, raw).await;
    }
    if custom_id == "ticket_claim" {
        return claim_ticket(ctx, component, data).await;
    }
    if custom_id == "ticket_close" {
        return close_ticket(ctx, component, data).await;
    }
    if let Some(token) = custom_id.strip_prefix("ticket_") {
        if let Some(category) = TicketCategory::from_str(token) {
            return open_ticket_modal(ctx, component, category).await;
        }
    }

    Ok(())
}

async fn start_verify(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let prompt = match data.verification.start_challenge(component.user.id) {
        Ok(prompt) => prompt,
        Err(BotError::RateLimited { retry_after_secs }) => {
            return reply_ephemeral(
                ctx,
                component,
                format!("⏳ Espera {} segundos antes de volver a intentarlo.", retry_after_secs),
            )
            .await;
        }
        Err(e) => return Err(e.into()),
    };

    let buttons = prompt
        .choices
        .iter()
        .map(|choice| {
            serenity::CreateButton::new(format!("captcha_{}", choice))
                .label(choice.to_string())
                .style(serenity::ButtonStyle::Secondary)
        })
        .collect();

    let response = serenity::CreateInteractionResponseMessage::new()
        .embed(
            base_embed()
                .title("🔐 Verificación")
                .description(&prompt.question),
        )
        .components(vec![serenity::CreateActionRow::Buttons(buttons)])
        .ephemeral(true);
    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(response),
        )
        .await?;
    Ok(())
}

async fn grade_captcha(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
    raw_choice: &str,
) -> Result<(), Error> {
    let choice: u8 = match raw_choice.parse() {
        Ok(choice) => choice,
        Err(_) => {
            return reply_ephemeral(ctx, component, "Captcha inválido.").await;
        }
    };

    let user_id = component.user.id;
    match data.verification.submit_answer(user_id, choice) {
        Err(BotError::NoChallenge { .. }) => {
            reply_ephemeral(ctx, component, "Captcha inválido. Pulsa «Verificarme» para empezar.")
                .await
        }
        Err(BotError::Expired { .. }) => {
            reply_ephemeral(
                ctx,
                component,
                "Captcha expirado. Pulsa «Verificarme» para intentarlo de nuevo.",
            )
            .await
        }
        Err(e) => Err(e.into()),
        Ok(SubmitOutcome::Retry { attempts_left }) => {
            reply_ephemeral(
                ctx,
                component,
                format!("❌ Incorrecto. Te quedan {} intentos.", attempts_left),
            )
            .await
        }
        Ok(SubmitOutcome::Admit) => admit_member(ctx, component, data).await,
        Ok(SubmitOutcome::RejectAndRemove) => reject_member(ctx, component, data).await,
    }
}

async fn admit_member(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let config = &data.config;
    let user_id = component.user.id;
    let guild_id = match component.guild_id {
        Some(guild_id) => guild_id,
        None => return Ok(()),
    };

    // Role swap is best-effort; the gate decision already committed.
    if let Err(e) = ctx
        .http
        .remove_member_role(guild_id, user_id, config.unverified_role, Some("verified"))
        .await
    {
        warn!("Failed to remove restricted role from {}: {}", user_id, e);
    }
    if let Err(e) = ctx
        .http
        .add_member_role(guild_id, user_id, config.verified_role, Some("verified"))
        .await
    {
        warn!("Failed to add verified role to {}: {}", user_id, e);
    }

    data.timers.cancel(TimerKey::VerifyDeadline(user_id));
    messages::post_verify_log(
        &ctx.http,
        config.verify_log_channel,
        &component.user.tag(),
        user_id,
        true,
        "verified",
    )
    .await;

    reply_ephemeral(ctx, component, "✅ Verificación completada.").await
}

async fn reject_member(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let config = &data.config;
    let user_id = component.user.id;

    // Reply before the kick lands, or there is nobody left to reply to.
    // Best-effort: a failed acknowledgment must not stop the removal.
    let _ = reply_ephemeral(ctx, component, "❌ Verificación fallida.").await;

    messages::post_verify_log(
        &ctx.http,
        config.verify_log_channel,
        &component.user.tag(),
        user_id,
        false,
        "failed challenge",
    )
    .await;

    if let Some(guild_id) = component.guild_id {
        if let Err(e) = guild_id
            .kick_with_reason(&ctx.http, user_id, "failed challenge")
            .await
        {
            error!("Failed to kick {} after failed challenge: {}", user_id, e);
            return Ok(());
        }
        data.tickets
            .close_unclaimed_for_owner(&ctx.http, user_id, "owner removed from server")
            .await;
    }
    Ok(())
}

async fn open_ticket_modal(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    category: TicketCategory,
) -> Result<(), Error> {
    let modal = serenity::CreateModal::new(
        format!("ticket_modal_{}", category.as_str()),
        format!("Nuevo ticket — {}", category.label()),
    )
    .components(vec![
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Tu nick en el juego",
                "nick",
            )
            .placeholder("Steve")
            .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Modalidad",
                "modalidad",
            )
            .placeholder("survival, skyblock…")
            .required(true),
        ),
    ]);

    component
        .create_response(&ctx.http, serenity::CreateInteractionResponse::Modal(modal))
        .await?;
    Ok(())
}

async fn handle_modal(
    ctx: &serenity::Context,
    modal: &serenity::ModalInteraction,
    data: &Data,
) -> Result<(), Error> {
    let category = match modal
        .data
        .custom_id
        .strip_prefix("ticket_modal_")
        .and_then(TicketCategory::from_str)
    {
        Some(category) => category,
        None => return Ok(()),
    };
    let guild_id = match modal.guild_id {
        Some(guild_id) => guild_id,
        None => return Ok(()),
    };
    let config = &data.config;
    let owner = modal.user.id;

    let nickname = modal_field(modal, "nick").unwrap_or_else(|| modal.user.name.clone());
    let game_mode = modal_field(modal, "modalidad").unwrap_or_else(|| "-".to_string());
    let ticket = Ticket::new(owner, category, nickname, game_mode);

    let everyone = serenity::RoleId::new(guild_id.get());
    let member_access = serenity::Permissions::VIEW_CHANNEL
        | serenity::Permissions::SEND_MESSAGES
        | serenity::Permissions::READ_MESSAGE_HISTORY;
    let overwrites = vec![
        serenity::PermissionOverwrite {
            allow: serenity::Permissions::empty(),
            deny: serenity::Permissions::VIEW_CHANNEL,
            kind: serenity::PermissionOverwriteType::Role(everyone),
        },
        serenity::PermissionOverwrite {
            allow: member_access,
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Member(owner),
        },
        serenity::PermissionOverwrite {
            allow: member_access,
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Role(config.staff_role),
        },
    ];

    let name = format!("ticket-{}-{}", category.as_str(), channel_slug(&modal.user.name));
    let builder = serenity::CreateChannel::new(name)
        .kind(serenity::ChannelType::Text)
        .category(config.ticket_category)
        .topic(ticket.encode_topic())
        .permissions(overwrites);

    let channel = match guild_id.create_channel(&ctx.http, builder).await {
        Ok(channel) => channel,
        Err(e) => {
            error!("Failed to create ticket channel for {}: {}", owner, e);
            return reply_modal_ephemeral(
                ctx,
                modal,
                "❌ No se pudo crear el ticket. Inténtalo más tarde.",
            )
            .await;
        }
    };

    data.tickets.insert(channel.id, ticket.clone());
    data.tickets.arm_sla(&ctx.http, channel.id);
    data.tickets.clone().rearm_inactivity(&ctx.http, channel.id);

    let actions = serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("ticket_claim")
            .label("Reclamar")
            .style(serenity::ButtonStyle::Primary),
        serenity::CreateButton::new("ticket_close")
            .label("Cerrar")
            .style(serenity::ButtonStyle::Danger),
    ]);
    let opening = serenity::CreateMessage::new()
        .content(format!(
            "<@&{}> Nuevo ticket de <@{}>",
            config.staff_role, owner
        ))
        .embed(
            base_embed()
                .title(format!("🎫 {}", category.label()))
                .field("Nick", &ticket.nickname, true)
                .field("Modalidad", &ticket.game_mode, true)
                .description("Describe tu problema; el staff te atenderá pronto."),
        )
        .components(vec![actions]);
    if let Err(e) = channel.id.send_message(&ctx.http, opening).await {
        warn!("Failed to post opening notice in {}: {}", channel.id, e);
    }

    info!(
        "Ticket {} opened by {} in category {}",
        channel.id,
        owner,
        category.as_str()
    );
    reply_modal_ephemeral(ctx, modal, format!("🎫 Ticket creado: <#{}>", channel.id)).await
}

async fn claim_ticket(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let channel_id = component.channel_id;
    if super::resolve_ticket(ctx, data, channel_id).await.is_none() {
        return reply_ephemeral(ctx, component, "Este canal no es un ticket.").await;
    }

    let staff_check = component
        .member
        .as_ref()
        .map_or(false, |member| is_staff(member, &data.config));
    if !staff_check {
        return reply_ephemeral(ctx, component, "❌ Solo el staff puede reclamar tickets.").await;
    }

    match data.tickets.claim(channel_id, component.user.id) {
        Ok(ticket) => {
            // Mirror the claim into the topic so it survives restarts.
            if let Err(e) = channel_id
                .edit(
                    &ctx.http,
                    serenity::EditChannel::new().topic(ticket.encode_topic()),
                )
                .await
            {
                warn!("Failed to update topic of {}: {}", channel_id, e);
            }
            let response = serenity::CreateInteractionResponseMessage::new()
                .content(format!("🙋 Ticket reclamado por <@{}>.", component.user.id));
            component
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::Message(response),
                )
                .await?;
            Ok(())
        }
        Err(BotError::AlreadyClaimed { claimed_by }) => {
            reply_ephemeral(
                ctx,
                component,
                format!("⚠️ Este ticket ya fue reclamado por <@{}>.", claimed_by),
            )
            .await
        }
        Err(BotError::UnknownTicket { .. }) => {
            reply_ephemeral(ctx, component, "Este canal no es un ticket.").await
        }
        Err(e) => Err(e.into()),
    }
}

async fn close_ticket(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let channel_id = component.channel_id;
    let ticket = match super::resolve_ticket(ctx, data, channel_id).await {
        Some(ticket) => ticket,
        None => {
            return reply_ephemeral(ctx, component, "Este canal no es un ticket.").await;
        }
    };

    let is_owner = ticket.owner == component.user.id;
    let staff_check = component
        .member
        .as_ref()
        .map_or(false, |member| is_staff(member, &data.config));
    if !is_owner && !staff_check {
        return reply_ephemeral(
            ctx,
            component,
            "❌ Solo el dueño del ticket o el staff pueden cerrarlo.",
        )
        .await;
    }

    // Acknowledge before the channel disappears underneath the interaction.
    // Best-effort: the close must run even if the acknowledgment fails.
    let _ = reply_ephemeral(ctx, component, "🔒 Cerrando ticket…").await;

    let reason = format!("closed by {}", component.user.tag());
    match data.tickets.close(&ctx.http, channel_id, &reason).await {
        Ok(true) => {}
        Ok(false) => {
            info!("Ticket {} was already closing, ignoring duplicate close", channel_id);
        }
        Err(e) => {
            error!("Failed to close ticket {}: {}", channel_id, e);
        }
    }
    Ok(())
}

fn is_staff(member: &serenity::Member, config: &BotConfig) -> bool {
    member.roles.contains(&config.staff_role)
        || member.roles.contains(&config.admin_role)
        || member
            .permissions
            .map_or(false, |permissions| permissions.administrator())
}

fn modal_field(modal: &serenity::ModalInteraction, custom_id: &str) -> Option<String> {
    for row in &modal.data.components {
        for component in &row.components {
            if let serenity::ActionRowComponent::InputText(input) = component {
                if input.custom_id == custom_id {
                    return input
                        .value
                        .as_deref()
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .map(str::to_string);
                }
            }
        }
    }
    None
}

/// Lowercase a display name into something Discord accepts in a channel name.
fn channel_slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                Some(c)
            } else if c == ' ' || c == '-' || c == '_' || c == '.' {
                Some('-')
            } else {
                None
            }
        })
        .collect();
    let trimmed: String = slug.trim_matches('-').chars().take(32).collect();
    if trimmed.is_empty() {
        "usuario".to_string()
    } else {
        trimmed
    }
}

async fn reply_ephemeral(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    content: impl Into<String>,
) -> Result<(), Error> {
    let response = serenity::CreateInteractionResponseMessage::new()
        .content(content)
        .ephemeral(true);
    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(response),
        )
        .await?;
    Ok(())
}

async fn reply_modal_ephemeral(
    ctx: &serenity::Context,
    modal: &serenity::ModalInteraction,
    content: impl Into<String>,
) -> Result<(), Error> {
    let response = serenity::CreateInteractionResponseMessage::new()
        .content(content)
        .ephemeral(true);
    modal
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(response),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_slug() {
        assert_eq!(channel_slug("Steve"), "steve");
        assert_eq!(channel_slug("El Pro.123"), "el-pro-123");
        assert_eq!(channel_slug("ñandú"), "and");
        assert_eq!(channel_slug("!!!"), "usuario");
    }
}
