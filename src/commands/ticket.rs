use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::error::BotError;
use crate::managers::TicketCategory;
use crate::messages::base_embed;
use crate::{Context, Error};

/// Abrir un ticket de soporte
#[poise::command(slash_command, guild_only)]
pub async fn ticket(ctx: Context<'_>) -> Result<(), Error> {
    let buttons = TicketCategory::ALL
        .iter()
        .map(|category| {
            serenity::CreateButton::new(format!("ticket_{}", category.as_str()))
                .label(category.label())
                .style(serenity::ButtonStyle::Primary)
        })
        .collect();

    ctx.send(
        poise::CreateReply::default()
            .embed(
                base_embed()
                    .title("🎫 Tickets de soporte")
                    .description("Elige una categoría para abrir un ticket."),
            )
            .components(vec![serenity::CreateActionRow::Buttons(buttons)]),
    )
    .await?;
    Ok(())
}

/// Publicar un anuncio (solo staff)
#[poise::command(slash_command, guild_only)]
pub async fn embed(
    ctx: Context<'_>,
    #[description = "Título del anuncio"] titulo: String,
    #[description = "Texto del anuncio"] texto: String,
) -> Result<(), Error> {
    let config = &ctx.data().config;
    let is_staff = match ctx.author_member().await {
        Some(member) => {
            member.roles.contains(&config.staff_role)
                || member.roles.contains(&config.admin_role)
                || member
                    .permissions
                    .map_or(false, |permissions| permissions.administrator())
        }
        None => false,
    };

    if !is_staff {
        warn!(
            "{}",
            BotError::Unauthorized {
                message: format!("{} tried to post an announcement", ctx.author().name),
            }
        );
        ctx.send(
            poise::CreateReply::default()
                .content("❌ Solo el staff puede publicar anuncios.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    ctx.channel_id()
        .send_message(
            ctx.http(),
            serenity::CreateMessage::new().embed(base_embed().title(titulo).description(texto)),
        )
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content("✅ Anuncio publicado.")
            .ephemeral(true),
    )
    .await?;

    info!("Announcement posted by {}", ctx.author().name);
    Ok(())
}
