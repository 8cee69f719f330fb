use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::error::BotError;
use crate::messages::base_embed;
use crate::{Context, Error};

/// Publicar el panel de verificación (solo administradores)
#[poise::command(slash_command, guild_only)]
pub async fn verificacion(ctx: Context<'_>) -> Result<(), Error> {
    let is_admin = ctx
        .author_member()
        .await
        .and_then(|member| member.permissions)
        .map_or(false, |permissions| permissions.administrator());

    if !is_admin {
        warn!(
            "{}",
            BotError::Unauthorized {
                message: format!("{} tried to post the verification panel", ctx.author().name),
            }
        );
        ctx.send(
            poise::CreateReply::default()
                .content("❌ Solo administradores pueden publicar el panel.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    if ctx.channel_id() != ctx.data().config.verify_channel {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ Canal incorrecto: usa el canal de verificación.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let row = serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new("start_verify")
        .label("Verificarme")
        .style(serenity::ButtonStyle::Success)]);

    ctx.send(
        poise::CreateReply::default()
            .embed(
                base_embed()
                    .title("🔐 Verificación")
                    .description("Pulsa el botón para verificarte."),
            )
            .components(vec![row]),
    )
    .await?;

    info!("Verification panel posted by {}", ctx.author().name);
    Ok(())
}
