use tracing::warn;

use crate::{Context, Error};

/// Estado del servidor
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    match ctx.data().query.status().await {
        Ok(status) => {
            ctx.say(format!("🟢 Online {}/{}", status.online, status.max))
                .await?;
        }
        Err(e) => {
            warn!("Status query failed: {}", e);
            ctx.say("🔴 No se pudo consultar el servidor.").await?;
        }
    }
    Ok(())
}

/// Jugadores conectados
#[poise::command(slash_command, guild_only)]
pub async fn players(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    match ctx.data().query.status().await {
        Ok(status) if status.players.is_empty() => {
            ctx.say("No hay jugadores conectados.").await?;
        }
        Ok(status) => {
            ctx.say(status.players.join(", ")).await?;
        }
        Err(e) => {
            warn!("Players query failed: {}", e);
            ctx.say("🔴 No se pudo consultar el servidor.").await?;
        }
    }
    Ok(())
}

/// IP del servidor
#[poise::command(slash_command, guild_only)]
pub async fn ip(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(format!("🌐 {}", ctx.data().query.host())).await?;
    Ok(())
}

/// Versión del servidor
#[poise::command(slash_command, guild_only)]
pub async fn version(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    match ctx.data().query.status().await {
        Ok(status) => {
            ctx.say(format!("📦 {}", status.version)).await?;
        }
        Err(e) => {
            warn!("Version query failed: {}", e);
            ctx.say("🔴 No se pudo consultar el servidor.").await?;
        }
    }
    Ok(())
}
