use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::managers::TimerKey;
use crate::messages;
use crate::{Data, Error};

/// Handle when a new member joins the guild.
///
/// Three terminal outcomes from here: verified (via the challenge gate),
/// removed for being too new, or removed for missing the deadline.
pub async fn handle_member_add(
    ctx: &serenity::Context,
    new_member: &serenity::Member,
    data: &Data,
) -> Result<(), Error> {
    if new_member.user.bot {
        return Ok(());
    }

    let config = &data.config;
    let user_id = new_member.user.id;
    let guild_id = new_member.guild_id;
    info!("New member joined: {} ({})", new_member.user.name, user_id);

    // Restricted role first. Failure must not stop the screening below.
    if let Err(e) = ctx
        .http
        .add_member_role(
            guild_id,
            user_id,
            config.unverified_role,
            Some("pending verification"),
        )
        .await
    {
        warn!("Failed to assign restricted role to {}: {}", user_id, e);
    }

    let age_days = account_age_days(
        new_member.user.created_at().unix_timestamp(),
        serenity::Timestamp::now().unix_timestamp(),
    );
    if age_days < config.min_account_age_days {
        messages::post_verify_log(
            &ctx.http,
            config.verify_log_channel,
            &new_member.user.tag(),
            user_id,
            false,
            "account too new",
        )
        .await;
        if let Err(e) = guild_id
            .kick_with_reason(&ctx.http, user_id, "account too new")
            .await
        {
            error!("Failed to kick too-new account {}: {}", user_id, e);
        }
        return Ok(());
    }

    // Optional verification deadline. Fires only if the restricted role is
    // still present; verifying in time cancels the timer.
    if let Some(minutes) = config.verify_timeout_minutes {
        let http = Arc::clone(&ctx.http);
        let unverified_role = config.unverified_role;
        let verify_log = config.verify_log_channel;
        let tickets = Arc::clone(&data.tickets);
        let user_tag = new_member.user.tag();

        data.timers.schedule(
            TimerKey::VerifyDeadline(user_id),
            Duration::from_secs(minutes * 60),
            async move {
                let member = match guild_id.member(&http, user_id).await {
                    Ok(member) => member,
                    Err(_) => return, // already gone
                };
                if !member.roles.contains(&unverified_role) {
                    return;
                }
                messages::post_verify_log(
                    &http,
                    verify_log,
                    &user_tag,
                    user_id,
                    false,
                    "did not verify in time",
                )
                .await;
                if let Err(e) = guild_id
                    .kick_with_reason(&http, user_id, "did not verify in time")
                    .await
                {
                    error!("Failed to kick unverified member {}: {}", user_id, e);
                    return;
                }
                tickets
                    .close_unclaimed_for_owner(&http, user_id, "owner removed from server")
                    .await;
            },
        );
    }

    Ok(())
}

/// Drop any verification state a leaving member still holds.
pub async fn handle_member_remove(
    _ctx: &serenity::Context,
    user: &serenity::User,
    data: &Data,
) -> Result<(), Error> {
    data.verification.clear(user.id);
    data.timers.cancel(TimerKey::VerifyDeadline(user.id));
    Ok(())
}

fn account_age_days(created_at_secs: i64, now_secs: i64) -> u64 {
    (now_secs.saturating_sub(created_at_secs).max(0) / 86_400) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    #[test]
    fn test_account_age_days() {
        assert_eq!(account_age_days(0, DAY), 1);
        assert_eq!(account_age_days(0, 3 * DAY - 1), 2);
        assert_eq!(account_age_days(0, 3 * DAY), 3);
        // A clock that reads before the creation time never counts negative.
        assert_eq!(account_age_days(DAY, 0), 0);
    }

    #[test]
    fn test_one_day_old_account_is_below_minimum() {
        let age = account_age_days(0, DAY);
        assert!(age < 3, "a 1-day-old account fails a 3-day minimum");
    }
}
