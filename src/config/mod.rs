//! Environment-backed configuration.
//!
//! Everything is read once at startup and kept immutable for the process
//! lifetime. Numeric policy knobs all have documented defaults and stay
//! tunable; none of them are hardcoded elsewhere in the bot.

use poise::serenity_prelude::{ChannelId, GuildId, RoleId};
use tracing::info;

use crate::error::{BotError, Result};

/// Immutable bot configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub guild_id: GuildId,

    // Roles
    pub unverified_role: RoleId,
    pub verified_role: RoleId,
    pub staff_role: RoleId,
    pub admin_role: RoleId,

    // Channels
    pub ticket_category: ChannelId,
    pub verify_channel: ChannelId,
    pub verify_log_channel: ChannelId,
    pub ticket_log_channel: ChannelId,

    // Membership screening
    pub min_account_age_days: u64,
    /// Minutes before an unverified member is kicked. `None` disables the
    /// deadline entirely (0 or unset in the environment).
    pub verify_timeout_minutes: Option<u64>,

    // Challenge policy
    pub verify_cooldown_seconds: u64,
    pub captcha_expire_seconds: u64,
    pub captcha_max_attempts: u32,

    // Ticket policy
    pub ticket_inactivity_minutes: u64,
    /// Lead time of the inactivity warning before the auto-close fires.
    pub ticket_warning_minutes: u64,
    pub sla_staff_minutes: u64,
    pub sla_admin_minutes: u64,

    // Game server
    pub mc_host: String,
    pub mc_port: u16,
}

impl BotConfig {
    /// Read and validate the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        info!(
            "Config loaded: guild={}, inactivity={}m (warning lead {}m), sla={}m/{}m, verify timeout={:?}",
            config.guild_id,
            config.ticket_inactivity_minutes,
            config.ticket_warning_minutes,
            config.sla_staff_minutes,
            config.sla_admin_minutes,
            config.verify_timeout_minutes,
        );
        Ok(config)
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            token: required(&lookup, "DISCORD_TOKEN")?,
            guild_id: GuildId::new(required_id(&lookup, "GUILD_ID")?),

            unverified_role: RoleId::new(required_id(&lookup, "UNVERIFIED_ROLE_ID")?),
            verified_role: RoleId::new(required_id(&lookup, "VERIFY_ROLE_ID")?),
            staff_role: RoleId::new(required_id(&lookup, "STAFF_ROLE_ID")?),
            admin_role: RoleId::new(required_id(&lookup, "ADMIN_ROLE_ID")?),

            ticket_category: ChannelId::new(required_id(&lookup, "TICKET_CATEGORY_ID")?),
            verify_channel: ChannelId::new(required_id(&lookup, "VERIFY_CHANNEL_ID")?),
            verify_log_channel: ChannelId::new(required_id(&lookup, "VERIFY_LOG_CHANNEL_ID")?),
            ticket_log_channel: ChannelId::new(required_id(&lookup, "TICKET_LOG_CHANNEL_ID")?),

            min_account_age_days: numeric_or(&lookup, "MIN_ACCOUNT_AGE_DAYS", 3)?,
            verify_timeout_minutes: optional_minutes(&lookup, "VERIFY_TIMEOUT_MINUTES")?,

            verify_cooldown_seconds: numeric_or(&lookup, "VERIFY_COOLDOWN_SECONDS", 60)?,
            captcha_expire_seconds: numeric_or(&lookup, "CAPTCHA_EXPIRE_SECONDS", 120)?,
            captcha_max_attempts: numeric_or(&lookup, "CAPTCHA_MAX_ATTEMPTS", 3)? as u32,

            ticket_inactivity_minutes: numeric_or(&lookup, "TICKET_INACTIVITY_MINUTES", 30)?,
            ticket_warning_minutes: numeric_or(&lookup, "TICKET_WARNING_MINUTES", 5)?,
            sla_staff_minutes: numeric_or(&lookup, "SLA_STAFF_MINUTES", 15)?,
            sla_admin_minutes: numeric_or(&lookup, "SLA_ADMIN_MINUTES", 60)?,

            mc_host: required(&lookup, "MC_IP")?,
            mc_port: parse_port(&lookup, "MC_PORT", 25565)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.captcha_max_attempts == 0 {
            return Err(BotError::ConfigInvalid {
                name: "CAPTCHA_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.ticket_warning_minutes >= self.ticket_inactivity_minutes {
            return Err(BotError::ConfigInvalid {
                name: "TICKET_WARNING_MINUTES".to_string(),
                message: format!(
                    "warning lead ({}) must be shorter than the inactivity limit ({})",
                    self.ticket_warning_minutes, self.ticket_inactivity_minutes
                ),
            });
        }
        if self.sla_staff_minutes >= self.sla_admin_minutes {
            return Err(BotError::ConfigInvalid {
                name: "SLA_STAFF_MINUTES".to_string(),
                message: format!(
                    "staff SLA ({}) must come before the admin SLA ({})",
                    self.sla_staff_minutes, self.sla_admin_minutes
                ),
            });
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BotError::ConfigMissing {
            name: name.to_string(),
        }),
    }
}

fn required_id<F>(lookup: &F, name: &str) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = required(lookup, name)?;
    raw.trim().parse::<u64>().map_err(|e| BotError::ConfigInvalid {
        name: name.to_string(),
        message: format!("expected a Discord snowflake: {}", e),
    })
}

fn numeric_or<F>(lookup: &F, name: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| BotError::ConfigInvalid {
            name: name.to_string(),
            message: format!("expected a number: {}", e),
        }),
    }
}

/// Minutes knob where 0 or unset means "disabled".
fn optional_minutes<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match numeric_or(lookup, name, 0)? {
        0 => Ok(None),
        minutes => Ok(Some(minutes)),
    }
}

fn parse_port<F>(lookup: &F, name: &str, default: u16) -> Result<u16>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u16>().map_err(|e| BotError::ConfigInvalid {
            name: name.to_string(),
            message: format!("expected a port number: {}", e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
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
        ])
    }

    fn config_from(vars: HashMap<&'static str, &'static str>) -> Result<BotConfig> {
        BotConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = config_from(base_vars()).unwrap();
        assert_eq!(config.min_account_age_days, 3);
        assert_eq!(config.verify_cooldown_seconds, 60);
        assert_eq!(config.captcha_expire_seconds, 120);
        assert_eq!(config.captcha_max_attempts, 3);
        assert_eq!(config.ticket_inactivity_minutes, 30);
        assert_eq!(config.ticket_warning_minutes, 5);
        assert_eq!(config.sla_staff_minutes, 15);
        assert_eq!(config.sla_admin_minutes, 60);
        assert_eq!(config.mc_port, 25565);
        assert_eq!(config.verify_timeout_minutes, None);
    }

    #[test]
    fn test_missing_required_var() {
        let mut vars = base_vars();
        vars.remove("DISCORD_TOKEN");
        assert!(matches!(
            config_from(vars),
            Err(BotError::ConfigMissing { name }) if name == "DISCORD_TOKEN"
        ));
    }

    #[test]
    fn test_invalid_snowflake() {
        let mut vars = base_vars();
        vars.insert("GUILD_ID", "not-a-number");
        assert!(matches!(
            config_from(vars),
            Err(BotError::ConfigInvalid { name, .. }) if name == "GUILD_ID"
        ));
    }

    #[test]
    fn test_verify_timeout_zero_disables() {
        let mut vars = base_vars();
        vars.insert("VERIFY_TIMEOUT_MINUTES", "0");
        assert_eq!(config_from(vars).unwrap().verify_timeout_minutes, None);

        let mut vars = base_vars();
        vars.insert("VERIFY_TIMEOUT_MINUTES", "10");
        assert_eq!(config_from(vars).unwrap().verify_timeout_minutes, Some(10));
    }

    #[test]
    fn test_warning_must_lead_inactivity() {
        let mut vars = base_vars();
        vars.insert("TICKET_INACTIVITY_MINUTES", "5");
        vars.insert("TICKET_WARNING_MINUTES", "5");
        assert!(matches!(
            config_from(vars),
            Err(BotError::ConfigInvalid { name, .. }) if name == "TICKET_WARNING_MINUTES"
        ));
    }

    #[test]
    fn test_sla_ordering_enforced() {
        let mut vars = base_vars();
        vars.insert("SLA_STAFF_MINUTES", "60");
        vars.insert("SLA_ADMIN_MINUTES", "30");
        assert!(config_from(vars).is_err());
    }
}
