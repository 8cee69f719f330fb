use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Missing environment variable '{name}'")]
    ConfigMissing { name: String },

    #[error("Invalid value for '{name}': {message}")]
    ConfigInvalid { name: String, message: String },

    // Verification errors
    #[error("Verification rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("No active challenge for user {user_id}")]
    NoChallenge { user_id: String },

    #[error("Challenge expired for user {user_id}")]
    Expired { user_id: String },

    // Ticket errors
    #[error("Ticket already claimed by {claimed_by}")]
    AlreadyClaimed { claimed_by: String },

    #[error("No ticket associated with channel {channel_id}")]
    UnknownTicket { channel_id: String },

    // Permission errors
    #[error("Permission denied: {message}")]
    Unauthorized { message: String },

    // Game server query errors
    #[error("Game server query failed: {message}")]
    RemoteQueryFailed { message: String },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use poise::serenity_prelude as serenity;
