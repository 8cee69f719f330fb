//! Arithmetic challenge gate for new members.
//!
//! Deliberately weak: two small integers and a button row. It keeps naive
//! join-bots out, nothing more. The cooldown and one-challenge-per-user
//! rules exist to stop button spam, not to harden the puzzle.

use dashmap::DashMap;
use poise::serenity_prelude::UserId;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::error::{BotError, Result};

/// A live challenge for one user.
#[derive(Debug, Clone)]
struct Challenge {
    expected: u8,
    attempts: u32,
    expires_at_ms: u64,
}

/// Prompt handed back to the caller for rendering.
#[derive(Debug, Clone)]
pub struct ChallengePrompt {
    /// Human-readable question, e.g. `3 + 4 = ?`.
    pub question: String,
    /// Candidate answers, shuffled, exactly one of them correct.
    pub choices: Vec<u8>,
}

/// Outcome of grading a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Correct answer. Caller swaps restricted -> verified roles and logs it.
    Admit,
    /// Wrong answer, attempts remain.
    Retry { attempts_left: u32 },
    /// Wrong answer, attempts exhausted. Caller removes the member.
    RejectAndRemove,
}

enum Grade {
    Expired,
    Correct,
    Wrong { attempts_left: u32 },
    Exhausted,
}

/// Issues and grades one-time arithmetic challenges.
pub struct VerificationManager {
    challenges: DashMap<UserId, Challenge>,
    /// Last challenge start per user, unix millis.
    cooldowns: DashMap<UserId, u64>,
    cooldown_ms: u64,
    expire_ms: u64,
    max_attempts: u32,
}

impl VerificationManager {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            challenges: DashMap::new(),
            cooldowns: DashMap::new(),
            cooldown_ms: config.verify_cooldown_seconds * 1000,
            expire_ms: config.captcha_expire_seconds * 1000,
            max_attempts: config.captcha_max_attempts,
        }
    }

    /// Start a fresh challenge for `user_id`.
    ///
    /// Fails with [`BotError::RateLimited`] inside the cooldown window.
    /// Starting a new challenge replaces any outstanding one.
    pub fn start_challenge(&self, user_id: UserId) -> Result<ChallengePrompt> {
        self.start_challenge_at(user_id, now_ms(), &mut rand::thread_rng())
    }

    fn start_challenge_at<R: Rng>(
        &self,
        user_id: UserId,
        now_ms: u64,
        rng: &mut R,
    ) -> Result<ChallengePrompt> {
        if let Some(last) = self.cooldowns.get(&user_id) {
            let elapsed = now_ms.saturating_sub(*last);
            if elapsed < self.cooldown_ms {
                return Err(BotError::RateLimited {
                    retry_after_secs: (self.cooldown_ms - elapsed).div_ceil(1000),
                });
            }
        }
        self.cooldowns.insert(user_id, now_ms);

        let a: u8 = rng.gen_range(1..=5);
        let b: u8 = rng.gen_range(1..=5);
        let expected = a + b;

        // Correct answer plus random decoys in [1,10], deduplicated.
        let mut choices = vec![expected];
        while choices.len() < 3 {
            let decoy: u8 = rng.gen_range(1..=10);
            if !choices.contains(&decoy) {
                choices.push(decoy);
            }
        }
        choices.shuffle(rng);

        self.challenges.insert(
            user_id,
            Challenge {
                expected,
                attempts: 0,
                expires_at_ms: now_ms + self.expire_ms,
            },
        );
        debug!("Issued challenge {} + {} for user {}", a, b, user_id);

        Ok(ChallengePrompt {
            question: format!("{} + {} = ?", a, b),
            choices,
        })
    }

    /// Grade a submitted answer.
    ///
    /// Errors: [`BotError::NoChallenge`] when nothing is outstanding,
    /// [`BotError::Expired`] past the deadline (the challenge is deleted).
    /// Every graded submission increments the attempt counter.
    pub fn submit_answer(&self, user_id: UserId, value: u8) -> Result<SubmitOutcome> {
        self.submit_answer_at(user_id, value, now_ms())
    }

    fn submit_answer_at(&self, user_id: UserId, value: u8, now_ms: u64) -> Result<SubmitOutcome> {
        // Grade under the entry lock, then release it before removal.
        let grade = {
            let mut entry = match self.challenges.get_mut(&user_id) {
                Some(entry) => entry,
                None => {
                    return Err(BotError::NoChallenge {
                        user_id: user_id.to_string(),
                    })
                }
            };

            if now_ms > entry.expires_at_ms {
                Grade::Expired
            } else {
                entry.attempts += 1;
                if value == entry.expected {
                    Grade::Correct
                } else if entry.attempts >= self.max_attempts {
                    Grade::Exhausted
                } else {
                    Grade::Wrong {
                        attempts_left: self.max_attempts - entry.attempts,
                    }
                }
            }
        };

        match grade {
            Grade::Expired => {
                self.challenges.remove(&user_id);
                Err(BotError::Expired {
                    user_id: user_id.to_string(),
                })
            }
            Grade::Correct => {
                self.challenges.remove(&user_id);
                info!("User {} passed the verification challenge", user_id);
                Ok(SubmitOutcome::Admit)
            }
            Grade::Exhausted => {
                self.challenges.remove(&user_id);
                info!("User {} exhausted all challenge attempts", user_id);
                Ok(SubmitOutcome::RejectAndRemove)
            }
            Grade::Wrong { attempts_left } => Ok(SubmitOutcome::Retry { attempts_left }),
        }
    }

    /// Drop any outstanding challenge, e.g. when the member leaves.
    pub fn clear(&self, user_id: UserId) {
        self.challenges.remove(&user_id);
    }

    pub fn has_challenge(&self, user_id: UserId) -> bool {
        self.challenges.contains_key(&user_id)
    }
}

/// Shared verification manager type
pub type SharedVerificationManager = Arc<VerificationManager>;

pub fn create_shared_verification_manager(config: &BotConfig) -> SharedVerificationManager {
    Arc::new(VerificationManager::new(config))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn test_config(max_attempts: &'static str) -> BotConfig {
        let vars = HashMap::from([
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
            ("VERIFY_COOLDOWN_SECONDS", "60"),
            ("CAPTCHA_EXPIRE_SECONDS", "120"),
            ("CAPTCHA_MAX_ATTEMPTS", max_attempts),
        ]);
        BotConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap()
    }

    fn start(
        manager: &VerificationManager,
        user: UserId,
        now_ms: u64,
        seed: u64,
    ) -> Result<ChallengePrompt> {
        manager.start_challenge_at(user, now_ms, &mut StdRng::seed_from_u64(seed))
    }

    fn expected_answer(prompt: &ChallengePrompt) -> u8 {
        let parts: Vec<&str> = prompt.question.split(&['+', '='][..]).collect();
        parts[0].trim().parse::<u8>().unwrap() + parts[1].trim().parse::<u8>().unwrap()
    }

    #[test]
    fn test_prompt_has_distinct_choices_including_answer() {
        let manager = VerificationManager::new(&test_config("3"));
        for seed in 0..50 {
            let prompt = start(&manager, UserId::new(seed + 1), 1_000_000 * seed, seed).unwrap();
            let answer = expected_answer(&prompt);
            assert!(prompt.choices.len() >= 3);
            assert!(prompt.choices.contains(&answer));
            let mut deduped = prompt.choices.clone();
            deduped.sort_unstable();
            deduped.dedup();
            assert_eq!(deduped.len(), prompt.choices.len());
        }
    }

    #[test]
    fn test_cooldown_rejects_then_allows() {
        let manager = VerificationManager::new(&test_config("3"));
        let user = UserId::new(1);

        start(&manager, user, 0, 7).unwrap();
        let err = start(&manager, user, 59_000, 7).unwrap_err();
        assert!(matches!(err, BotError::RateLimited { retry_after_secs: 1 }));

        // Window elapsed
        start(&manager, user, 60_000, 7).unwrap();
    }

    #[test]
    fn test_correct_answer_admits_and_deletes() {
        let manager = VerificationManager::new(&test_config("3"));
        let user = UserId::new(1);
        let prompt = start(&manager, user, 0, 7).unwrap();

        let outcome = manager
            .submit_answer_at(user, expected_answer(&prompt), 1_000)
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Admit);
        assert!(!manager.has_challenge(user));

        // Deleted exactly once: a second submission has nothing to grade.
        assert!(matches!(
            manager.submit_answer_at(user, expected_answer(&prompt), 2_000),
            Err(BotError::NoChallenge { .. })
        ));
    }

    #[test]
    fn test_wrong_answers_exhaust_attempts() {
        let manager = VerificationManager::new(&test_config("2"));
        let user = UserId::new(1);
        let prompt = start(&manager, user, 0, 7).unwrap();
        let wrong = prompt
            .choices
            .iter()
            .copied()
            .find(|&c| c != expected_answer(&prompt))
            .unwrap_or(0);

        let first = manager.submit_answer_at(user, wrong, 1_000).unwrap();
        assert_eq!(first, SubmitOutcome::Retry { attempts_left: 1 });
        assert!(manager.has_challenge(user));

        let second = manager.submit_answer_at(user, wrong, 2_000).unwrap();
        assert_eq!(second, SubmitOutcome::RejectAndRemove);
        assert!(!manager.has_challenge(user));
    }

    #[test]
    fn test_expired_challenge_is_deleted() {
        let manager = VerificationManager::new(&test_config("3"));
        let user = UserId::new(1);
        let prompt = start(&manager, user, 0, 7).unwrap();

        let err = manager
            .submit_answer_at(user, expected_answer(&prompt), 121_000)
            .unwrap_err();
        assert!(matches!(err, BotError::Expired { .. }));
        assert!(!manager.has_challenge(user));
    }

    #[test]
    fn test_no_challenge_error() {
        let manager = VerificationManager::new(&test_config("3"));
        assert!(matches!(
            manager.submit_answer_at(UserId::new(9), 5, 0),
            Err(BotError::NoChallenge { .. })
        ));
    }
}
