//! Account lifecycle state definitions
//!
//! Every configured credential moves through a small state machine:
//! `Unregistered -> Authenticating -> Active -> {Cooldown, Banned}`, with
//! `Cooldown -> Authenticating` once its timer elapses. `Banned` is terminal.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Represents the current lifecycle state of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountState {
    /// Configured but never authenticated in this process
    Unregistered,

    /// A login attempt is in flight
    Authenticating,

    /// Logged in and eligible for checkout
    Active,

    /// Suspended after a transient failure; retried once the timer elapses
    Cooldown,

    /// Hard authentication rejection or too many consecutive failures.
    /// Terminal: no state is reachable from here.
    Banned,
}

impl AccountState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Banned)
    }

    /// Converts the state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Cooldown => "cooldown",
            Self::Banned => "banned",
        }
    }

    /// Parses a state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unregistered" => Some(Self::Unregistered),
            "authenticating" => Some(Self::Authenticating),
            "active" => Some(Self::Active),
            "cooldown" => Some(Self::Cooldown),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Login material for one account, as supplied in the accounts file
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(rename = "email_pass")]
    pub email_password: String,
}

// Manual Debug so secrets never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Cooldown and ban policy for the account pool
#[derive(Debug, Clone, Copy)]
pub struct CooldownPolicy {
    /// Consecutive failures at which an account is banned
    pub ban_threshold: u32,

    /// Base cooldown; doubles per consecutive failure
    pub base: Duration,

    /// Upper bound on the cooldown
    pub max: Duration,
}

impl CooldownPolicy {
    /// Backoff for the given consecutive-failure count: `base * 2^(n-1)`,
    /// capped at `max`.
    pub fn backoff(&self, consecutive_failures: u32) -> Duration {
        // The shift is bounded so the multiplier cannot overflow u32.
        let exponent = consecutive_failures.saturating_sub(1).min(16);
        let delay = self.base.saturating_mul(1u32 << exponent);
        delay.min(self.max)
    }
}

/// One managed account: credentials plus lifecycle bookkeeping
#[derive(Debug, Clone)]
pub struct Account {
    pub credentials: Credentials,
    pub state: AccountState,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Creates a fresh account in the `Unregistered` state
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AccountState::Unregistered,
            consecutive_failures: 0,
            cooldown_until: None,
            last_used_at: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Returns true if a cooldown was set and has elapsed
    pub fn cooldown_expired(&self, now: DateTime<Utc>) -> bool {
        match self.cooldown_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Returns true if this account may start an authentication attempt
    pub fn can_authenticate(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            AccountState::Unregistered => true,
            AccountState::Cooldown => self.cooldown_expired(now),
            _ => false,
        }
    }

    /// Transition on a successful login: `Active`, failure counter reset
    pub fn record_auth_success(&mut self, now: DateTime<Utc>) {
        self.state = AccountState::Active;
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.last_used_at = Some(now);
    }

    /// Transition on a transient failure (login failure, rate limit,
    /// network trouble). Moves to `Cooldown` with exponential backoff, or
    /// to `Banned` once the consecutive-failure threshold is reached.
    pub fn record_transient_failure(&mut self, policy: &CooldownPolicy, now: DateTime<Utc>) {
        if self.state == AccountState::Banned {
            return;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= policy.ban_threshold {
            self.state = AccountState::Banned;
            self.cooldown_until = None;
        } else {
            let backoff = policy.backoff(self.consecutive_failures);
            self.state = AccountState::Cooldown;
            self.cooldown_until = now.checked_add_signed(
                chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero()),
            );
        }
    }

    /// Transition on a hard authentication rejection: terminal ban
    pub fn record_hard_failure(&mut self) {
        self.state = AccountState::Banned;
        self.cooldown_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials(username: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: "pw".to_string(),
            email: format!("{}@example.com", username),
            email_password: "ep".to_string(),
        }
    }

    fn test_policy() -> CooldownPolicy {
        CooldownPolicy {
            ban_threshold: 3,
            base: Duration::from_secs(60),
            max: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = test_policy();
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(3), Duration::from_secs(240));
        // 60s * 2^9 = 30720s, capped at 3600s
        assert_eq!(policy.backoff(10), Duration::from_secs(3600));
        // Large counts must not overflow
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn test_new_account_is_unregistered() {
        let account = Account::new(test_credentials("alice"));
        assert_eq!(account.state, AccountState::Unregistered);
        assert!(account.can_authenticate(Utc::now()));
    }

    #[test]
    fn test_auth_success_resets_failures() {
        let mut account = Account::new(test_credentials("alice"));
        account.consecutive_failures = 2;
        account.record_auth_success(Utc::now());
        assert_eq!(account.state, AccountState::Active);
        assert_eq!(account.consecutive_failures, 0);
        assert!(account.cooldown_until.is_none());
    }

    #[test]
    fn test_transient_failure_enters_cooldown() {
        let now = Utc::now();
        let mut account = Account::new(test_credentials("alice"));
        account.record_transient_failure(&test_policy(), now);

        assert_eq!(account.state, AccountState::Cooldown);
        assert_eq!(account.consecutive_failures, 1);
        let until = account.cooldown_until.unwrap();
        assert_eq!((until - now).num_seconds(), 60);
        assert!(!account.can_authenticate(now));
        assert!(account.can_authenticate(now + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_ban_at_threshold() {
        let now = Utc::now();
        let policy = test_policy();
        let mut account = Account::new(test_credentials("alice"));
        account.record_transient_failure(&policy, now);
        account.record_transient_failure(&policy, now);
        assert_eq!(account.state, AccountState::Cooldown);
        account.record_transient_failure(&policy, now);
        assert_eq!(account.state, AccountState::Banned);
        assert!(account.state.is_terminal());
        assert!(!account.can_authenticate(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_hard_failure_bans_immediately() {
        let mut account = Account::new(test_credentials("alice"));
        account.record_hard_failure();
        assert_eq!(account.state, AccountState::Banned);
    }

    #[test]
    fn test_banned_ignores_further_failures() {
        let now = Utc::now();
        let mut account = Account::new(test_credentials("alice"));
        account.record_hard_failure();
        account.record_transient_failure(&test_policy(), now);
        assert_eq!(account.state, AccountState::Banned);
        assert!(account.cooldown_until.is_none());
    }

    #[test]
    fn test_db_string_roundtrip() {
        for state in [
            AccountState::Unregistered,
            AccountState::Authenticating,
            AccountState::Active,
            AccountState::Cooldown,
            AccountState::Banned,
        ] {
            assert_eq!(
                AccountState::from_db_string(state.to_db_string()),
                Some(state)
            );
        }
        assert_eq!(AccountState::from_db_string("bogus"), None);
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let rendered = format!("{:?}", test_credentials("alice"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("pw"));
    }
}
