//! Account pool manager
//!
//! Hands out authenticated sessions while isolating the rest of the system
//! from per-account failure. The pool is the only owner of account state:
//! all mutation funnels through `acquire`/`release`, and every state
//! transition is persisted to the credential store before the account is
//! handed back to the eligible set.

use crate::accounts::state::{Account, AccountState, CooldownPolicy, Credentials};
use crate::provider::{SearchProvider, Session};
use crate::storage::{SqliteStorage, Storage, StorageError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised by the account pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(
        "account pool exhausted (active: {active}, cooling down: {cooldown}, banned: {banned})"
    )]
    Exhausted {
        active: usize,
        cooldown: usize,
        banned: usize,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PoolError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Outcome reported when an account is returned to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The unit finished without provider trouble
    Success,

    /// Rate limit, timeout or network trouble: rest the account
    TransientFailure,

    /// The provider rejected the session outright: ban the account
    HardFailure,
}

/// A checked-out account with its authenticated session
///
/// The holder has exclusive use of the account until it is released.
#[derive(Debug)]
pub struct AccountLease {
    pub username: String,
    pub session: Session,
}

/// Snapshot of pool composition for exhaustion errors
#[derive(Debug, Clone, Copy, Default)]
struct PoolCounts {
    active: usize,
    cooldown: usize,
    banned: usize,
}

struct PoolInner {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, Session>,
    checked_out: HashSet<String>,
}

/// Manages the set of accounts and their lifecycle
pub struct AccountPool {
    provider: Arc<dyn SearchProvider>,
    storage: Arc<Mutex<SqliteStorage>>,
    policy: CooldownPolicy,
    inner: Mutex<PoolInner>,
}

enum Picked {
    Lease(AccountLease),
    Authenticate(String),
}

impl AccountPool {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        storage: Arc<Mutex<SqliteStorage>>,
        policy: CooldownPolicy,
    ) -> Self {
        Self {
            provider,
            storage,
            policy,
            inner: Mutex::new(PoolInner {
                accounts: HashMap::new(),
                sessions: HashMap::new(),
                checked_out: HashSet::new(),
            }),
        }
    }

    /// Registers an account, adopting any persisted lifecycle state.
    /// Idempotent on username: re-registering is a no-op and returns false.
    pub fn register(&self, credentials: Credentials) -> Result<bool, PoolError> {
        let username = credentials.username.clone();
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.contains_key(&username) {
            return Ok(false);
        }

        let persisted = self.storage.lock().unwrap().get_account(&username)?;
        let account = match persisted {
            Some(mut stored) => {
                // The accounts file is authoritative for credential material.
                stored.credentials = credentials;
                // Sessions do not survive the process; a previously active
                // (or mid-login) account must authenticate again.
                if matches!(
                    stored.state,
                    AccountState::Active | AccountState::Authenticating
                ) {
                    stored.state = AccountState::Unregistered;
                }
                stored
            }
            None => {
                let account = Account::new(credentials);
                self.storage.lock().unwrap().upsert_account(&account)?;
                account
            }
        };

        tracing::debug!(account = %username, state = %account.state, "registered account");
        inner.accounts.insert(username, account);
        Ok(true)
    }

    /// Number of registered accounts
    pub fn account_count(&self) -> usize {
        self.inner.lock().unwrap().accounts.len()
    }

    /// Number of registered accounts that are not banned
    pub fn usable_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .values()
            .filter(|a| !a.state.is_terminal())
            .count()
    }

    fn counts_locked(inner: &PoolInner) -> PoolCounts {
        let mut counts = PoolCounts::default();
        for account in inner.accounts.values() {
            match account.state {
                AccountState::Unregistered => {}
                AccountState::Authenticating | AccountState::Active => counts.active += 1,
                AccountState::Cooldown => counts.cooldown += 1,
                AccountState::Banned => counts.banned += 1,
            }
        }
        counts
    }

    /// Checks out a usable, authenticated account
    ///
    /// Prefers the least-recently-used `Active` account; when none is
    /// eligible, authenticates the next `Unregistered` or cooled-down
    /// account. Fails with `PoolError::Exhausted` when nothing can be
    /// handed out right now.
    pub async fn acquire(&self) -> Result<AccountLease, PoolError> {
        loop {
            let picked = {
                let mut inner = self.inner.lock().unwrap();
                let now = Utc::now();

                if let Some(username) = Self::pick_lru_active(&inner) {
                    inner.checked_out.insert(username.clone());
                    if let Some(account) = inner.accounts.get_mut(&username) {
                        account.last_used_at = Some(now);
                    }
                    let session = inner.sessions.get(&username).cloned();
                    match session {
                        Some(session) => Picked::Lease(AccountLease {
                            username: username.clone(),
                            session,
                        }),
                        // Active without a session only happens if a session
                        // was dropped out from under us; log in again.
                        None => {
                            if let Some(account) = inner.accounts.get_mut(&username) {
                                account.state = AccountState::Authenticating;
                            }
                            Picked::Authenticate(username)
                        }
                    }
                } else if let Some(username) = Self::pick_authenticatable(&inner, now) {
                    inner.checked_out.insert(username.clone());
                    if let Some(account) = inner.accounts.get_mut(&username) {
                        account.state = AccountState::Authenticating;
                    }
                    Picked::Authenticate(username)
                } else {
                    let counts = Self::counts_locked(&inner);
                    return Err(PoolError::Exhausted {
                        active: counts.active,
                        cooldown: counts.cooldown,
                        banned: counts.banned,
                    });
                }
            };

            match picked {
                Picked::Lease(lease) => return Ok(lease),
                Picked::Authenticate(username) => {
                    if let Some(lease) = self.authenticate(&username).await? {
                        return Ok(lease);
                    }
                    // Login failed; the account moved to cooldown or was
                    // banned. Try the next candidate.
                }
            }
        }
    }

    /// Returns an account to the pool, applying the outcome transition
    pub fn release(&self, lease: AccountLease, outcome: ReleaseOutcome) -> Result<(), PoolError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        inner.checked_out.remove(&lease.username);

        let Some(account) = inner.accounts.get_mut(&lease.username) else {
            return Ok(());
        };

        match outcome {
            ReleaseOutcome::Success => {
                account.consecutive_failures = 0;
                account.last_used_at = Some(now);
            }
            ReleaseOutcome::TransientFailure => {
                account.record_transient_failure(&self.policy, now);
            }
            ReleaseOutcome::HardFailure => {
                account.record_hard_failure();
            }
        }
        let snapshot = account.clone();

        if outcome != ReleaseOutcome::Success {
            inner.sessions.remove(&lease.username);
            tracing::info!(
                account = %lease.username,
                state = %snapshot.state,
                failures = snapshot.consecutive_failures,
                "account rested after failure"
            );
        }

        self.persist(&snapshot)
    }

    /// Picks the least-recently-used active account not currently checked out
    fn pick_lru_active(inner: &PoolInner) -> Option<String> {
        inner
            .accounts
            .values()
            .filter(|a| a.state == AccountState::Active && !inner.checked_out.contains(a.username()))
            .min_by_key(|a| (a.last_used_at, a.username().to_string()))
            .map(|a| a.username().to_string())
    }

    /// Picks the next account that may start a login attempt: unregistered
    /// accounts first, then the longest-expired cooldown
    fn pick_authenticatable(inner: &PoolInner, now: DateTime<Utc>) -> Option<String> {
        let candidate = inner
            .accounts
            .values()
            .filter(|a| {
                a.state == AccountState::Unregistered && !inner.checked_out.contains(a.username())
            })
            .min_by_key(|a| a.username().to_string());
        if let Some(account) = candidate {
            return Some(account.username().to_string());
        }

        inner
            .accounts
            .values()
            .filter(|a| {
                a.state == AccountState::Cooldown
                    && a.cooldown_expired(now)
                    && !inner.checked_out.contains(a.username())
            })
            .min_by_key(|a| (a.cooldown_until, a.username().to_string()))
            .map(|a| a.username().to_string())
    }

    /// Runs one login attempt for an account already marked checked out.
    /// Returns the lease on success; on failure the account is checked back
    /// in with its failure transition applied.
    async fn authenticate(&self, username: &str) -> Result<Option<AccountLease>, PoolError> {
        let credentials = {
            let inner = self.inner.lock().unwrap();
            match inner.accounts.get(username) {
                Some(account) => account.credentials.clone(),
                None => return Ok(None),
            }
        };

        tracing::debug!(account = username, "authenticating");
        let outcome = self.provider.authenticate(&credentials).await;
        let now = Utc::now();

        let mut inner = self.inner.lock().unwrap();
        let Some(account) = inner.accounts.get_mut(username) else {
            return Ok(None);
        };

        match outcome {
            Ok(session) => {
                account.record_auth_success(now);
                let snapshot = account.clone();
                inner
                    .sessions
                    .insert(username.to_string(), session.clone());
                // Stays checked out: the lease goes straight to the caller.
                self.persist(&snapshot)?;
                tracing::info!(account = username, "login success");
                Ok(Some(AccountLease {
                    username: username.to_string(),
                    session,
                }))
            }
            Err(e) if e.is_auth_rejection() => {
                account.record_hard_failure();
                let snapshot = account.clone();
                inner.checked_out.remove(username);
                self.persist(&snapshot)?;
                tracing::warn!(account = username, error = %e, "login rejected, account banned");
                Ok(None)
            }
            Err(e) => {
                account.record_transient_failure(&self.policy, now);
                let snapshot = account.clone();
                inner.checked_out.remove(username);
                self.persist(&snapshot)?;
                tracing::warn!(
                    account = username,
                    error = %e,
                    state = %snapshot.state,
                    failures = snapshot.consecutive_failures,
                    "login failed"
                );
                Ok(None)
            }
        }
    }

    fn persist(&self, account: &Account) -> Result<(), PoolError> {
        self.storage.lock().unwrap().upsert_account(account)?;
        Ok(())
    }
}
