use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{AppError, AppResult};

mod memory;
mod toolkit;

pub use memory::MemoryAuthority;
pub use toolkit::IdentityToolkit;

/// An account as the identity authority sees it. `custom_claims` is the
/// signed claim set; anything not understood here is carried along untouched.
#[derive(Debug, Clone, Default)]
pub struct Account {
    pub custom_claims: Map<String, Value>,
    pub disabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    /// Replaces the whole claim set, so callers merge before sending.
    pub custom_claims: Option<Map<String, Value>>,
    pub disabled: Option<bool>,
}

/// A change to one account's claims. Keys not named here are left alone.
#[derive(Debug, Clone, Default)]
pub struct ClaimPatch {
    pub set: Map<String, Value>,
    pub remove: Vec<String>,
    pub disabled: Option<bool>,
    /// Claims that must still hold these values for the patch to apply.
    /// `None` means the key must be absent.
    pub expect: Vec<(String, Option<Value>)>,
}

impl ClaimPatch {
    pub fn new() -> ClaimPatch {
        ClaimPatch::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> ClaimPatch {
        self.set.insert(key.to_owned(), value);
        self
    }

    pub fn without(mut self, key: &str) -> ClaimPatch {
        self.remove.push(key.to_owned());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> ClaimPatch {
        self.disabled = Some(disabled);
        self
    }

    /// Only apply while `key` is still what `read` saw.
    pub fn expecting(mut self, key: &str, read: &Account) -> ClaimPatch {
        self.expect.push((key.to_owned(), read.custom_claims.get(key).cloned()));
        self
    }

    pub fn holds(&self, account: &Account) -> bool {
        self.expect
            .iter()
            .all(|(key, value)| account.custom_claims.get(key) == value.as_ref())
    }

    pub fn apply(&self, account: &mut Account) {
        for key in &self.remove {
            account.custom_claims.remove(key);
        }
        for (key, value) in &self.set {
            account.custom_claims.insert(key.clone(), value.clone());
        }
        if let Some(disabled) = self.disabled {
            account.disabled = disabled;
        }
    }
}

pub(crate) fn no_account(uid: &str) -> AppError {
    AppError::NotFound(format!("User {uid} does not exist."))
}

/// Source of truth for who a caller is and what they may do.
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    async fn lookup(&self, uid: &str) -> AppResult<Option<Account>>;

    async fn update(&self, uid: &str, update: AccountUpdate) -> AppResult<()>;

    /// Applies `patch` to the current claims and returns the account as
    /// written, or `None` when an expected claim no longer holds.
    /// Authorities that can lock an account should override this; the
    /// default reads and writes back with a window in between.
    async fn merge_claims(&self, uid: &str, patch: ClaimPatch) -> AppResult<Option<Account>> {
        let mut account = self.lookup(uid).await?.ok_or_else(|| no_account(uid))?;
        if !patch.holds(&account) {
            return Ok(None);
        }
        patch.apply(&mut account);
        self.update(uid, AccountUpdate {
            custom_claims: Some(account.custom_claims.clone()),
            disabled: patch.disabled,
        }).await?;
        Ok(Some(account))
    }

    /// Called after a successful sign-in. Authorities that create accounts
    /// on their own side have nothing to do.
    async fn register(&self, _uid: &str) -> AppResult<()> {
        Ok(())
    }
}

pub type Identity = Arc<dyn IdentityAuthority>;
