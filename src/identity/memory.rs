use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{no_account, Account, AccountUpdate, ClaimPatch, IdentityAuthority};
use crate::{caller::{keys, Role}, AppResult};

/// Process-local accounts, for development and tests. Nothing survives a
/// restart.
#[derive(Clone, Default)]
pub struct MemoryAuthority {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
}

impl MemoryAuthority {
    pub fn new() -> MemoryAuthority {
        MemoryAuthority::default()
    }

    pub fn with_admin(uid: &str) -> MemoryAuthority {
        let authority = MemoryAuthority::new();
        authority.insert(uid, Some(Role::Admin));
        authority
    }

    pub fn insert(&self, uid: &str, role: Option<Role>) {
        let mut custom_claims = Map::new();
        if let Some(role) = role {
            custom_claims.insert(keys::ROLE.to_owned(), json!(role.as_str()));
        }
        self.insert_account(uid, Account { custom_claims, disabled: false });
    }

    pub fn insert_account(&self, uid: &str, account: Account) {
        self.lock().insert(uid.to_owned(), account);
    }

    pub fn claim(&self, uid: &str, key: &str) -> Option<Value> {
        self.lock().get(uid)?.custom_claims.get(key).cloned()
    }

    pub fn account(&self, uid: &str) -> Option<Account> {
        self.lock().get(uid).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IdentityAuthority for MemoryAuthority {
    async fn lookup(&self, uid: &str) -> AppResult<Option<Account>> {
        Ok(self.account(uid))
    }

    async fn update(&self, uid: &str, update: AccountUpdate) -> AppResult<()> {
        let mut accounts = self.lock();
        let Some(account) = accounts.get_mut(uid) else {
            return Err(format!("no account {uid}").into());
        };
        if let Some(custom_claims) = update.custom_claims {
            account.custom_claims = custom_claims;
        }
        if let Some(disabled) = update.disabled {
            account.disabled = disabled;
        }
        Ok(())
    }

    async fn merge_claims(&self, uid: &str, patch: ClaimPatch) -> AppResult<Option<Account>> {
        let mut accounts = self.lock();
        let account = accounts.get_mut(uid).ok_or_else(|| no_account(uid))?;
        if !patch.holds(account) {
            return Ok(None);
        }
        patch.apply(account);
        Ok(Some(account.clone()))
    }

    async fn register(&self, uid: &str) -> AppResult<()> {
        self.lock().entry(uid.to_owned()).or_default();
        Ok(())
    }
}
