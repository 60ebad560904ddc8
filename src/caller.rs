use std::{fmt, str::FromStr};

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_sessions::Session;

use crate::{identity::Account, session::USER_ID, AppError, AppResult, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Moderator,
    Player,
    Founder,
    Coach,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        use Role::*;
        match self {
            Admin => "admin",
            Moderator => "moderator",
            Player => "player",
            Founder => "founder",
            Coach => "coach",
        }
    }

    pub fn is_platform_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        use Role::*;
        Ok(match s {
            "admin" => Admin,
            "moderator" => Moderator,
            "player" => Player,
            "founder" => Founder,
            "coach" => Coach,
            _ => return Err(AppError::InvalidArgument(format!("unknown role {s:?}"))),
        })
    }
}

/// Claim keys as the identity authority stores them.
pub mod keys {
    pub const ROLE: &str = "role";
    pub const CERTIFIED: &str = "isCertifiedStreamer";
    pub const DISABLED: &str = "disabled";
    pub const BAN_UNTIL: &str = "banUntil";
}

/// The authorization-relevant view of an account's signed claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    pub role: Option<Role>,
    pub is_certified_streamer: bool,
    pub disabled: bool,
}

impl Claims {
    /// Unknown roles are read as no role at all rather than rejected, so a
    /// malformed claim can never grant anything.
    pub fn from_custom(custom: &Map<String, Value>, account_disabled: bool) -> Claims {
        Claims {
            role: custom
                .get(keys::ROLE)
                .and_then(Value::as_str)
                .and_then(|role| role.parse().ok()),
            is_certified_streamer: custom
                .get(keys::CERTIFIED)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            disabled: account_disabled
                || custom.get(keys::DISABLED).and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub claims: Claims,
}

impl AuthedUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.claims.role == Some(role)
    }
}

/// Who is calling. Built per request from the session and the identity
/// authority; the `users` table is never consulted.
#[derive(Debug, Clone)]
pub enum CallerIdentity {
    Anonymous,
    User(AuthedUser),
}

impl CallerIdentity {
    pub fn user(id: impl Into<String>, claims: Claims) -> CallerIdentity {
        CallerIdentity::User(AuthedUser { id: id.into(), claims })
    }

    pub fn from_account(id: impl Into<String>, account: &Account) -> CallerIdentity {
        let claims = Claims::from_custom(&account.custom_claims, account.disabled);
        if claims.disabled {
            return CallerIdentity::Anonymous;
        }
        CallerIdentity::user(id, claims)
    }

    pub fn authenticated(&self) -> AppResult<&AuthedUser> {
        match self {
            CallerIdentity::User(user) => Ok(user),
            CallerIdentity::Anonymous => Err(AppError::Unauthenticated("You must be logged in.".to_owned())),
        }
    }

    pub fn require_admin(&self) -> AppResult<&AuthedUser> {
        let user = self.authenticated()?;
        if !user.has_role(Role::Admin) {
            return Err(AppError::PermissionDenied(
                "This action requires administrator privileges.".to_owned(),
            ));
        }
        Ok(user)
    }

    pub fn require_mod_or_admin(&self) -> AppResult<&AuthedUser> {
        let user = self.authenticated()?;
        if !user.claims.role.is_some_and(|role| role.is_platform_staff()) {
            return Err(AppError::PermissionDenied(
                "This action requires moderator or administrator privileges.".to_owned(),
            ));
        }
        Ok(user)
    }
}

impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;

        let Some(uid) = session.get::<String>(USER_ID).await? else {
            return Ok(CallerIdentity::Anonymous);
        };

        match state.identity.lookup(&uid).await? {
            Some(account) => Ok(CallerIdentity::from_account(uid, &account)),
            None => {
                tracing::debug!(%uid, "session user unknown to identity authority");
                Ok(CallerIdentity::Anonymous)
            }
        }
    }
}
