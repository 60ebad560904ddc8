use serde_json::Value;
use time::OffsetDateTime;

use crate::{caller::keys, identity::{Account, ClaimPatch}, store, AppError, AppResult};

/// Whether and until when an account is banned.
///
/// In the claim set a ban is `disabled: true` plus `banUntil`, either unix
/// seconds or `null` for a permanent ban. An account that is not banned has
/// no `banUntil` key at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanState {
    Active,
    Temporary { until: OffsetDateTime },
    Permanent,
}

impl BanState {
    /// A ban for `duration` hours from `now`, or for good.
    pub fn ban(duration: Option<f64>, now: OffsetDateTime) -> AppResult<BanState> {
        let Some(hours) = duration else {
            return Ok(BanState::Permanent);
        };
        if !hours.is_finite() || hours <= 0.0 {
            return Err(AppError::InvalidArgument("Ban duration must be a positive number of hours.".to_owned()));
        }
        let until = time::Duration::checked_seconds_f64(hours * 3600.0)
            .and_then(|duration| now.checked_add(duration))
            .ok_or_else(|| AppError::InvalidArgument("Ban duration is too long.".to_owned()))?;
        Ok(BanState::Temporary { until: store::datetime_of(store::millis_of(until))? })
    }

    pub fn of_account(account: &Account) -> BanState {
        let disabled = account.disabled
            || account.custom_claims.get(keys::DISABLED).and_then(Value::as_bool).unwrap_or(false);
        if !disabled {
            return BanState::Active;
        }
        account
            .custom_claims
            .get(keys::BAN_UNTIL)
            .and_then(Value::as_i64)
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .map_or(BanState::Permanent, |until| BanState::Temporary { until })
    }

    pub fn is_disabled(&self) -> bool {
        !matches!(self, BanState::Active)
    }

    pub fn until(&self) -> Option<OffsetDateTime> {
        match self {
            BanState::Temporary { until } => Some(*until),
            _ => None,
        }
    }

    pub fn has_expired(&self, now: OffsetDateTime) -> bool {
        self.until().is_some_and(|until| until <= now)
    }

    /// The claim change that puts an account in this state. Other claims
    /// are left alone.
    pub fn claim_patch(&self) -> ClaimPatch {
        let patch = ClaimPatch::new()
            .with(keys::DISABLED, Value::Bool(self.is_disabled()))
            .disabled(self.is_disabled());
        match self {
            BanState::Active => patch.without(keys::BAN_UNTIL),
            BanState::Temporary { until } => patch.with(keys::BAN_UNTIL, Value::from(until.unix_timestamp())),
            BanState::Permanent => patch.with(keys::BAN_UNTIL, Value::Null),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            BanState::Active => "unbanned",
            BanState::Temporary { .. } => "temporarily banned",
            BanState::Permanent => "banned",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn account(claims: Value, disabled: bool) -> Account {
        let Value::Object(custom_claims) = claims else { unreachable!() };
        Account { custom_claims, disabled }
    }

    #[test]
    fn duration_sets_expiry() {
        let now = datetime!(2026-10-01 12:00 UTC);
        assert_eq!(
            BanState::ban(Some(24.0), now).unwrap(),
            BanState::Temporary { until: datetime!(2026-10-02 12:00 UTC) },
        );
        assert_eq!(
            BanState::ban(Some(1.5), now).unwrap(),
            BanState::Temporary { until: datetime!(2026-10-01 13:30 UTC) },
        );
        assert_eq!(BanState::ban(None, now).unwrap(), BanState::Permanent);
    }

    #[test]
    fn bad_durations_rejected() {
        let now = datetime!(2026-10-01 12:00 UTC);
        for hours in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(BanState::ban(Some(hours), now), Err(AppError::InvalidArgument(_))));
        }
    }

    #[test]
    fn claims_round_trip() {
        let until = datetime!(2026-10-02 12:00 UTC);
        let mut target = account(json!({ "role": "player" }), false);

        BanState::Temporary { until }.claim_patch().apply(&mut target);
        assert_eq!(target.custom_claims[keys::BAN_UNTIL], json!(until.unix_timestamp()));
        assert!(target.disabled);
        assert_eq!(BanState::of_account(&target), BanState::Temporary { until });

        BanState::Permanent.claim_patch().apply(&mut target);
        assert_eq!(target.custom_claims[keys::BAN_UNTIL], Value::Null);
        assert_eq!(BanState::of_account(&target), BanState::Permanent);

        BanState::Active.claim_patch().apply(&mut target);
        assert!(!target.custom_claims.contains_key(keys::BAN_UNTIL));
        assert_eq!(target.custom_claims[keys::DISABLED], json!(false));
        assert_eq!(target.custom_claims["role"], json!("player"));
        assert!(!target.disabled);
        assert_eq!(BanState::of_account(&target), BanState::Active);
    }

    #[test]
    fn expiry() {
        let until = datetime!(2026-10-02 12:00 UTC);
        let ban = BanState::Temporary { until };
        assert!(!ban.has_expired(datetime!(2026-10-02 11:59 UTC)));
        assert!(ban.has_expired(until));
        assert!(!BanState::Permanent.has_expired(datetime!(2100-01-01 0:00 UTC)));
    }
}
