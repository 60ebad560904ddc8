use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{Account, AccountUpdate, IdentityAuthority};
use crate::{AppResult, GetField};

const BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1/projects";

/// Firebase Authentication through the Identity Toolkit admin REST API.
#[derive(Clone)]
pub struct IdentityToolkit {
    http_client: reqwest::Client,
    project_id: String,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    local_id: [&'a str; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    local_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_attributes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disable_user: Option<bool>,
}

impl IdentityToolkit {
    pub fn new(project_id: String, access_token: String) -> IdentityToolkit {
        IdentityToolkit {
            http_client: reqwest::Client::new(),
            project_id,
            access_token,
        }
    }

    async fn call<B: Serialize>(&self, method: &str, body: &B) -> AppResult<Value> {
        let url = format!("{BASE_URL}/{}/accounts:{method}", self.project_id);
        let body = self.http_client.post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl IdentityAuthority for IdentityToolkit {
    async fn lookup(&self, uid: &str) -> AppResult<Option<Account>> {
        let body = self.call("lookup", &LookupRequest { local_id: [uid] }).await?;

        let Some(user) = body.get("users").and_then(Value::as_array).and_then(|users| users.first()) else {
            return Ok(None);
        };

        // customAttributes is a JSON object serialized into a string
        let custom_claims = match user.get_str_field("customAttributes") {
            Ok(raw) => serde_json::from_str::<Map<String, Value>>(&raw)?,
            Err(_) => Map::new(),
        };
        let disabled = user.get("disabled").and_then(Value::as_bool).unwrap_or(false);

        Ok(Some(Account { custom_claims, disabled }))
    }

    async fn update(&self, uid: &str, update: AccountUpdate) -> AppResult<()> {
        let custom_attributes = update.custom_claims
            .map(|claims| serde_json::to_string(&claims))
            .transpose()?;

        self.call("update", &UpdateRequest {
            local_id: uid,
            custom_attributes,
            disable_user: update.disabled,
        }).await?;

        tracing::debug!(%uid, "identity toolkit account updated");
        Ok(())
    }
}
