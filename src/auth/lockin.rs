use axum::{debug_handler, extract::{Path, Query, State}, response::Redirect};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{identity::Identity, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL, USER_ID}, AppError, AppResult, AppState, GetField};

use super::{clients::ClientProvider, ensure_profile, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

/// OAuth callback: exchanges the code, signs the provider token into
/// Firebase, and binds the resulting uid to the session.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    State(identity): State<Identity>,
    session: Session,
) -> AppResult<Redirect> {
    let unauthenticated = |msg: &str| AppError::Unauthenticated(format!("OAuth: {msg}"));

    let state = CsrfToken::new(state.ok_or_else(|| unauthenticated("without state"))?);
    let code = AuthorizationCode::new(code.ok_or_else(|| unauthenticated("without code"))?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err(unauthenticated("no csrf_state"));
    };
    if state.secret().as_str() != stored_state.as_str() {
        return Err(unauthenticated("csrf tokens don't match"));
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err(unauthenticated("no pkce_verifier"));
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http_client.post(&clients.firebase_idpurl)
        .json(&FirebaseRequest {
            post_body: format!("access_token={access_token}&providerId={}", provider.id()),
            request_uri: "http://localhost/".to_owned(),
            return_idp_credential: true,
            return_secure_token: true,
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let user_id = body.get_str_field("localId")?;
    let display_name = body.get_str_field("displayName").ok();

    identity.register(&user_id).await?;
    ensure_profile(&db_pool, &user_id, display_name).await?;

    session.cycle_id().await?;
    session.insert(USER_ID, user_id.clone()).await?;
    tracing::info!(uid = %user_id, %provider, "signed in");

    let return_url: String = session.remove(RETURN_URL).await?.unwrap_or("/".to_string());
    Ok(Redirect::to(return_url.as_str()))
}
