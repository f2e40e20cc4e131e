use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use serde_json::Value;
use tower_sessions::Session;

use crate::{session::{safe_return_url, CSRF_STATE, IDENTITY, PKCE_VERIFIER, RETURN_URL}, sync::Identity, AppResult, AppState};

use super::{clients::ClientProvider, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state".into());
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match".into());
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier".into());
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
    let body: Value = http_client.get(provider.userinfo_url())
        .bearer_auth(access_token)
        .header(reqwest::header::USER_AGENT, "jo")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let identity = identity_from_userinfo(provider, &body)?;
    tracing::info!(uid = %identity.uid, name = %identity.display_name, "welcome");
    session.insert(IDENTITY, identity).await?;

    let return_url = session.remove::<String>(RETURN_URL).await?;
    Ok(Redirect::to(&safe_return_url(return_url)))
}

/// Google and GitHub disagree on field names and on whether `id` is a string.
pub(crate) fn identity_from_userinfo(provider: ClientProvider, body: &Value) -> AppResult<Identity> {
    let id = match body.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(format!("expected id in {body}").into()),
    };

    let first_str = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_owned)
    };

    Ok(Identity {
        uid: format!("{}:{id}", provider.id()),
        display_name: first_str(&["name", "login"]).unwrap_or("Nameless User".to_owned()),
        avatar: first_str(&["picture", "avatar_url"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_userinfo() {
        let body = serde_json::json!({
            "id": "1093",
            "name": "Ada Lovelace",
            "picture": "https://lh3.googleusercontent.com/a/ada"
        });
        let identity = identity_from_userinfo(ClientProvider::Google, &body).unwrap();
        assert_eq!(identity.uid, "google.com:1093");
        assert_eq!(identity.display_name, "Ada Lovelace");
        assert_eq!(identity.avatar.as_deref(), Some("https://lh3.googleusercontent.com/a/ada"));
    }

    #[test]
    fn github_userinfo_falls_back_to_login() {
        let body = serde_json::json!({
            "id": 583231,
            "login": "octocat",
            "name": null,
            "avatar_url": "https://avatars.githubusercontent.com/u/583231"
        });
        let identity = identity_from_userinfo(ClientProvider::Github, &body).unwrap();
        assert_eq!(identity.uid, "github.com:583231");
        assert_eq!(identity.display_name, "octocat");
    }

    #[test]
    fn userinfo_without_id_is_rejected() {
        let body = serde_json::json!({"name": "nobody"});
        assert!(identity_from_userinfo(ClientProvider::Google, &body).is_err());
    }
}
