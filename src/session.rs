use tower_sessions::Session;

use crate::{AppResult, sync::Identity};

pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";
pub const IDENTITY: &str = "identity";

pub async fn identity(session: &Session) -> AppResult<Option<Identity>> {
    Ok(session.get::<Identity>(IDENTITY).await?)
}

/// Where to send someone who needs to sign in before seeing `here`.
pub fn login_redirect(here: &str) -> String {
    format!("/login?return_url={here}")
}

/// Only same-site paths are honoured as post-login destinations.
pub fn safe_return_url(return_url: Option<String>) -> String {
    match return_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") => url,
        _ => "/rooms".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_url_stays_on_site() {
        assert_eq!(safe_return_url(Some("/chat/JO-AB12C".to_owned())), "/chat/JO-AB12C");
        assert_eq!(safe_return_url(Some("https://evil.example".to_owned())), "/rooms");
        assert_eq!(safe_return_url(Some("//evil.example".to_owned())), "/rooms");
        assert_eq!(safe_return_url(None), "/rooms");
    }
}
