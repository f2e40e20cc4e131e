use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub public_url: String,
    pub client_secret_path: String,
    pub youtube_api_key: Option<String>,
    pub default_video_id: String,
    pub search_max_results: u32,
    pub session_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite://jo.db".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            public_url: "http://localhost:8080".to_owned(),
            client_secret_path: "client_secret.json".to_owned(),
            youtube_api_key: None,
            default_video_id: "Klv9ZSpjWPI".to_owned(),
            search_max_results: 8,
            session_minutes: 60,
        }
    }
}

impl Config {
    /// Reads `.env` and the process environment over the defaults.
    pub fn from_env() -> anyhow::Result<Config> {
        let _ = dotenv::dotenv();
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds a config from any key lookup. Missing keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let defaults = Config::default();
        let var_or = |key: &str, default: String| lookup(key).unwrap_or(default);

        Ok(Config {
            database_url: var_or("DATABASE_URL", defaults.database_url),
            bind_addr: var_or("BIND_ADDR", defaults.bind_addr),
            public_url: var_or("PUBLIC_URL", defaults.public_url)
                .trim_end_matches('/')
                .to_owned(),
            client_secret_path: var_or("CLIENT_SECRET_PATH", defaults.client_secret_path),
            youtube_api_key: lookup("YOUTUBE_API_KEY").filter(|key| !key.is_empty()),
            default_video_id: var_or("DEFAULT_VIDEO_ID", defaults.default_video_id),
            search_max_results: parsed_or(&lookup, "SEARCH_MAX_RESULTS", defaults.search_max_results)?,
            session_minutes: parsed_or(&lookup, "SESSION_MINUTES", defaults.session_minutes)?,
        })
    }
}

fn parsed_or<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value.parse().with_context(|| format!("{key}={value:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_describe_a_fresh_room() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.default_video_id, "Klv9ZSpjWPI");
        assert_eq!(config.search_max_results, 8);
        assert_eq!(config.youtube_api_key, None);
    }

    #[test]
    fn values_override_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("PUBLIC_URL", "https://jo.example/"),
            ("SEARCH_MAX_RESULTS", "12"),
            ("YOUTUBE_API_KEY", ""),
        ]))
        .unwrap();
        assert_eq!(config.public_url, "https://jo.example");
        assert_eq!(config.search_max_results, 12);
        assert_eq!(config.youtube_api_key, None);
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[("SESSION_MINUTES", "an hour")])).unwrap_err();
        assert!(err.to_string().contains("SESSION_MINUTES"));
        assert_eq!(parsed_or(lookup(&[]), "SEARCH_MAX_RESULTS", 8u32).unwrap(), 8);
    }
}
