pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod res;
pub mod rooms;
pub mod search;
pub mod session;
pub mod sync;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde_json::Value;
use tower_sessions::Session;

use crate::{config::Config, error::SyncError, search::YouTubeSearch, sync::{RoomStore, SyncPolicy}};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: RoomStore,
    pub policy: SyncPolicy,
    pub search: YouTubeSearch,
    pub clients: auth::Clients,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: RoomStore, search: YouTubeSearch, clients: auth::Clients, config: Config) -> AppState {
        AppState {
            policy: SyncPolicy::new(store.clone()),
            store,
            search,
            clients,
            config: Arc::new(config),
        }
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .merge(auth::router())
        .merge(rooms::router())
        .with_state(app_state)
}

async fn home(session: Session) -> AppResult<Redirect> {
    if session::identity(&session).await?.is_some() {
        Ok(Redirect::to("/rooms"))
    } else {
        Ok(Redirect::to("/login"))
    }
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }
}


pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn sync_error(&self) -> Option<&SyncError> {
        self.0.downcast_ref::<SyncError>()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.sync_error() {
            Some(SyncError::RoomNotFound(_)) => StatusCode::NOT_FOUND,
            Some(SyncError::WriteDenied) => StatusCode::FORBIDDEN,
            Some(SyncError::SearchFailed(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status != StatusCode::INTERNAL_SERVER_ERROR {
            return (status, self.0.to_string()).into_response();
        }

        tracing::error!(error = %self.0, "request failed");
        (
            status,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(SyncError);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(oauth2::url::ParseError);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RoomCode;

    #[test]
    fn sync_errors_pick_their_status() {
        let code = RoomCode::parse("JO-NOPE1").unwrap();
        let response = AppError::from(SyncError::RoomNotFound(code)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::from(SyncError::WriteDenied).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AppError::from("boom").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn get_field_reports_missing_keys() {
        let json = serde_json::json!({"id": "42", "nested": {}});
        assert_eq!(json.get_str_field("id").unwrap(), "42");
        assert!(json.get_obj_field("nested").is_ok());
        assert!(json.get_str_field("name").is_err());
    }
}
