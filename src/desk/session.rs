//! HTTP client for the attendance API, used by the scan desk.
//!
//! The bearer token lives in an explicit [`Session`] owned by [`ApiClient`].
//! It is set by [`ApiClient::login`] and dropped on logout or on the first
//! `401` the server returns.

use reqwest::{IntoUrl, Method, RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    attendance::dto::{EntryView, MarkedView},
    auth::{LoginRequest, LoginResponse},
    response::ApiResponse,
    users::dto::{LookupView, UserView},
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),
    #[error("decode: {0}")]
    Decode(String),
}

/// Signed-in identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: UserView,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: RwLock<Option<Session>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkBody<'a> {
    user_id: Uuid,
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    qr_code: Option<&'a str>,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `http://localhost:8080/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserView, ClientError> {
        let req = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            });
        let res: LoginResponse = self.send(req).await?;
        debug!(user_id = %res.user.id, "desk session opened");
        *self.session.write().await = Some(Session {
            token: res.token,
            user: res.user.clone(),
        });
        Ok(res.user)
    }

    pub async fn logout(&self) {
        self.session.write().await.take();
    }

    async fn authed<U: IntoUrl>(&self, method: Method, url: U) -> Result<RequestBuilder, ClientError> {
        let guard = self.session.read().await;
        let session = guard.as_ref().ok_or(ClientError::NotLoggedIn)?;
        Ok(self.http.request(method, url).bearer_auth(&session.token))
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<ApiResponse<T>, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()));
        }

        let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
            .ok()
            .and_then(|env| env.error)
            .unwrap_or_else(|| status.to_string());

        Err(match status {
            StatusCode::UNAUTHORIZED => {
                warn!(%message, "session rejected; clearing");
                self.session.write().await.take();
                ClientError::Unauthorized(message)
            }
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::CONFLICT => ClientError::Conflict(message),
            other => ClientError::Server {
                status: other.as_u16(),
                message,
            },
        })
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        self.envelope(req)
            .await?
            .into_result()
            .map_err(ClientError::Decode)
    }

    /// For endpoints that answer with a message and no data.
    async fn send_empty(&self, req: RequestBuilder) -> Result<(), ClientError> {
        let env = self.envelope::<serde_json::Value>(req).await?;
        if env.success {
            Ok(())
        } else {
            Err(ClientError::Decode(env.error.unwrap_or_default()))
        }
    }

    fn lookup_url(&self, code: &str) -> Result<Url, ClientError> {
        let mut url =
            Url::parse(&self.url("/users/lookup")).map_err(|e| ClientError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Decode(format!("cannot extend {}", self.base_url)))?
            .push(code);
        Ok(url)
    }

    pub async fn lookup(&self, code: &str) -> Result<LookupView, ClientError> {
        let url = self.lookup_url(code)?;
        let req = self.authed(Method::GET, url).await?;
        self.send(req).await
    }

    pub async fn mark(
        &self,
        user_id: Uuid,
        subject: &str,
        qr_code: Option<&str>,
    ) -> Result<MarkedView, ClientError> {
        let req = self
            .authed(Method::POST, self.url("/attendance/mark"))
            .await?
            .json(&MarkBody {
                user_id,
                subject,
                qr_code,
            });
        self.send(req).await
    }

    pub async fn unmark(&self, attendance_id: i64) -> Result<(), ClientError> {
        let req = self
            .authed(Method::DELETE, self.url(&format!("/attendance/{attendance_id}")))
            .await?;
        self.send_empty(req).await
    }

    pub async fn today(&self) -> Result<Vec<EntryView>, ClientError> {
        let req = self.authed(Method::GET, self.url("/attendance/today")).await?;
        self.send(req).await
    }

    pub async fn students(&self) -> Result<Vec<UserView>, ClientError> {
        let req = self.authed(Method::GET, self.url("/users")).await?;
        self.send(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanned_codes_are_path_safe() {
        let client = ApiClient::new("http://localhost:8080/api");
        assert_eq!(
            client.lookup_url("REG2024001").unwrap().as_str(),
            "http://localhost:8080/api/users/lookup/REG2024001"
        );
        assert_eq!(
            client.lookup_url("a b/c").unwrap().as_str(),
            "http://localhost:8080/api/users/lookup/a%20b%2Fc"
        );
    }

    #[tokio::test]
    async fn calls_without_session_fail_fast() {
        let client = ApiClient::new("http://127.0.0.1:9/api/");
        assert!(client.session().await.is_none());
        assert!(matches!(
            client.lookup("REG2024001").await,
            Err(ClientError::NotLoggedIn)
        ));
        assert_eq!(client.url("/attendance/today"), "http://127.0.0.1:9/api/attendance/today");
    }
}
