use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    attendance, auth, dashboard, reports, response::ApiResponse, state::AppState, subjects, users,
};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(subjects::router())
                .merge(attendance::router())
                .merge(dashboard::router())
                .merge(reports::router())
                .route("/health", get(|| async { ApiResponse::done("ok") })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{claims::Claims, jwt::JwtKeys},
        state::testing::test_config,
        users::Role,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::util::ServiceExt;
    use uuid::Uuid;

    fn keys() -> JwtKeys {
        JwtKeys::new(&test_config().jwt)
    }

    fn token(user_id: Uuid, role: Role) -> String {
        keys().sign(user_id, "someone@klu.ac.in", role).unwrap()
    }

    fn expired_token() -> String {
        let keys = keys();
        let mut claims: Claims = keys.claims_for(Uuid::new_v4(), "old@klu.ac.in", Role::Admin);
        claims.iat -= 7200;
        claims.exp = claims.iat + 60;
        keys.encode(&claims).unwrap()
    }

    async fn call(
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = build_app(AppState::fake()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, body) = call(Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn missing_and_malformed_tokens_are_401() {
        let (status, body) = call(Method::GET, "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Unauthorized: Missing token");

        let (status, body) = call(Method::GET, "/api/users", Some("null"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized: Invalid token format");

        let (status, body) = call(Method::GET, "/api/users", Some("abc.def.ghi"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or malformed token");
    }

    #[tokio::test]
    async fn expired_token_has_its_own_message_everywhere() {
        let expired = expired_token();
        let id = Uuid::new_v4();
        for (method, uri) in [
            (Method::GET, "/api/users".to_string()),
            (Method::GET, format!("/api/users/{id}")),
            (Method::GET, "/api/attendance/today".to_string()),
            (Method::GET, format!("/api/attendance/stats/{id}")),
            (Method::GET, "/api/dashboard/stats".to_string()),
            (Method::GET, "/api/reports/students".to_string()),
            (Method::DELETE, "/api/attendance/1".to_string()),
        ] {
            let (status, body) = call(method, &uri, Some(&expired), None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["error"], "Token expired. Please log in again.", "{uri}");
        }
    }

    #[tokio::test]
    async fn user_may_patch_self_but_not_others() {
        let me = Uuid::new_v4();
        let t = token(me, Role::User);

        let (status, body) =
            call(Method::PATCH, &format!("/api/users/{me}"), Some(&t), Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid fields to update");

        let other = Uuid::new_v4();
        let (status, body) = call(
            Method::PATCH,
            &format!("/api/users/{other}"),
            Some(&t),
            Some(serde_json::json!({"fullName": "Someone Else"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Access denied");
    }

    #[tokio::test]
    async fn admin_passes_the_gate_for_any_user() {
        let t = token(Uuid::new_v4(), Role::Admin);
        let (status, body) = call(
            Method::PATCH,
            &format!("/api/users/{}", Uuid::new_v4()),
            Some(&t),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "No valid fields to update");
    }

    #[tokio::test]
    async fn non_admin_role_change_is_dropped() {
        let me = Uuid::new_v4();
        let t = token(me, Role::User);
        let (status, body) = call(
            Method::PATCH,
            &format!("/api/users/{me}"),
            Some(&t),
            Some(serde_json::json!({"role": "admin", "isActive": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid fields to update");
    }

    #[tokio::test]
    async fn admin_only_routes_refuse_users() {
        let t = token(Uuid::new_v4(), Role::User);
        for (method, uri) in [
            (Method::GET, "/api/users"),
            (Method::GET, "/api/attendance"),
            (Method::GET, "/api/attendance/stats"),
            (Method::DELETE, "/api/attendance/3"),
            (Method::GET, "/api/reports/acm"),
        ] {
            let (status, body) = call(method, uri, Some(&t), None).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(body["error"], "Access denied", "{uri}");
        }
    }

    #[tokio::test]
    async fn user_cannot_mark_someone_else() {
        let t = token(Uuid::new_v4(), Role::User);
        let (status, body) = call(
            Method::POST,
            "/api/attendance/mark",
            Some(&t),
            Some(serde_json::json!({"userId": Uuid::new_v4(), "subject": "Algorithms-101"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["error"],
            "Access denied: You can only mark your own attendance."
        );
    }

    #[tokio::test]
    async fn blank_subject_is_rejected_before_any_write() {
        let me = Uuid::new_v4();
        let t = token(me, Role::User);
        let (status, body) = call(
            Method::POST,
            "/api/attendance/mark",
            Some(&t),
            Some(serde_json::json!({"userId": me, "subject": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Subject is required");
    }

    #[tokio::test]
    async fn self_registration_reports_every_missing_field() {
        let (status, body) = call(
            Method::POST,
            "/api/users/register",
            None,
            Some(serde_json::json!({"email": "a@klu.ac.in", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Missing required fields: fullName, department, registrationNumber, acmMember, year, section, studentId"
        );
    }

    #[tokio::test]
    async fn admin_registration_requires_admin() {
        let t = token(Uuid::new_v4(), Role::User);
        let (status, _) = call(
            Method::POST,
            "/api/auth/register",
            Some(&t),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let (status, body) = call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(serde_json::json!({"email": "admin@klu.ac.in"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email and password are required");
    }

    #[tokio::test]
    async fn bad_daily_date_is_400() {
        let t = token(Uuid::new_v4(), Role::Admin);
        let (status, _) = call(Method::GET, "/api/attendance/daily/07-09-2024", Some(&t), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
