use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{LoginRequest, LoginResponse, SignupRequest, UserResponse, UsersResponse};
use crate::{error::AppError, extract::JsonBody, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UsersResponse>, AppError> {
    let users = state.users.list_users().await?;
    Ok(Json(UsersResponse {
        users: users.into_iter().map(Into::into).collect(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state
        .users
        .signup(payload.name, payload.email, payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user: user.into() })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state.users.login(payload.email, payload.password).await?;
    Ok(Json(LoginResponse {
        message: "Logged in!".into(),
        user: user.into(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::app::build_app;
    use crate::state::AppState;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn signup_login_and_list() {
        let app = build_app(AppState::fake());
        let creds = json!({ "name": "Max", "email": "test@test.com", "password": "tester" });

        let (status, json) = call(&app, Method::POST, "/api/users/signup", Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["user"]["email"], "test@test.com");
        assert!(json["user"].get("password_hash").is_none());

        let (status, json) = call(&app, Method::POST, "/api/users/signup", Some(creds)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["message"], "Could not create user, email already exists.");

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/users/login",
            Some(json!({ "email": "test@test.com", "password": "tester" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Logged in!");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users/login",
            Some(json!({ "email": "test@test.com", "password": "nope!!" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = call(&app, Method::GET, "/api/users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn body_without_json_content_type_is_a_json_error() {
        let app = build_app(AppState::fake());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/users/signup")
            .body(Body::from(
                json!({ "name": "Max", "email": "test@test.com", "password": "tester" }).to_string(),
            ))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["message"], "Invalid inputs passed, please check your data.");

        let (status, json) = call(&app, Method::GET, "/api/users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["users"].as_array().unwrap().is_empty());
    }
}
