use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::extract::{AuthUser, ValidatedJson};
use super::ApiResponse;
use crate::domain::aggregates::{Role, User};
use crate::domain::value_objects::Email;
use crate::services::parse_id;
use crate::services::users::{NewUser, UserChanges};
use crate::{AppState, Result, ShopError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/:id", get(get_user).put(replace_user).patch(patch_user).delete(delete_user))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    #[serde(default, alias = "user_type")]
    pub role: Option<Role>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    #[validate(length(max = 100, message = "name must be at most 100 characters"))]
    pub name: Option<String>,
    pub password: Option<String>,
    #[serde(default, alias = "user_type")]
    pub role: Option<Role>,
    /// An empty string clears the address.
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenField {
    token: String,
}

#[derive(Debug, Serialize)]
pub struct CountField {
    count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeletedUser {
    id: Uuid,
    email: Email,
    name: String,
}

fn parse_email(raw: &str) -> Result<Email> {
    Email::parse(raw).map_err(|e| ShopError::invalid(e.to_string()))
}

fn user_id(raw: &str) -> Result<Uuid> {
    parse_id(raw).ok_or_else(|| ShopError::NotFound("user not found".into()))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

impl UpdateUserRequest {
    /// PUT semantics: blank strings are treated as absent.
    fn lenient(self) -> Result<UserChanges> {
        let non_blank = |v: Option<String>| trimmed(v).filter(|v| !v.is_empty());
        Ok(UserChanges {
            email: non_blank(self.email).as_deref().map(parse_email).transpose()?,
            name: non_blank(self.name),
            password: self.password.filter(|p| !p.is_empty()),
            role: self.role,
            address: self.address.map(|a| Some(a.trim().to_string()).filter(|a| !a.is_empty())),
        })
    }

    /// PATCH semantics: a blank value is an error.
    fn strict(self) -> Result<UserChanges> {
        let name = trimmed(self.name);
        if name.as_deref() == Some("") {
            return Err(ShopError::invalid("name must not be empty"));
        }
        Ok(UserChanges {
            email: self.email.as_deref().map(parse_email).transpose()?,
            name,
            password: self.password,
            role: self.role,
            address: self.address.map(|a| Some(a.trim().to_string()).filter(|a| !a.is_empty())),
        })
    }
}

async fn list_users(State(state): State<AppState>) -> Result<ApiResponse<Vec<User>, CountField>> {
    let users = state.users.list().await?;
    let count = users.len();
    Ok(ApiResponse::new(users).extra(CountField { count }))
}

async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, ApiResponse<User>)> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(ShopError::invalid("name is required"));
    }
    let user = state
        .users
        .register(NewUser {
            email: parse_email(&body.email)?,
            name,
            password: body.password,
            role: body.role.unwrap_or_default(),
            address: trimmed(body.address).filter(|a| !a.is_empty()),
        })
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::new(user).message("user created")))
}

async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<ApiResponse<User, TokenField>> {
    let (user, token) = state.users.login(&body.email, &body.password).await?;
    Ok(ApiResponse::new(user).message("login succeeded").extra(TokenField { token }))
}

async fn me(AuthUser(user): AuthUser) -> ApiResponse<User> {
    ApiResponse::new(user)
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Result<ApiResponse<User>> {
    Ok(ApiResponse::new(state.users.get(user_id(&id)?).await?))
}

async fn replace_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateUserRequest>,
) -> Result<ApiResponse<User>> {
    let user = state.users.update(user_id(&id)?, body.lenient()?).await?;
    Ok(ApiResponse::new(user).message("user updated"))
}

async fn patch_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateUserRequest>,
) -> Result<ApiResponse<User>> {
    let user = state.users.update(user_id(&id)?, body.strict()?).await?;
    Ok(ApiResponse::new(user).message("user updated"))
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> Result<ApiResponse<DeletedUser>> {
    let user = state.users.delete(user_id(&id)?).await?;
    Ok(ApiResponse::new(DeletedUser { id: user.id, email: user.email, name: user.name }).message("user deleted"))
}
