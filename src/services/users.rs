//! Accounts, login and bearer-token resolution.

use uuid::Uuid;

use crate::auth::{hash_password, verify_password, AuthError, JwtKeys};
use crate::domain::aggregates::{Role, User, UserPatch};
use crate::domain::value_objects::Email;
use crate::repository::{RepoError, Store};
use crate::{Result, ShopError};

pub const MIN_PASSWORD_LEN: usize = 6;

const BAD_CREDENTIALS: &str = "invalid email or password";

/// Registration input after request validation.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: Email,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub address: Option<String>,
}

/// Account changes with the password still in plain text.
#[derive(Clone, Debug, Default)]
pub struct UserChanges {
    pub email: Option<Email>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub address: Option<Option<String>>,
}

#[derive(Clone)]
pub struct UserService {
    store: Store,
    jwt: JwtKeys,
}

fn duplicate_email(err: RepoError) -> ShopError {
    match err {
        RepoError::Conflict { .. } => ShopError::AlreadyExists("a user with this email already exists".into()),
        other => other.into(),
    }
}

fn not_found() -> ShopError {
    ShopError::NotFound("user not found".into())
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ShopError::invalid(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    Ok(())
}

impl UserService {
    pub fn new(store: Store, jwt: JwtKeys) -> Self {
        Self { store, jwt }
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        Ok(self.store.users.list().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.store.users.get(id).await?.ok_or_else(not_found)
    }

    #[tracing::instrument(skip(self, new), fields(email = %new.email))]
    pub async fn register(&self, new: NewUser) -> Result<User> {
        check_password(&new.password)?;
        if self.store.users.find_by_email(&new.email).await?.is_some() {
            return Err(ShopError::AlreadyExists("a user with this email already exists".into()));
        }
        let hash = hash_password(&new.password)?;
        let user = User::register(new.email, new.name, hash, new.role, new.address);
        let user = self.store.users.insert(user).await.map_err(duplicate_email)?;
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Unknown email and wrong password fail identically.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let email = Email::parse(email).map_err(|e| ShopError::invalid(e.to_string()))?;
        let user = match self.store.users.find_by_email(&email).await? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                tracing::info!("login rejected");
                return Err(ShopError::Unauthorized(BAD_CREDENTIALS.into()));
            }
        };
        let token = self.jwt.issue(&user)?;
        Ok((user, token))
    }

    pub async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User> {
        let password_hash = match changes.password.as_deref() {
            Some(password) => {
                check_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };
        let patch = UserPatch {
            email: changes.email,
            name: changes.name,
            password_hash,
            role: changes.role,
            address: changes.address,
        };
        self.store.users.update(id, patch).await.map_err(duplicate_email)?.ok_or_else(not_found)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<User> {
        let user = self.store.users.delete(id).await?.ok_or_else(not_found)?;
        tracing::info!(email = %user.email, "user deleted");
        Ok(user)
    }

    /// Resolves a bearer token to the live account it was issued for.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let claims = self.jwt.verify(token)?;
        self.store
            .users
            .get(claims.user_id)
            .await?
            .ok_or_else(|| AuthError::UnknownUser.into())
    }
}
