//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::Email;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: Email,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] Customer, Admin }

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Customer => "customer", Self::Admin => "admin" }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("role must be customer or admin (got {other:?})")),
        }
    }
}

/// Account changes; `password_hash` is already hashed. `address: Some(None)` clears it.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
    pub email: Option<Email>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub address: Option<Option<String>>,
}

impl User {
    pub fn register(email: Email, name: impl Into<String>, password_hash: String, role: Role, address: Option<String>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), email, name: name.into(), password_hash, role, address, created_at: now, updated_at: now }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(email) = patch.email { self.email = email; }
        if let Some(name) = patch.name { self.name = name; }
        if let Some(hash) = patch.password_hash { self.password_hash = hash; }
        if let Some(role) = patch.role { self.role = role; }
        if let Some(address) = patch.address { self.address = address; }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User::register(Email::parse("a@b.co").unwrap(), "A", "secret-hash".into(), Role::Customer, None);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "customer");
        assert_eq!(json["email"], "a@b.co");
    }

    #[test]
    fn test_apply_patch() {
        let mut user = User::register(Email::parse("a@b.co").unwrap(), "A", "h".into(), Role::Customer, Some("Seoul".into()));
        user.apply(UserPatch { role: Some(Role::Admin), address: Some(None), ..Default::default() });
        assert!(user.is_admin());
        assert!(user.address.is_none());
    }
}
