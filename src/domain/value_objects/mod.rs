//! Value Objects for the storefront

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object. Always trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SkuError {
    #[error("SKU must not be empty")]
    Empty,
    #[error("SKU must be at most 50 characters")]
    TooLong,
}

/// Normalized (trimmed, lower-cased) e-mail address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, EmailError> {
        let value = value.trim().to_lowercase();
        if value.is_empty() { return Err(EmailError::Empty); }
        // local@domain.tld, no whitespace anywhere
        let valid = !value.chars().any(char::is_whitespace)
            && value.split_once('@').is_some_and(|(local, domain)| {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.split_once('.').is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
            });
        if !valid { return Err(EmailError::Malformed); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for Email {
    type Error = EmailError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<Email> for String {
    fn from(email: Email) -> Self { email.0 }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("email is required")]
    Empty,
    #[error("email address is not well-formed")]
    Malformed,
}

/// Closed set of catalog categories. The Korean labels used by the original
/// storefront client are accepted as aliases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    #[serde(alias = "상의")]
    Tops,
    #[serde(alias = "하의")]
    Bottoms,
    #[serde(alias = "악세서리")]
    Accessories,
    #[serde(alias = "신발")]
    Shoes,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tops => "tops",
            Self::Bottoms => "bottoms",
            Self::Accessories => "accessories",
            Self::Shoes => "shoes",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ProductCategory {
    type Err = CategoryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tops" | "상의" => Ok(Self::Tops),
            "bottoms" | "하의" => Ok(Self::Bottoms),
            "accessories" | "악세서리" => Ok(Self::Accessories),
            "shoes" | "신발" => Ok(Self::Shoes),
            other => Err(CategoryError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("category must be one of tops, bottoms, accessories, shoes (got {0:?})")]
pub struct CategoryError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("  prod-001 ").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }
    #[test]
    fn test_sku_rejects_blank() { assert_eq!(Sku::new("   "), Err(SkuError::Empty)); }
    #[test]
    fn test_email_normalized() {
        let email = Email::parse(" Jane.Doe@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "jane.doe@example.com");
    }
    #[test]
    fn test_email_rejects_malformed() {
        for bad in ["", "nobody", "a@b", "@b.c", "a b@c.d", "a@@b.c"] {
            assert!(Email::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }
    #[test]
    fn test_category_aliases() {
        let c: ProductCategory = serde_json::from_str("\"신발\"").unwrap();
        assert_eq!(c, ProductCategory::Shoes);
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"shoes\"");
        assert_eq!("하의".parse::<ProductCategory>().unwrap(), ProductCategory::Bottoms);
        assert!("hats".parse::<ProductCategory>().is_err());
    }
}
