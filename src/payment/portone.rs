//! PortOne (iamport) REST client.
//!
//! Every lookup first exchanges the API key pair for an access token, then
//! reads `/payments/{imp_uid}` with it. Responses share the envelope
//! `{ code, message, response }`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{GatewayError, GatewayPayment, PaymentGateway};
use crate::config::PortOneConfig;

#[derive(Clone)]
pub struct PortOneGateway {
    client: Client,
    base_url: Url,
    api_key: String,
    api_secret: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    imp_key: &'a str,
    imp_secret: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    response: Option<T>,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

impl PortOneGateway {
    pub fn new(config: &PortOneConfig) -> Result<Self, GatewayError> {
        let base_url = Url::parse(config.base_url.trim())
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| GatewayError::InvalidBaseUrl(config.base_url.clone()))?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Appends each segment percent-encoded, so ids cannot alter the path or query.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.endpoint(&["users", "getToken"])?)
            .json(&TokenRequest { imp_key: &self.api_key, imp_secret: &self.api_secret })
            .send()
            .await?;
        let envelope: Envelope<AccessToken> = decode(response).await?;
        match envelope.response {
            Some(token) if !token.access_token.is_empty() => Ok(token.access_token),
            _ => Err(GatewayError::TokenUnavailable(
                envelope.message.unwrap_or_else(|| format!("code {}", envelope.code)),
            )),
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<T>, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Status { status: status.as_u16(), body });
    }
    response.json().await.map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl PaymentGateway for PortOneGateway {
    #[tracing::instrument(skip(self))]
    async fn fetch_payment(&self, transaction_id: &str) -> Result<Option<GatewayPayment>, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.endpoint(&["payments", transaction_id])?)
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: Envelope<GatewayPayment> = decode(response).await?;
        tracing::debug!(code = envelope.code, found = envelope.response.is_some(), "payment lookup");
        Ok(envelope.response)
    }
}
