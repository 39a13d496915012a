//! Payment verification.
//!
//! The client only tells us *which* transaction paid for an order. Amount,
//! merchant order id and status are always re-read from the gateway and
//! compared here before anything is persisted.

pub mod portone;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

pub use portone::PortOneGateway;

/// Payment details as reported by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GatewayPayment {
    pub imp_uid: String,
    #[serde(default)]
    pub merchant_uid: String,
    pub amount: i64,
    pub status: String,
    #[serde(default)]
    pub pay_method: Option<String>,
    /// Epoch seconds; `0` means not paid yet.
    #[serde(default)]
    pub paid_at: Option<i64>,
}

impl GatewayPayment {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
            .filter(|secs| *secs > 0)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment gateway responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("payment gateway did not issue an access token: {0}")]
    TokenUnavailable(String),
    #[error("invalid payment gateway base url: {0}")]
    InvalidBaseUrl(String),
    #[error("unexpected payment gateway response: {0}")]
    Decode(String),
}

/// Source of authoritative payment records.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `Ok(None)` when the gateway has no payment under `transaction_id`.
    async fn fetch_payment(&self, transaction_id: &str) -> Result<Option<GatewayPayment>, GatewayError>;
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("payment transaction id is required")]
    MissingTransactionId,
    #[error("payment verification failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("payment {0} was not found")]
    NotFound(String),
    #[error("gateway returned payment {actual} for transaction {expected}")]
    TransactionMismatch { expected: String, actual: String },
    #[error("payment belongs to order {actual}, not {expected}")]
    OrderMismatch { expected: String, actual: String },
    #[error("paid amount {actual} does not match order amount {expected}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error("payment is not completed (status: {status})")]
    NotPaid { status: String },
}

#[derive(Clone)]
pub struct PaymentVerifier {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentVerifier {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Fetches the payment and checks it against what the order expects.
    /// The amount is only compared when `expected_amount` is given.
    #[tracing::instrument(skip(self))]
    pub async fn verify(
        &self,
        transaction_id: &str,
        expected_amount: Option<i64>,
        expected_order_id: Option<&str>,
    ) -> Result<GatewayPayment, VerificationError> {
        let transaction_id = transaction_id.trim();
        if transaction_id.is_empty() {
            return Err(VerificationError::MissingTransactionId);
        }

        let payment = self
            .gateway
            .fetch_payment(transaction_id)
            .await?
            .ok_or_else(|| VerificationError::NotFound(transaction_id.to_string()))?;

        if payment.imp_uid != transaction_id {
            return Err(VerificationError::TransactionMismatch {
                expected: transaction_id.to_string(),
                actual: payment.imp_uid,
            });
        }
        if let Some(expected) = expected_order_id {
            if payment.merchant_uid != expected {
                return Err(VerificationError::OrderMismatch {
                    expected: expected.to_string(),
                    actual: payment.merchant_uid,
                });
            }
        }
        if let Some(expected) = expected_amount {
            if payment.amount != expected {
                return Err(VerificationError::AmountMismatch { expected, actual: payment.amount });
            }
        }
        if !payment.is_paid() {
            return Err(VerificationError::NotPaid { status: payment.status });
        }

        tracing::debug!(imp_uid = %payment.imp_uid, amount = payment.amount, "payment verified");
        Ok(payment)
    }
}
