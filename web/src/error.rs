//! HTTP error envelope.
//!
//! Every failure leaves this service as
//! `{"success": false, "error": {"code", "message"}}` with a stable error
//! code the widget and dashboard switch on. Declines additionally carry a
//! `failedCard` object so the widget can highlight the failing card.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use splitpay_core::SplitPayError;
use std::fmt;

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    failed_card: Option<FailedCard>,
}

/// The failing card attached to a decline response.
#[derive(Debug, Clone, Serialize)]
pub struct FailedCard {
    /// Provider intent ID of the declined payment.
    pub payment_intent_id: String,

    /// Card brand, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    /// Last four digits, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_four: Option<String>,
}

impl ApiError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub const fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            code,
            message,
            failed_card: None,
        }
    }

    /// 400 with `MISSING_PARAMS`.
    #[must_use]
    pub fn missing_params(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MISSING_PARAMS", message.into())
    }

    /// 400 with `INVALID_SHOP`.
    #[must_use]
    pub fn invalid_shop(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_SHOP", message.into())
    }

    /// 400 with `INVALID_TOKEN`.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_TOKEN", message.into())
    }

    /// 400 with `INVALID_AMOUNT`.
    #[must_use]
    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", message.into())
    }

    /// 401 with `UNAUTHORIZED`.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message.into())
    }

    /// 403 with `FORBIDDEN`.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message.into())
    }

    /// 500 with `INTERNAL_ERROR`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message.into(),
        )
    }

    /// The stable client-facing error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// The HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<SplitPayError> for ApiError {
    fn from(err: SplitPayError) -> Self {
        let message = err.to_string();
        match err {
            SplitPayError::MissingParameter(_) => Self::missing_params(message),
            SplitPayError::Validation(_) | SplitPayError::InvalidTransition(_) => {
                Self::new(StatusCode::BAD_REQUEST, "CHECKOUT_FAILED", message)
            }
            SplitPayError::AlreadyCompleted => {
                Self::new(StatusCode::BAD_REQUEST, "CHECKOUT_FAILED", message)
            }
            SplitPayError::AlreadyProcessing => {
                Self::new(StatusCode::CONFLICT, "CHECKOUT_FAILED", message)
            }
            SplitPayError::TooManyCards { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "TOO_MANY_CARDS", message)
            }
            SplitPayError::RefundExceedsRemaining { .. } => Self::invalid_amount(message),
            SplitPayError::StoreNotFound => {
                Self::new(StatusCode::NOT_FOUND, "STORE_NOT_FOUND", message)
            }
            SplitPayError::TransactionNotFound | SplitPayError::PaymentNotFound => {
                Self::new(StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND", message)
            }
            SplitPayError::SessionNotFound | SplitPayError::SessionExpired => {
                Self::new(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", message)
            }
            SplitPayError::CardDeclined(card) => Self {
                status: StatusCode::PAYMENT_REQUIRED,
                code: "CARD_DECLINED",
                message: card.message.clone(),
                failed_card: Some(FailedCard {
                    payment_intent_id: card.provider_intent_id,
                    brand: card.brand,
                    last_four: card.last_four,
                }),
            },
            SplitPayError::InteractiveRequired => {
                Self::new(StatusCode::PAYMENT_REQUIRED, "CARD_DECLINED", message)
            }
            SplitPayError::ProviderTransient(_)
            | SplitPayError::Provider(_)
            | SplitPayError::ProviderRejected { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, "STRIPE_ERROR", message)
            }
            SplitPayError::PartialCapture(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "CHECKOUT_FAILED", message)
            }
            SplitPayError::InvalidSignature => Self::unauthorized(message),
            SplitPayError::OrderSubmissionFailed(_)
            | SplitPayError::Database(_)
            | SplitPayError::Config(_)
            | SplitPayError::Internal(_) => Self::internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
    #[serde(rename = "failedCard", skip_serializing_if = "Option::is_none")]
    failed_card: Option<FailedCard>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = self.code,
                message = %self.message,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
            failed_card: self.failed_card,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitpay_core::DeclinedCard;

    #[test]
    fn test_decline_maps_to_402_with_failed_card() {
        let err = ApiError::from(SplitPayError::CardDeclined(DeclinedCard {
            provider_intent_id: "pi_9".into(),
            brand: Some("visa".into()),
            last_four: Some("4002".into()),
            code: Some("card_declined".into()),
            message: "Your card was declined.".into(),
        }));
        assert_eq!(err.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.code(), "CARD_DECLINED");
        assert_eq!(
            err.failed_card.as_ref().map(|c| c.payment_intent_id.as_str()),
            Some("pi_9")
        );
    }

    #[test]
    fn test_session_errors_map_to_404() {
        for err in [SplitPayError::SessionNotFound, SplitPayError::SessionExpired] {
            let api = ApiError::from(err);
            assert_eq!(api.status(), StatusCode::NOT_FOUND);
            assert_eq!(api.code(), "SESSION_NOT_FOUND");
        }
    }

    #[test]
    fn test_transient_provider_maps_to_502() {
        let api = ApiError::from(SplitPayError::ProviderTransient("down".into()));
        assert_eq!(api.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(api.code(), "STRIPE_ERROR");
    }
}
