//! Engine Error Types
//!
//! One error type for every component so a failure can travel from the
//! ledger up through the investment creator and the webhook reconciler
//! without re-wrapping. Each variant carries a stable machine code, an
//! English `Display` message and an Arabic message for client surfaces.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::MoneyError;

/// Error classes used by callers to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, surfaced to the caller
    Validation,
    /// Business rule violation, aborts the enclosing transaction
    Domain,
    /// Referenced record does not exist
    NotFound,
    /// Payment gateway unreachable or returned garbage
    ExternalService,
    /// Inconsistent inbound data (webhooks); logged and acknowledged
    Integrity,
    /// Storage failure
    Storage,
}

/// Engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // === Validation Errors ===
    #[error("Amount must be a positive SAR value with at most two decimals")]
    InvalidAmount,

    #[error("Share count must be a positive integer")]
    InvalidShares,

    #[error("At least {min} shares are required")]
    SharesBelowMinimum { min: i64 },

    #[error("At most {max} shares can be purchased")]
    SharesAboveMaximum { max: i64 },

    #[error("Investment type is not allowed for this opportunity")]
    InvestmentTypeNotAllowed,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid return amounts: {0}")]
    InvalidReturnAmounts(String),

    // === Domain Errors ===
    #[error("Opportunity is not open for investment")]
    OpportunityNotOpen,

    #[error("Owners cannot invest in their own opportunity")]
    SelfInvestmentForbidden,

    #[error("Investor profile is not active")]
    InvestorInactive,

    #[error("Wallet is not available")]
    WalletUnavailable,

    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: i64, available: i64 },

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("Wallet balance is empty")]
    EmptyBalance,

    #[error("Investment has already been distributed")]
    AlreadyDistributed,

    #[error("Investment is not ready for distribution")]
    DistributionNotReady,

    #[error("Operation does not apply to this investment type")]
    InvestmentTypeMismatch,

    #[error("Merchandise has already been marked as arrived")]
    MerchandiseAlreadyArrived,

    #[error("Actual returns have already been recorded")]
    ReturnsAlreadyRecorded,

    #[error("Investment is not active")]
    InvestmentNotActive,

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // === Not Found ===
    #[error("Opportunity not found: {0}")]
    OpportunityNotFound(String),

    #[error("Investment not found: {0}")]
    InvestmentNotFound(String),

    #[error("Payment intention not found: {0}")]
    IntentionNotFound(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Payout request not found: {0}")]
    PayoutNotFound(String),

    // === External Service Errors ===
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    // === Integrity Errors ===
    #[error("Payment intention is missing required extras: {0}")]
    MissingExtras(String),

    #[error("Webhook references an unknown intention: {0}")]
    UnknownIntention(String),

    // === Storage ===
    #[error("Database error: {0}")]
    Database(String),
}

impl EngineError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidAmount => "INVALID_AMOUNT",
            EngineError::InvalidShares => "INVALID_SHARES",
            EngineError::SharesBelowMinimum { .. } => "SHARES_BELOW_MINIMUM",
            EngineError::SharesAboveMaximum { .. } => "SHARES_ABOVE_MAXIMUM",
            EngineError::InvestmentTypeNotAllowed => "INVESTMENT_TYPE_NOT_ALLOWED",
            EngineError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            EngineError::InvalidReturnAmounts(_) => "INVALID_RETURN_AMOUNTS",
            EngineError::OpportunityNotOpen => "OPPORTUNITY_NOT_OPEN",
            EngineError::SelfInvestmentForbidden => "SELF_INVESTMENT_FORBIDDEN",
            EngineError::InvestorInactive => "INVESTOR_INACTIVE",
            EngineError::WalletUnavailable => "WALLET_UNAVAILABLE",
            EngineError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::EmptyBalance => "EMPTY_BALANCE",
            EngineError::AlreadyDistributed => "ALREADY_DISTRIBUTED",
            EngineError::DistributionNotReady => "DISTRIBUTION_NOT_READY",
            EngineError::InvestmentTypeMismatch => "INVESTMENT_TYPE_MISMATCH",
            EngineError::MerchandiseAlreadyArrived => "MERCHANDISE_ALREADY_ARRIVED",
            EngineError::ReturnsAlreadyRecorded => "RETURNS_ALREADY_RECORDED",
            EngineError::InvestmentNotActive => "INVESTMENT_NOT_ACTIVE",
            EngineError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            EngineError::OpportunityNotFound(_) => "OPPORTUNITY_NOT_FOUND",
            EngineError::InvestmentNotFound(_) => "INVESTMENT_NOT_FOUND",
            EngineError::IntentionNotFound(_) => "INTENTION_NOT_FOUND",
            EngineError::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            EngineError::PayoutNotFound(_) => "PAYOUT_NOT_FOUND",
            EngineError::Gateway(_) => "GATEWAY_ERROR",
            EngineError::MissingExtras(_) => "MISSING_EXTRAS",
            EngineError::UnknownIntention(_) => "UNKNOWN_INTENTION",
            EngineError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Error class
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidAmount
            | EngineError::InvalidShares
            | EngineError::SharesBelowMinimum { .. }
            | EngineError::SharesAboveMaximum { .. }
            | EngineError::InvestmentTypeNotAllowed
            | EngineError::MalformedPayload(_)
            | EngineError::InvalidReturnAmounts(_) => ErrorKind::Validation,
            EngineError::OpportunityNotOpen
            | EngineError::SelfInvestmentForbidden
            | EngineError::InvestorInactive
            | EngineError::WalletUnavailable
            | EngineError::InsufficientShares { .. }
            | EngineError::InsufficientFunds { .. }
            | EngineError::EmptyBalance
            | EngineError::AlreadyDistributed
            | EngineError::DistributionNotReady
            | EngineError::InvestmentTypeMismatch
            | EngineError::MerchandiseAlreadyArrived
            | EngineError::ReturnsAlreadyRecorded
            | EngineError::InvestmentNotActive
            | EngineError::InvalidStateTransition(_) => ErrorKind::Domain,
            EngineError::OpportunityNotFound(_)
            | EngineError::InvestmentNotFound(_)
            | EngineError::IntentionNotFound(_)
            | EngineError::ProfileNotFound(_)
            | EngineError::PayoutNotFound(_) => ErrorKind::NotFound,
            EngineError::Gateway(_) => ErrorKind::ExternalService,
            EngineError::MissingExtras(_) | EngineError::UnknownIntention(_) => {
                ErrorKind::Integrity
            }
            EngineError::Database(_) => ErrorKind::Storage,
        }
    }

    /// Arabic client message
    pub fn message_ar(&self) -> String {
        match self {
            EngineError::InvalidAmount => "المبلغ غير صالح".to_string(),
            EngineError::InvalidShares => "عدد الحصص غير صالح".to_string(),
            EngineError::SharesBelowMinimum { min } => {
                format!("الحد الأدنى لعدد الحصص هو {}", min)
            }
            EngineError::SharesAboveMaximum { max } => {
                format!("الحد الأقصى لعدد الحصص هو {}", max)
            }
            EngineError::InvestmentTypeNotAllowed => {
                "نوع الاستثمار غير مسموح لهذه الفرصة".to_string()
            }
            EngineError::MalformedPayload(_) => "البيانات المرسلة غير صالحة".to_string(),
            EngineError::InvalidReturnAmounts(_) => "مبالغ العوائد غير صالحة".to_string(),
            EngineError::OpportunityNotOpen => "الفرصة غير متاحة للاستثمار".to_string(),
            EngineError::SelfInvestmentForbidden => {
                "لا يمكن لصاحب الفرصة الاستثمار فيها".to_string()
            }
            EngineError::InvestorInactive => "حساب المستثمر غير مفعل".to_string(),
            EngineError::WalletUnavailable => "المحفظة غير متاحة".to_string(),
            EngineError::InsufficientShares {
                requested,
                available,
            } => format!(
                "عدد الحصص المتاحة غير كافٍ: المطلوب {} والمتاح {}",
                requested, available
            ),
            EngineError::InsufficientFunds { .. } => "رصيد المحفظة غير كافٍ".to_string(),
            EngineError::EmptyBalance => "رصيد المحفظة صفر".to_string(),
            EngineError::AlreadyDistributed => "تم توزيع الأرباح مسبقاً".to_string(),
            EngineError::DistributionNotReady => "الاستثمار غير جاهز للتوزيع".to_string(),
            EngineError::InvestmentTypeMismatch => {
                "العملية لا تنطبق على نوع الاستثمار".to_string()
            }
            EngineError::MerchandiseAlreadyArrived => "تم تأكيد وصول البضاعة مسبقاً".to_string(),
            EngineError::ReturnsAlreadyRecorded => "تم تسجيل العوائد الفعلية مسبقاً".to_string(),
            EngineError::InvestmentNotActive => "الاستثمار غير نشط".to_string(),
            EngineError::InvalidStateTransition(_) => "انتقال حالة غير صالح".to_string(),
            EngineError::OpportunityNotFound(_) => "الفرصة غير موجودة".to_string(),
            EngineError::InvestmentNotFound(_) => "الاستثمار غير موجود".to_string(),
            EngineError::IntentionNotFound(_) => "طلب الدفع غير موجود".to_string(),
            EngineError::ProfileNotFound(_) => "الملف الشخصي غير موجود".to_string(),
            EngineError::PayoutNotFound(_) => "طلب السحب غير موجود".to_string(),
            EngineError::Gateway(_) => "تعذر الاتصال ببوابة الدفع".to_string(),
            EngineError::MissingExtras(_) | EngineError::UnknownIntention(_) => {
                "بيانات الدفع غير متطابقة".to_string()
            }
            EngineError::Database(_) => "حدث خطأ داخلي".to_string(),
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Domain => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::ExternalService => 502,
            ErrorKind::Integrity => 409,
            ErrorKind::Storage => 500,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database(err.to_string())
    }
}

impl From<MoneyError> for EngineError {
    fn from(_: MoneyError) -> Self {
        EngineError::InvalidAmount
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Gateway(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            EngineError::InsufficientShares {
                requested: 3,
                available: 2
            }
            .code(),
            "INSUFFICIENT_SHARES"
        );
        assert_eq!(EngineError::AlreadyDistributed.code(), "ALREADY_DISTRIBUTED");
        assert_eq!(EngineError::OpportunityNotOpen.code(), "OPPORTUNITY_NOT_OPEN");
        assert_eq!(
            EngineError::SelfInvestmentForbidden.code(),
            "SELF_INVESTMENT_FORBIDDEN"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::InvalidShares.kind(), ErrorKind::Validation);
        assert_eq!(EngineError::EmptyBalance.kind(), ErrorKind::Domain);
        assert_eq!(
            EngineError::Gateway("timeout".into()).kind(),
            ErrorKind::ExternalService
        );
        assert_eq!(
            EngineError::UnknownIntention("x".into()).kind(),
            ErrorKind::Integrity
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(EngineError::InvalidAmount.http_status(), 400);
        assert_eq!(EngineError::AlreadyDistributed.http_status(), 422);
        assert_eq!(EngineError::InvestmentNotFound("1".into()).http_status(), 404);
        assert_eq!(EngineError::Database("down".into()).http_status(), 500);
    }

    #[test]
    fn test_bilingual_messages() {
        let err = EngineError::SharesBelowMinimum { min: 5 };
        assert_eq!(err.to_string(), "At least 5 shares are required");
        assert!(err.message_ar().contains('5'));
    }

    #[test]
    fn test_money_error_maps_to_invalid_amount() {
        let err: EngineError = MoneyError::InvalidAmount.into();
        assert_eq!(err, EngineError::InvalidAmount);
    }
}
