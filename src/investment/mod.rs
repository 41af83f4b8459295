//! Investments
//!
//! - [`validator`]: pre-conditions, no side effects
//! - [`service`]: atomic creation (validate, debit, record, reserve) and
//!   cancellation with share release

pub mod models;
pub mod service;
pub mod validator;

pub use models::{
    DistributionStatus, Investment, InvestmentAmounts, InvestmentStatus, InvestmentType,
    MerchandiseStatus, PaymentChannel,
};
pub use service::{Funding, InvestmentCreator, InvestmentRequest, InvestmentService};
pub use validator::{InvestmentValidator, ShareBounds};
