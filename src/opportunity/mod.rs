//! Opportunities and their share inventory

pub mod inventory;
pub mod models;

pub use models::{Opportunity, OpportunityStatus};
