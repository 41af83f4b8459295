//! Core types used throughout the system
//!
//! Identifier aliases shared by every component. All ids except `UserId`
//! are UUIDs generated by the engine, so records can be built in memory and
//! persisted without a round-trip to the database for the key.

use uuid::Uuid;

/// User ID - the authenticated account behind one or more profiles.
///
/// Issued by the (external) authentication service; the engine only
/// compares and forwards it (notifications, self-investment check).
pub type UserId = i64;

/// Profile ID - identifies a wallet holder (investor or owner profile).
///
/// The wallet of a profile is keyed by the same id.
pub type ProfileId = Uuid;

/// Opportunity ID
pub type OpportunityId = Uuid;

/// Investment ID
pub type InvestmentId = Uuid;

/// Local payment intention ID (also sent to the gateway as `special_reference`)
pub type IntentionId = Uuid;

/// Wallet ledger entry ID
pub type EntryId = Uuid;

/// Withdrawal / bank transfer request ID
pub type PayoutId = Uuid;
