//! Wallets
//!
//! Every investor and owner profile has exactly one wallet. The balance is
//! derived strictly from an append-only ledger of entries; nothing writes a
//! balance directly.

pub mod holder;
pub mod ledger;
pub mod models;
pub mod payout;
pub mod service;

pub use holder::{HolderRef, InvestorProfile, OwnerProfile, WalletHolder};
pub use ledger::Ledger;
pub use models::{EntryKind, EntryMeta, EntryReason, HolderKind, Wallet, WalletEntry, balance_of};
pub use payout::{PayoutKind, PayoutRequest, PayoutService, PayoutStatus};
pub use service::WalletService;
