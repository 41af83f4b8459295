pub mod health;
pub mod investment;
pub mod payment;
pub mod settlement;
pub mod wallet;
