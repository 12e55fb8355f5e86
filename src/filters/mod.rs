pub mod cosmetic;
pub mod network;
