// Fetch collaborators: upstream REST APIs behind async traits.

pub mod eod;
pub mod fred;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub mod memory;

pub use eod::EodClient;
pub use fred::FredClient;
pub use retry::RetryingClient;
pub use traits::{EconSource, InstrumentMetaStore, MarketSource};
