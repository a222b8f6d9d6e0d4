//! Everything needed to talk to the brokerage: token lifecycle (C3), the
//! rate-limited transport (C4), wire types, and the typed adapter (C5).

pub mod adapter;
pub mod http;
pub mod token;
pub mod types;

pub use adapter::BrokerAdapter;
pub use http::RateLimitedClient;
pub use token::TokenManager;
