//! Tax authority (Ministerio de Hacienda) reception API client

mod client;
mod config;
mod token;
mod wire;

pub use client::HttpAuthorityClient;
pub use config::AuthorityConfig;
pub use token::TokenCache;
