//! Application services: operator auth, nonces, notices, links and commands.

pub mod auth;
pub mod cache_commands;
pub mod error;
pub mod links;
pub mod nonce;
pub mod notices;
pub mod repos;
