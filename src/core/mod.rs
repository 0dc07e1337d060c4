pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod model;
pub mod replay;
pub mod roles;
