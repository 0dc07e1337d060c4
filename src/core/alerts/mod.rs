// Alert rule system for guild message moderation.
//
// Architecture:
// - model.rs: Rule configuration and action types
// - matcher.rs: Compiles keywords and regex patterns into matchers
// - triggers.rs: Non-content gates (age, link, roles)
// - engine.rs: Ordered, first-match-wins rule evaluation

pub mod engine;
pub mod matcher;
pub mod model;
pub mod triggers;
