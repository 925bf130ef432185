//! Domain layer: value objects, entities with their state transitions, and
//! the ports the application layer depends on.

pub mod dividend;
pub mod governance;
pub mod investment;
pub mod money;
pub mod ports;
pub mod property;
pub mod tokenization;
pub mod treasury;
pub mod wallet;
