//! Confbridge bounded context - conference and connect sessions

pub mod entity;
pub mod repository;

pub use entity::{Confbridge, ConfbridgeType};
pub use repository::ConfbridgeRepository;
