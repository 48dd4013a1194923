//! Protocol implementations

pub mod ari;
