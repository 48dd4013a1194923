//! Channel bounded context - mirrors media legs on the telephony server

pub mod data;
pub mod entity;
pub mod repository;
pub mod value_object;

pub use data::{ChannelData, DataKey, VARIABLE_PREFIX};
pub use entity::{parse_stasis_args, Channel, StasisContext};
pub use repository::ChannelRepository;
pub use value_object::{ChannelDirection, ChannelState, ChannelType, HangupCause, Tech};
