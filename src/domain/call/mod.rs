//! Call bounded context - manages the lifecycle of calls

pub mod action;
pub mod aggregate;
pub mod repository;
pub mod value_object;

pub use action::{
    Action, ActionType, ConfbridgeJoinOption, ConferenceJoinOption, ConnectOption, PlayOption,
};
pub use aggregate::Call;
pub use repository::CallRepository;
pub use value_object::{CallDirection, CallStatus, CallType, HangupBy, HangupReason};
