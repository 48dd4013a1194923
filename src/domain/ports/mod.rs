//! Ports towards external collaborators

pub mod ari;
pub mod notifier;
pub mod requester;

pub use ari::{AriCommander, OriginateRequest};
pub use notifier::{snapshot, Notifier};
pub use requester::{ConferenceInfo, NumberInfo, ServiceRequester};

#[cfg(test)]
pub use ari::MockAriCommander;
#[cfg(test)]
pub use notifier::MockNotifier;
#[cfg(test)]
pub use requester::MockServiceRequester;
