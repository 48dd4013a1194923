//! Asterisk REST Interface: event decoding and the event stream client

pub mod event;
pub mod stream;

pub use event::{parse_timestamp, AriEvent, EventHeader};
pub use stream::AriEventStream;
