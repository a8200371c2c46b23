//! Device-session records and their binary codec.
//!
//! - [`record`]: the [`SessionRecord`] model
//! - [`codec`]: forward-tolerant protobuf encoding

pub mod codec;
pub mod record;

pub use codec::{decode, encode, CodecError, GO_ZERO_TIME_UNIX_NS, MAX_NESTING_DEPTH};
pub use record::{KeyEnvelope, RxWindow, SessionRecord, UplinkHistory, UPLINK_HISTORY_SIZE};
