//! Short-range configuration exchange.
//!
//! - [`store`]: the field set and its paged disclosure
//! - [`channel`]: command reassembly and the notify pager
//! - [`round`]: the advertising window

pub mod channel;
pub mod round;
pub mod store;

pub use channel::{ChannelAction, ConfigChannel, SharedChannel};
pub use round::ConfigRound;
pub use store::{Access, ConfigField, ConfigStore, FieldId, Page};
