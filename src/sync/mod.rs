//! Device–server synchronization.
//!
//! [`SyncEngine`] owns the connection and runs on the worker thread;
//! everything else talks to it through a [`SyncHandle`].  The
//! [`timer_task`] thread sets periodic intent bits.

pub mod engine;
pub mod handlers;
pub mod intents;
pub mod session;
pub mod stream;
pub mod timer_task;

pub use engine::{Identity, SyncEngine, SyncHandle};
pub use intents::{Intent, IntentSet};
pub use session::Session;
pub use stream::{FrameStream, FrameStreamer, Produce};
