//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host (x86_64) with no
//! real hardware required.

mod config_channel_tests;
mod mock_device;
mod mock_net;
mod service_tests;
mod stream_tests;
mod sync_engine_tests;
