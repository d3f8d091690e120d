//! Runtime core: the connection supervisor, the message recorder and process signal handling.
//!
//! - [`supervisor`]: the supervisor handle and its single event loop;
//! - [`recorder`]: buffering of inbound traffic and batched persistence;
//! - [`shutdown`]: cross-platform termination signal handling.

mod recorder;
mod shutdown;
mod supervisor;

pub use recorder::MessageRecorder;
pub use shutdown::{wait_for_shutdown_signal, ShutdownSignal};
pub use supervisor::{ConnectionState, Supervisor};
