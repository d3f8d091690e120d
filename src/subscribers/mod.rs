//! # Event subscribers.
//!
//! The [`Subscribe`] trait plus the built-in [`LogWriter`]. `AppContext`
//! merges both component buses into one stream of [`AppEvent`](crate::AppEvent)s
//! and hands it to a [`SubscriberSet`]:
//!
//! ```text
//! Bus<SupervisorEvent> ──┐
//!                        ├──► AppContext listener ──► SubscriberSet ──┬──► LogWriter
//! Bus<RecorderEvent> ────┘                                            └──► custom ...
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
