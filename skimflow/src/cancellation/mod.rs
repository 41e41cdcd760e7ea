//! Cooperative cancellation for runs.
//!
//! A [`CancellationToken`] is shared between the run controller, in-flight
//! event tasks and the interrupt handler. The controller checks it before
//! applying each event result; once set, no further events are written.

mod token;

pub use token::CancellationToken;
