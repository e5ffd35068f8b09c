//! Admission gating for externally rate-limited work.
//!
//! The [`AdmissionGate`] admits at most a fixed number of callers per fixed
//! time window and makes the rest wait, rather than fail, until the window
//! rolls over.

mod admission;
mod cancel;
mod window;

pub use admission::AdmissionGate;
pub use cancel::CancelToken;
pub use window::TimeUnit;
