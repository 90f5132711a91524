//! Cross-cutting runtime primitives: cancellation and call admission.
//!
//! Pipelines share nothing mutable with each other except a [`CallLimiter`],
//! which bounds how many OCR and translation calls run at once across every
//! document in the process.

mod cancel;
mod limiter;

pub use cancel::{CancelReason, CancelToken};
pub use limiter::{CallLimiter, CallPermit};
pub(crate) use limiter::CANCEL_POLL;
