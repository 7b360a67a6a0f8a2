//! Utilities for working with panic payloads.
//!
//! The event loop catches panics raised by connection callbacks and logs the
//! payload before tearing the bridge down.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use h2_bridge::panic::format_panic;
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(&*payload).to_string(), "boom");
/// assert_eq!(format_panic(&String::from("boom")).to_string(), "boom");
/// assert!(format_panic(&5_u32).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Borrow a panic payload for display.
pub fn format_panic(panic: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(panic) }
