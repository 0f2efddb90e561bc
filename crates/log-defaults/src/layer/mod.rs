//! `tracing` integration
//!
//! - `capture`: layer that turns `tracing` events into [`LogEvent`](crate::event::LogEvent)s
//! - `context`: thread-local ambient properties

mod capture;
pub mod context;

use std::cell::Cell;
use std::marker::PhantomData;

pub use capture::CaptureLayer;

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Stops the capture layer from recording events on this thread until the
/// guard drops. Sink workers hold one so their own `tracing` output (HTTP
/// clients, drivers) is not fed back into the sinks.
pub(crate) struct SuppressGuard {
    previous: bool,
    _not_send: PhantomData<*const ()>,
}

pub(crate) fn suppress_capture() -> SuppressGuard {
    let previous = SUPPRESSED.with(|flag| flag.replace(true));
    SuppressGuard {
        previous,
        _not_send: PhantomData,
    }
}

pub(crate) fn is_suppressed() -> bool {
    SUPPRESSED.with(Cell::get)
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        SUPPRESSED.with(|flag| flag.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppression_nests() {
        assert!(!is_suppressed());
        {
            let _outer = suppress_capture();
            {
                let _inner = suppress_capture();
                assert!(is_suppressed());
            }
            assert!(is_suppressed());
        }
        assert!(!is_suppressed());
    }
}
