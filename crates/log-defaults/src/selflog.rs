//! Out-of-band diagnostics for failures inside the pipeline
//!
//! Sinks run on the logging path and on their own worker threads, so they
//! cannot report problems through `tracing` without feeding events back into
//! themselves. They write here instead. The self log is off until a writer is
//! installed.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

static WRITER: ArcSwapOption<Box<dyn Fn(&str) + Send + Sync>> = ArcSwapOption::const_empty();

/// Route self-log messages to a closure
pub fn enable<F>(writer: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let writer: Box<dyn Fn(&str) + Send + Sync> = Box::new(writer);
    WRITER.store(Some(Arc::new(writer)));
}

/// Route self-log messages to standard error
pub fn enable_stderr() {
    enable(|line| eprintln!("{line}"));
}

/// Stop writing self-log messages
pub fn disable() {
    WRITER.store(None);
}

/// Whether a writer is installed
pub fn is_enabled() -> bool {
    WRITER.load().is_some()
}

/// Write a message if the self log is enabled
pub fn write(args: fmt::Arguments<'_>) {
    if let Some(writer) = WRITER.load_full() {
        let line = format!(
            "{} {args}",
            time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default()
        );
        (*writer)(&line);
    }
}

/// Shorthand for [`selflog::write`](write) with `format!` syntax
#[macro_export]
macro_rules! selflog {
    ($($arg:tt)*) => {
        $crate::selflog::write(format_args!($($arg)*))
    };
}


#[cfg(test)]
mod tests {
    use super::testing::Capture;

    #[test]
    fn test_writes_only_when_enabled() {
        let capture = Capture::start();
        crate::selflog!("batch of {} events failed", 3);

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("batch of 3 events failed"));
        drop(capture);

        assert!(!super::is_enabled());
        crate::selflog!("dropped on the floor");
    }
}
