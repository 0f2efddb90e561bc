//! Console sink
//!
//! Renders each event through an [`OutputTemplate`] and writes it to
//! stdout, or to stderr from a configurable level upwards.

mod template;
mod theme;

use std::io::{self, Write};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub use template::{DEFAULT_TIMESTAMP_FORMAT, OutputTemplate, TimestampFormat, format_timestamp};
pub use theme::{ConsoleTheme, ThemeStyle};

use super::{LogSink, SinkDescriptor};
use crate::core::{LogResult, LogResultExt};
use crate::event::{Level, LogEvent};

/// Template used when none is configured
pub const DEFAULT_OUTPUT_TEMPLATE: &str =
    "[{Timestamp:HH:mm:ss} {Level:u3}] {Message}{NewLine}{Exception}";

/// Console sink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSinkOptions {
    /// Output template, see [`OutputTemplate`]
    pub output_template: String,
    /// Colour theme
    pub theme: ConsoleTheme,
    /// Events at or above this level go to stderr
    pub standard_error_from_level: Option<Level>,
}

impl Default for ConsoleSinkOptions {
    fn default() -> Self {
        Self {
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            theme: ConsoleTheme::None,
            standard_error_from_level: None,
        }
    }
}

impl ConsoleSinkOptions {
    /// Set the output template
    #[must_use]
    pub fn with_output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = template.into();
        self
    }

    /// Set the colour theme
    #[must_use]
    pub const fn with_theme(mut self, theme: ConsoleTheme) -> Self {
        self.theme = theme;
        self
    }
}

/// Writes rendered events to the console
pub struct ConsoleSink {
    options: ConsoleSinkOptions,
    template: OutputTemplate,
    stdout: BoxMakeWriter,
    stderr: BoxMakeWriter,
    // Keeps lines from concurrent threads whole
    lock: Mutex<()>,
}

impl ConsoleSink {
    /// Create a sink writing to the process' stdout and stderr
    pub fn new(options: ConsoleSinkOptions) -> Self {
        Self::with_writers(
            options,
            BoxMakeWriter::new(io::stdout),
            BoxMakeWriter::new(io::stderr),
        )
    }

    /// Create a sink writing every event to `writer`
    pub fn with_writer<W>(options: ConsoleSinkOptions, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Clone + Send + Sync + 'static,
    {
        Self::with_writers(
            options,
            BoxMakeWriter::new(writer.clone()),
            BoxMakeWriter::new(writer),
        )
    }

    fn with_writers(options: ConsoleSinkOptions, stdout: BoxMakeWriter, stderr: BoxMakeWriter) -> Self {
        let template = OutputTemplate::parse(&options.output_template);
        Self {
            options,
            template,
            stdout,
            stderr,
            lock: Mutex::new(()),
        }
    }

    /// Sink settings
    pub fn options(&self) -> &ConsoleSinkOptions {
        &self.options
    }

    fn writer_for(&self, level: Level) -> &BoxMakeWriter {
        match self.options.standard_error_from_level {
            Some(threshold) if level >= threshold => &self.stderr,
            _ => &self.stdout,
        }
    }

    fn write_event(&self, event: &LogEvent) -> LogResult<()> {
        let mut line = String::with_capacity(128);
        self.template.render(event, self.options.theme, &mut line);

        let _guard = self.lock.lock();
        let mut writer = self.writer_for(event.level).make_writer();
        writer.write_all(line.as_bytes()).with_sink("console")?;
        writer.flush().with_sink("console")
    }
}

impl LogSink for ConsoleSink {
    fn descriptor(&self) -> SinkDescriptor {
        SinkDescriptor::Console(self.options.clone())
    }

    fn emit(&self, event: &LogEvent) {
        if let Err(e) = self.write_event(event) {
            crate::selflog!("{e}");
        }
    }

    fn flush(&self) -> LogResult<()> {
        let _guard = self.lock.lock();
        self.stdout.make_writer().flush().with_sink("console")?;
        self.stderr.make_writer().flush().with_sink("console")
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_writes_rendered_line() {
        let buffer = Buffer::default();
        let sink = ConsoleSink::with_writer(
            ConsoleSinkOptions::default().with_output_template("{Level:u3} {Message}{NewLine}"),
            buffer.clone(),
        );

        sink.emit(&LogEvent::new(Level::Warn, "disk almost full"));
        sink.emit(&LogEvent::new(Level::Info, "recovered"));
        sink.flush().unwrap();

        assert_eq!(buffer.contents(), "WRN disk almost full\nINF recovered\n");
    }

    #[test]
    fn test_descriptor_carries_options() {
        let options = ConsoleSinkOptions::default().with_theme(ConsoleTheme::Code);
        let sink = ConsoleSink::with_writer(options.clone(), Buffer::default());
        assert_eq!(sink.descriptor(), SinkDescriptor::Console(options));
        assert_eq!(sink.kind(), crate::sink::SinkKind::Console);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ConsoleSinkOptions =
            serde_json::from_value(serde_json::json!({ "theme": "code" })).unwrap();
        assert_eq!(options.theme, ConsoleTheme::Code);
        assert_eq!(options.output_template, DEFAULT_OUTPUT_TEMPLATE);
    }
}
