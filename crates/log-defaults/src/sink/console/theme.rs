//! ANSI console themes

use nu_ansi_term::{Color, Style};
use serde::{Deserialize, Serialize};

use crate::event::Level;

/// Colour scheme applied to console output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleTheme {
    /// Plain text
    #[default]
    None,
    /// 256-colour palette modelled on a code editor's dark theme
    Code,
}

/// Role of a piece of rendered output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeStyle {
    /// Message and exception text
    Text,
    /// Timestamps and other secondary values
    SecondaryText,
    /// Literal text from the output template
    TertiaryText,
    /// Tokens that could not be rendered
    Invalid,
    /// `null` values
    Null,
    /// Property names
    Name,
    /// String values
    String,
    /// Numeric values
    Number,
    /// Boolean values
    Boolean,
    /// Other scalar values
    Scalar,
    /// Level of a trace/verbose event
    LevelVerbose,
    /// Level of a debug event
    LevelDebug,
    /// Level of an information event
    LevelInformation,
    /// Level of a warning event
    LevelWarning,
    /// Level of an error event
    LevelError,
}

impl ThemeStyle {
    /// Style used for the level token of an event
    pub const fn for_level(level: Level) -> Self {
        match level {
            Level::Trace => Self::LevelVerbose,
            Level::Debug => Self::LevelDebug,
            Level::Info => Self::LevelInformation,
            Level::Warn => Self::LevelWarning,
            Level::Error => Self::LevelError,
        }
    }

    /// Style used for a property value of this JSON type
    pub fn for_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Self::Scalar,
        }
    }
}

impl ConsoleTheme {
    /// ANSI style for `style`, `None` for [`ConsoleTheme::None`]
    pub fn style(self, style: ThemeStyle) -> Option<Style> {
        match self {
            Self::None => None,
            Self::Code => Some(match style {
                ThemeStyle::Text => Color::Fixed(253).normal(),
                ThemeStyle::SecondaryText => Color::Fixed(246).normal(),
                ThemeStyle::TertiaryText => Color::Fixed(242).normal(),
                ThemeStyle::Invalid => Color::Yellow.bold(),
                ThemeStyle::Null | ThemeStyle::Boolean => Color::Fixed(38).normal(),
                ThemeStyle::Name => Color::Fixed(81).normal(),
                ThemeStyle::String => Color::Fixed(216).normal(),
                ThemeStyle::Number => Color::Fixed(151).normal(),
                ThemeStyle::Scalar => Color::Fixed(79).normal(),
                ThemeStyle::LevelVerbose | ThemeStyle::LevelDebug => Color::White.normal(),
                ThemeStyle::LevelInformation => Color::White.bold(),
                ThemeStyle::LevelWarning => Color::Fixed(229).normal(),
                ThemeStyle::LevelError => Color::Fixed(197).on(Color::Fixed(238)),
            }),
        }
    }

    /// Append `text` to `out` wrapped in `style`
    pub fn write(self, out: &mut String, style: ThemeStyle, text: &str) {
        match self.style(style) {
            Some(style) if !text.is_empty() => out.push_str(&style.paint(text).to_string()),
            _ => out.push_str(text),
        }
    }
}
