//! Output templates
//!
//! A template mixes literal text with tokens of the form
//! `{Name[,alignment][:format]}`; `{{` and `}}` produce literal braces.
//!
//! | Token | Renders |
//! |---|---|
//! | `Timestamp` | event time, `format` in `yyyy MM dd HH hh mm ss fff tt zzz` notation |
//! | `Level` | level name, `u3`/`w3`/`t3` for upper/lower/title case abbreviations |
//! | `Message` | rendered message |
//! | `NewLine` | `\n` |
//! | `Exception` | error and its sources followed by a newline, or nothing |
//! | `ThreadId`, `EventType` | integers, `x8`/`X8` for zero-padded hex |
//! | `Properties` | properties not named elsewhere in the template, as JSON |
//! | anything else | the event property of that name, or nothing |

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::{Component, OwnedFormatItem, modifier};

use super::theme::{ConsoleTheme, ThemeStyle};
use crate::event::{Level, LogEvent, render_value};

/// Format applied to `{Timestamp}` when the token has none
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "yyyy-MM-dd HH:mm:ss.fff zzz";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Property(PropertyToken),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PropertyToken {
    name: String,
    alignment: Option<Alignment>,
    format: Option<String>,
    timestamp: Option<TimestampFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Alignment {
    width: usize,
    left: bool,
}

/// Parsed output template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    tokens: Vec<Token>,
}

impl OutputTemplate {
    /// Parse a template; malformed tokens are kept as literal text
    pub fn parse(template: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            if rest.starts_with("{{") || rest.starts_with("}}") {
                literal.push(c);
                rest = &rest[2..];
                continue;
            }

            if c == '{' {
                let property = rest[1..].find('}').and_then(|end| {
                    let body = &rest[1..=end];
                    parse_property(body).map(|token| (token, end + 2))
                });
                if let Some((token, consumed)) = property {
                    if !literal.is_empty() {
                        tokens.push(Token::Text(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Property(token));
                    rest = &rest[consumed..];
                    continue;
                }
            }

            literal.push(c);
            rest = &rest[c.len_utf8()..];
        }

        if !literal.is_empty() {
            tokens.push(Token::Text(literal));
        }
        Self { tokens }
    }

    /// Names of the property tokens, in template order
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Property(property) => Some(property.name.as_str()),
            Token::Text(_) => None,
        })
    }

    /// Render an event without colours
    pub fn render_to_string(&self, event: &LogEvent) -> String {
        let mut out = String::new();
        self.render(event, ConsoleTheme::None, &mut out);
        out
    }

    /// Render an event into `out` using `theme`
    pub fn render(&self, event: &LogEvent, theme: ConsoleTheme, out: &mut String) {
        for token in &self.tokens {
            match token {
                Token::Text(text) => theme.write(out, ThemeStyle::TertiaryText, text),
                Token::Property(property) => self.render_property(property, event, theme, out),
            }
        }
    }

    fn render_property(
        &self,
        token: &PropertyToken,
        event: &LogEvent,
        theme: ConsoleTheme,
        out: &mut String,
    ) {
        let format = token.format.as_deref();
        let (style, text) = match token.name.as_str() {
            "Timestamp" => (
                ThemeStyle::SecondaryText,
                token
                    .timestamp
                    .as_ref()
                    .map(|timestamp| timestamp.format(event.timestamp))
                    .unwrap_or_default(),
            ),
            "Level" => (
                ThemeStyle::for_level(event.level),
                format_level(event.level, format),
            ),
            "Message" => (ThemeStyle::Text, event.message.clone()),
            "NewLine" => {
                out.push('\n');
                return;
            }
            "Exception" => match &event.exception {
                Some(exception) => (ThemeStyle::Text, format!("{exception}\n")),
                None => return,
            },
            "ThreadId" => (ThemeStyle::Number, format_integer(event.thread_id, format)),
            "EventType" => (
                ThemeStyle::Number,
                format_integer(u64::from(event.event_type), format),
            ),
            "Properties" => (ThemeStyle::Scalar, self.remaining_properties(event)),
            name => event.properties.get(name).map_or_else(
                || (ThemeStyle::Text, String::new()),
                |value| (ThemeStyle::for_value(value), format_value(value, format)),
            ),
        };

        theme.write(out, style, &align(text, token.alignment));
    }

    fn remaining_properties(&self, event: &LogEvent) -> String {
        let named: Vec<&str> = self.property_names().collect();
        let remaining: Map<String, Value> = event
            .properties
            .iter()
            .filter(|(name, _)| !named.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Value::Object(remaining).to_string()
    }
}

fn parse_property(body: &str) -> Option<PropertyToken> {
    let (head, format) = match body.split_once(':') {
        Some((head, format)) => (head, Some(format.to_string())),
        None => (body, None),
    };
    let (name, alignment) = match head.split_once(',') {
        Some((name, alignment)) => (name, Some(parse_alignment(alignment)?)),
        None => (head, None),
    };

    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    let timestamp = (name == "Timestamp").then(|| {
        format
            .as_deref()
            .map_or_else(TimestampFormat::default, TimestampFormat::parse)
    });
    valid.then(|| PropertyToken {
        name: name.to_string(),
        alignment,
        format,
        timestamp,
    })
}

fn parse_alignment(text: &str) -> Option<Alignment> {
    let (left, digits) = text
        .strip_prefix('-')
        .map_or((false, text), |digits| (true, digits));
    let width = digits.parse().ok()?;
    Some(Alignment { width, left })
}

fn align(text: String, alignment: Option<Alignment>) -> String {
    match alignment {
        Some(Alignment { width, left: true }) => format!("{text:<width$}"),
        Some(Alignment { width, left: false }) => format!("{text:>width$}"),
        None => text,
    }
}

/// Abbreviations indexed by width - 1
fn abbreviations(level: Level) -> [&'static str; 4] {
    match level {
        Level::Trace => ["V", "Vb", "Vrb", "Verb"],
        Level::Debug => ["D", "De", "Dbg", "Dbug"],
        Level::Info => ["I", "In", "Inf", "Info"],
        Level::Warn => ["W", "Wn", "Wrn", "Warn"],
        Level::Error => ["E", "Er", "Err", "Eror"],
    }
}

fn format_level(level: Level, format: Option<&str>) -> String {
    let Some(format) = format else {
        return level.name().to_string();
    };

    let mut chars = format.chars();
    let case = chars.next();
    let title = match chars.as_str().parse::<usize>() {
        Ok(width @ 1..=4) => abbreviations(level)[width - 1],
        _ => level.name(),
    };

    match case {
        Some('u') => title.to_uppercase(),
        Some('w') => title.to_lowercase(),
        _ => title.to_string(),
    }
}

fn format_integer(value: u64, format: Option<&str>) -> String {
    let Some(format) = format else {
        return value.to_string();
    };
    let width: usize = format.get(1..).and_then(|w| w.parse().ok()).unwrap_or(0);

    match format.chars().next() {
        Some('x') => format!("{value:0width$x}"),
        Some('X') => format!("{value:0width$X}"),
        Some('d' | 'D') => format!("{value:0width$}"),
        _ => value.to_string(),
    }
}

fn format_value(value: &Value, format: Option<&str>) -> String {
    match value.as_u64() {
        Some(number) if format.is_some() => format_integer(number, format),
        _ => render_value(value),
    }
}

/// A custom date and time format compiled into `time` format items
///
/// Understands `y`, `M`, `d`, `H`, `h`, `m`, `s`, `f`/`F`, `t` and `z` runs,
/// `'quoted'` literals and `\` escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Items(OwnedFormatItem),
    /// `F` run: fraction digits without trailing zeros
    TrimmedFraction(usize),
    /// `t`: `A` or `P`
    PeriodInitial,
}

impl TimestampFormat {
    /// Compile a format string
    pub fn parse(format: &str) -> Self {
        let mut builder = FormatBuilder::default();
        let chars: Vec<char> = format.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c == '\'' || c == '"' {
                let close = chars[i + 1..].iter().position(|&q| q == c);
                let end = close.map_or(chars.len(), |offset| i + 1 + offset);
                builder.literal.extend(&chars[i + 1..end]);
                i = end + 1;
                continue;
            }
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    builder.literal.push(escaped);
                }
                i += 2;
                continue;
            }

            let run = chars[i..].iter().take_while(|&&next| next == c).count();
            match c {
                'y' => builder.component(year(run)),
                'M' => builder.component(month(run)),
                'd' => builder.component(day(run)),
                'H' | 'h' => builder.component(hour(run, c == 'h')),
                'm' => {
                    let mut minute = modifier::Minute::default();
                    minute.padding = padding(run);
                    builder.component(Component::Minute(minute));
                }
                's' => {
                    let mut second = modifier::Second::default();
                    second.padding = padding(run);
                    builder.component(Component::Second(second));
                }
                'f' => {
                    let mut subsecond = modifier::Subsecond::default();
                    subsecond.digits = subsecond_digits(run);
                    builder.component(Component::Subsecond(subsecond));
                }
                'F' => builder.segment(Segment::TrimmedFraction(run.min(9))),
                't' if run == 1 => builder.segment(Segment::PeriodInitial),
                't' => builder.component(Component::Period(modifier::Period::default())),
                'z' => builder.offset(run),
                _ => {
                    builder.literal.push(c);
                    i += 1;
                    continue;
                }
            }
            i += run;
        }

        builder.finish()
    }

    /// Render `timestamp`
    pub fn format(&self, timestamp: OffsetDateTime) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Items(items) => {
                    if let Ok(text) = timestamp.format(items) {
                        out.push_str(&text);
                    }
                }
                Segment::TrimmedFraction(digits) => {
                    let nanos = format!("{:09}", timestamp.nanosecond());
                    out.push_str(nanos[..*digits].trim_end_matches('0'));
                }
                Segment::PeriodInitial => {
                    out.push(if timestamp.hour() < 12 { 'A' } else { 'P' });
                }
            }
        }
        out
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self::parse(DEFAULT_TIMESTAMP_FORMAT)
    }
}

#[derive(Default)]
struct FormatBuilder {
    segments: Vec<Segment>,
    items: Vec<OwnedFormatItem>,
    literal: String,
}

impl FormatBuilder {
    fn flush_literal(&mut self) {
        if !self.literal.is_empty() {
            let bytes = std::mem::take(&mut self.literal).into_bytes();
            self.items.push(OwnedFormatItem::Literal(bytes.into_boxed_slice()));
        }
    }

    fn component(&mut self, component: Component) {
        self.flush_literal();
        self.items.push(OwnedFormatItem::Component(component));
    }

    fn segment(&mut self, segment: Segment) {
        self.flush_items();
        self.segments.push(segment);
    }

    fn offset(&mut self, run: usize) {
        let mut hour = modifier::OffsetHour::default();
        hour.sign_is_mandatory = true;
        hour.padding = padding(run);
        self.component(Component::OffsetHour(hour));

        if run >= 3 {
            self.literal.push(':');
            self.component(Component::OffsetMinute(modifier::OffsetMinute::default()));
        }
    }

    fn flush_items(&mut self) {
        self.flush_literal();
        if !self.items.is_empty() {
            let items = std::mem::take(&mut self.items);
            self.segments
                .push(Segment::Items(OwnedFormatItem::Compound(items.into_boxed_slice())));
        }
    }

    fn finish(mut self) -> TimestampFormat {
        self.flush_items();
        TimestampFormat {
            segments: self.segments,
        }
    }
}

fn padding(run: usize) -> modifier::Padding {
    if run == 1 {
        modifier::Padding::None
    } else {
        modifier::Padding::Zero
    }
}

fn year(run: usize) -> Component {
    let mut year = modifier::Year::default();
    year.padding = padding(run);
    year.repr = if run <= 2 {
        modifier::YearRepr::LastTwo
    } else {
        modifier::YearRepr::Full
    };
    Component::Year(year)
}

fn month(run: usize) -> Component {
    let mut month = modifier::Month::default();
    month.padding = padding(run);
    month.repr = match run {
        1 | 2 => modifier::MonthRepr::Numerical,
        3 => modifier::MonthRepr::Short,
        _ => modifier::MonthRepr::Long,
    };
    Component::Month(month)
}

fn day(run: usize) -> Component {
    if run <= 2 {
        let mut day = modifier::Day::default();
        day.padding = padding(run);
        return Component::Day(day);
    }
    let mut weekday = modifier::Weekday::default();
    weekday.repr = if run == 3 {
        modifier::WeekdayRepr::Short
    } else {
        modifier::WeekdayRepr::Long
    };
    Component::Weekday(weekday)
}

fn hour(run: usize, twelve_hour: bool) -> Component {
    let mut hour = modifier::Hour::default();
    hour.padding = padding(run);
    hour.is_12_hour_clock = twelve_hour;
    Component::Hour(hour)
}

fn subsecond_digits(run: usize) -> modifier::SubsecondDigits {
    use modifier::SubsecondDigits as Digits;
    match run {
        1 => Digits::One,
        2 => Digits::Two,
        3 => Digits::Three,
        4 => Digits::Four,
        5 => Digits::Five,
        6 => Digits::Six,
        7 => Digits::Seven,
        8 => Digits::Eight,
        _ => Digits::Nine,
    }
}

/// Format a timestamp with a custom date and time format
///
/// Templates compile their `{Timestamp}` format once; this is for one-off use.
pub fn format_timestamp(timestamp: OffsetDateTime, format: &str) -> String {
    TimestampFormat::parse(format).format(timestamp)
}
