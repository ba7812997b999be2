use std::collections::HashMap;
use std::fmt;

/// Fields accepted by `extract()`-style rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalUnit {
    Nanosecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    DayOfWeek,
    DayOfMonth,
    DayOfYear,
    Epoch,
}

impl TemporalUnit {
    pub const ALL: [TemporalUnit; 13] = [
        Self::Nanosecond,
        Self::Second,
        Self::Minute,
        Self::Hour,
        Self::Day,
        Self::Week,
        Self::Month,
        Self::Quarter,
        Self::Year,
        Self::DayOfWeek,
        Self::DayOfMonth,
        Self::DayOfYear,
        Self::Epoch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nanosecond => "nanosecond",
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
            Self::DayOfWeek => "day_of_week",
            Self::DayOfMonth => "day_of_month",
            Self::DayOfYear => "day_of_year",
            Self::Epoch => "epoch",
        }
    }
}

impl fmt::Display for TemporalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractSupport {
    /// The database understands the field directly.
    Native,
    /// Rewritten in terms of other native functions.
    Emulated,
    /// No known emulation; the native call is emitted as-is and may fail at
    /// execution time.
    BestEffort,
}

/// `?1` is replaced by the unit name, `?2` by the operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractPattern {
    pub template: String,
    pub support: ExtractSupport,
}

impl ExtractPattern {
    pub fn new(template: impl Into<String>, support: ExtractSupport) -> Self {
        Self {
            template: template.into(),
            support,
        }
    }

    pub fn render(&self, unit: TemporalUnit, operand: &str) -> String {
        self.template
            .replace("?1", unit.name())
            .replace("?2", operand)
    }
}

/// How `datetime_format` spells its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatStyle {
    /// `to_char()` patterns; literal text is double-quoted.
    ToChar,
    /// MySQL `date_format()` `%` tokens.
    MySqlPercent,
    /// Informix `to_char()` `%` tokens with `%F1`..`%F5` fractions.
    InformixPercent,
}

/// Per-family temporal rendering: extract patterns, format translation and
/// current date/time spellings.
#[derive(Debug, Clone)]
pub struct TemporalSupport {
    patterns: HashMap<TemporalUnit, ExtractPattern>,
    fallback_template: String,
    format_style: FormatStyle,
    max_fraction_digits: usize,
    current_date: String,
    current_timestamp: String,
}

impl TemporalSupport {
    pub fn new(fallback_template: impl Into<String>, format_style: FormatStyle) -> Self {
        Self {
            patterns: HashMap::new(),
            fallback_template: fallback_template.into(),
            format_style,
            max_fraction_digits: 6,
            current_date: "current_date".to_string(),
            current_timestamp: "current_timestamp".to_string(),
        }
    }

    pub fn with_pattern(
        mut self,
        unit: TemporalUnit,
        template: impl Into<String>,
        support: ExtractSupport,
    ) -> Self {
        self.patterns
            .insert(unit, ExtractPattern::new(template, support));
        self
    }

    /// Registers `units` as natively handled by the fallback template.
    pub fn with_native_units(mut self, units: &[TemporalUnit]) -> Self {
        for unit in units {
            let pattern = ExtractPattern::new(self.fallback_template.clone(), ExtractSupport::Native);
            self.patterns.insert(*unit, pattern);
        }
        self
    }

    pub fn with_max_fraction_digits(mut self, digits: usize) -> Self {
        self.max_fraction_digits = digits;
        self
    }

    pub fn with_current_literals(
        mut self,
        current_date: impl Into<String>,
        current_timestamp: impl Into<String>,
    ) -> Self {
        self.current_date = current_date.into();
        self.current_timestamp = current_timestamp.into();
        self
    }

    pub fn extract_pattern(&self, unit: TemporalUnit) -> ExtractPattern {
        self.patterns.get(&unit).cloned().unwrap_or_else(|| {
            ExtractPattern::new(self.fallback_template.clone(), ExtractSupport::BestEffort)
        })
    }

    pub fn render_extract(&self, unit: TemporalUnit, operand: &str) -> String {
        self.extract_pattern(unit).render(unit, operand)
    }

    pub fn current_date(&self) -> &str {
        &self.current_date
    }

    pub fn current_timestamp(&self) -> &str {
        &self.current_timestamp
    }

    pub fn max_fraction_digits(&self) -> usize {
        self.max_fraction_digits
    }

    /// Translates a generic pattern (`yyyy-MM-dd HH:mm:ss.SSS`) into native
    /// format tokens. Text in single quotes is copied literally (`''` is a
    /// quote); unknown letters are treated as literals.
    pub fn datetime_format(&self, pattern: &str) -> String {
        let chars: Vec<char> = pattern.chars().collect();
        let mut out = String::with_capacity(pattern.len() * 2);
        let mut pos = 0;

        while pos < chars.len() {
            let ch = chars[pos];
            if ch == '\'' {
                let (literal, next) = read_quoted(&chars, pos);
                self.push_literal(&mut out, &literal);
                pos = next;
                continue;
            }

            if ch.is_ascii_alphabetic() {
                let mut run = 1;
                while pos + run < chars.len() && chars[pos + run] == ch {
                    run += 1;
                }
                match self.token(ch, run) {
                    Some(token) => out.push_str(&token),
                    None => {
                        let literal: String = std::iter::repeat_n(ch, run).collect();
                        self.push_literal(&mut out, &literal);
                    }
                }
                pos += run;
                continue;
            }

            self.push_literal(&mut out, &ch.to_string());
            pos += 1;
        }

        out
    }

    fn push_literal(&self, out: &mut String, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.format_style {
            FormatStyle::ToChar => {
                if text.chars().all(|c| !c.is_ascii_alphabetic()) {
                    out.push_str(text);
                } else {
                    out.push('"');
                    out.push_str(text);
                    out.push('"');
                }
            }
            FormatStyle::MySqlPercent | FormatStyle::InformixPercent => {
                out.push_str(&text.replace('%', "%%"));
            }
        }
    }

    fn token(&self, letter: char, run: usize) -> Option<String> {
        let fraction = run.min(self.max_fraction_digits).max(1);
        let token = match self.format_style {
            FormatStyle::ToChar => match (letter, run) {
                ('y', 2) => "YY".to_string(),
                ('y', _) => "YYYY".to_string(),
                ('M', 1) => "FMMM".to_string(),
                ('M', 2) => "MM".to_string(),
                ('M', 3) => "Mon".to_string(),
                ('M', _) => "FMMonth".to_string(),
                ('d', 1) => "FMDD".to_string(),
                ('d', _) => "DD".to_string(),
                ('E', 1..=3) => "Dy".to_string(),
                ('E', _) => "FMDay".to_string(),
                ('e', _) => "D".to_string(),
                ('a', _) => "AM".to_string(),
                ('H', _) => "HH24".to_string(),
                ('h', _) => "HH12".to_string(),
                ('m', _) => "MI".to_string(),
                ('s', _) => "SS".to_string(),
                ('S', _) => format!("FF{}", fraction),
                _ => return None,
            },
            FormatStyle::MySqlPercent => match (letter, run) {
                ('y', 2) => "%y".to_string(),
                ('y', _) => "%Y".to_string(),
                ('M', 1) => "%c".to_string(),
                ('M', 2) => "%m".to_string(),
                ('M', 3) => "%b".to_string(),
                ('M', _) => "%M".to_string(),
                ('d', 1) => "%e".to_string(),
                ('d', _) => "%d".to_string(),
                ('E', 1..=3) => "%a".to_string(),
                ('E', _) => "%W".to_string(),
                ('e', _) => "%w".to_string(),
                ('a', _) => "%p".to_string(),
                ('H', _) => "%H".to_string(),
                ('h', _) => "%h".to_string(),
                ('m', _) => "%i".to_string(),
                ('s', _) => "%s".to_string(),
                // date_format only knows microseconds
                ('S', _) => "%f".to_string(),
                _ => return None,
            },
            FormatStyle::InformixPercent => match (letter, run) {
                ('y', 2) => "%y".to_string(),
                ('y', _) => "%Y".to_string(),
                ('M', 1) => "%c".to_string(),
                ('M', 2) => "%m".to_string(),
                ('M', 3) => "%b".to_string(),
                ('M', _) => "%B".to_string(),
                ('d', 1) => "%e".to_string(),
                ('d', _) => "%d".to_string(),
                ('E', 1..=3) => "%a".to_string(),
                ('E', _) => "%A".to_string(),
                ('e', _) => "%w".to_string(),
                ('a', _) => "%p".to_string(),
                ('H', _) => "%H".to_string(),
                ('h', _) => "%I".to_string(),
                ('m', _) => "%M".to_string(),
                ('s', _) => "%S".to_string(),
                ('S', _) => format!("%F{}", fraction),
                _ => return None,
            },
        };
        Some(token)
    }
}

/// Reads a single-quoted literal starting at `start`; returns the unquoted
/// text and the position after the closing quote.
fn read_quoted(chars: &[char], start: usize) -> (String, usize) {
    let mut literal = String::new();
    let mut pos = start + 1;
    // '' outside a literal is an escaped quote
    if chars.get(pos) == Some(&'\'') {
        return ("'".to_string(), pos + 1);
    }
    while pos < chars.len() {
        if chars[pos] == '\'' {
            if chars.get(pos + 1) == Some(&'\'') {
                literal.push('\'');
                pos += 2;
                continue;
            }
            return (literal, pos + 1);
        }
        literal.push(chars[pos]);
        pos += 1;
    }
    (literal, pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn informix_like() -> TemporalSupport {
        TemporalSupport::new("?1(?2)", FormatStyle::InformixPercent)
            .with_max_fraction_digits(5)
            .with_native_units(&[TemporalUnit::Day, TemporalUnit::Month, TemporalUnit::Year])
            .with_pattern(
                TemporalUnit::Second,
                "to_number(to_char(?2,'%S'))",
                ExtractSupport::Emulated,
            )
    }

    #[test]
    fn test_extract_patterns() {
        let temporal = informix_like();
        assert_eq!(temporal.render_extract(TemporalUnit::Year, "o.created"), "year(o.created)");
        assert_eq!(
            temporal.render_extract(TemporalUnit::Second, "o.created"),
            "to_number(to_char(o.created,'%S'))"
        );
        let epoch = temporal.extract_pattern(TemporalUnit::Epoch);
        assert_eq!(epoch.support, ExtractSupport::BestEffort);
        assert_eq!(epoch.render(TemporalUnit::Epoch, "x"), "epoch(x)");
    }

    #[test]
    fn test_percent_format_translation() {
        let temporal = informix_like();
        assert_eq!(
            temporal.datetime_format("yyyy-MM-dd HH:mm:ss.SSS"),
            "%Y-%m-%d %H:%M:%S.%F3"
        );
        assert_eq!(temporal.datetime_format("SSSSSSSSS"), "%F5");
        assert_eq!(temporal.datetime_format("100% 'at' hh a"), "100%% at %I %p");
        assert_eq!(temporal.datetime_format("EEEE d MMMM"), "%A %e %B");
        assert_eq!(temporal.datetime_format("'o''clock' ''"), "o'clock '");
    }

    #[test]
    fn test_to_char_quotes_literals() {
        let temporal = TemporalSupport::new("extract(?1 from ?2)", FormatStyle::ToChar);
        assert_eq!(
            temporal.datetime_format("yyyy-MM-dd'T'HH:mm"),
            "YYYY-MM-DD\"T\"HH24:MI"
        );
        assert_eq!(temporal.datetime_format("S"), "FF1");
    }
}
