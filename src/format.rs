use log::warn;

use crate::transcript::Segment;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptFormat {
    PlainText,
    FormattedText,
    Srt,
    Vtt,
}

impl TranscriptFormat {
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "plain_text" => Some(Self::PlainText),
            "formatted_text" => Some(Self::FormattedText),
            "srt" => Some(Self::Srt),
            "vtt" => Some(Self::Vtt),
            _ => None,
        }
    }

    pub fn render(self, segments: &[Segment]) -> String {
        match self {
            Self::PlainText => join_texts(segments, " "),
            Self::FormattedText => join_texts(segments, "\n"),
            Self::Srt => write_srt(segments),
            Self::Vtt => write_vtt(segments),
        }
    }
}

/// Formatted transcript text, plus a warning when the selector was not recognized.
#[derive(Debug, PartialEq)]
pub struct Rendered {
    pub text: String,
    pub warning: Option<String>,
}

/// Renders `segments` with the format named by `selector`.
///
/// Unknown selectors fall back to plain text and carry a warning.
pub fn format_segments(selector: &str, segments: &[Segment]) -> Rendered {
    match TranscriptFormat::from_selector(selector) {
        Some(format) => Rendered {
            text: format.render(segments),
            warning: None,
        },
        None => {
            let warning = format!("Unknown format '{selector}', defaulting to plain text.");
            warn!("{warning}");
            Rendered {
                text: TranscriptFormat::PlainText.render(segments),
                warning: Some(warning),
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TimestampStyle {
    pub always_include_hours: bool,
    pub decimal_marker: char,
    pub fraction_digits: u32,
}

impl TimestampStyle {
    pub const SRT: Self = Self {
        always_include_hours: true,
        decimal_marker: ',',
        fraction_digits: 3,
    };

    pub const VTT: Self = Self {
        always_include_hours: true,
        decimal_marker: '.',
        fraction_digits: 3,
    };
}

impl Default for TimestampStyle {
    fn default() -> Self {
        Self {
            always_include_hours: false,
            decimal_marker: '.',
            fraction_digits: 3,
        }
    }
}

/// Sub-second precision beyond nanoseconds is clamped.
const MAX_FRACTION_DIGITS: u32 = 9;

/// Formats seconds as `[HH:]MM:SS<marker>fff`. Negative input clamps to zero.
pub fn format_timestamp(seconds: f64, style: TimestampStyle) -> String {
    let digits = style.fraction_digits.min(MAX_FRACTION_DIGITS);
    let units = 10u64.pow(digits);
    let mut total = (seconds.max(0.0) * units as f64).round() as u64;

    let hours = total / (3600 * units);
    total -= hours * 3600 * units;
    let minutes = total / (60 * units);
    total -= minutes * 60 * units;
    let secs = total / units;
    let fraction = total - secs * units;

    let hours_marker = if style.always_include_hours || hours > 0 {
        format!("{hours:02}:")
    } else {
        String::new()
    };

    if digits == 0 {
        return format!("{hours_marker}{minutes:02}:{secs:02}");
    }

    format!(
        "{hours_marker}{minutes:02}:{secs:02}{}{fraction:0width$}",
        style.decimal_marker,
        width = digits as usize
    )
}

fn join_texts(segments: &[Segment], separator: &str) -> String {
    segments
        .iter()
        .map(|segment| segment.text.trim_start())
        .collect::<Vec<_>>()
        .join(separator)
}

fn cue_text(segment: &Segment) -> String {
    segment.text.trim().replace("-->", "->")
}

pub fn write_srt(segments: &[Segment]) -> String {
    let mut result = String::new();
    for (index, segment) in segments.iter().enumerate() {
        result.push_str(&format!("{}\n", index + 1));
        result.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(segment.start, TimestampStyle::SRT),
            format_timestamp(segment.end, TimestampStyle::SRT)
        ));
        result.push_str(&cue_text(segment));
        result.push_str("\n\n");
    }
    result
}

pub fn write_vtt(segments: &[Segment]) -> String {
    let mut result = String::new();
    for segment in segments {
        result.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(segment.start, TimestampStyle::VTT),
            format_timestamp(segment.end, TimestampStyle::VTT)
        ));
        result.push_str(&cue_text(segment));
        result.push_str("\n\n");
    }
    result
}
