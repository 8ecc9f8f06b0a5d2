use std::sync::LazyLock;

use chrono::NaiveTime;
use jsonschema::JSONSchema;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleItem {
    pub time: String,
    pub activity: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum ScheduleParseError {
    #[error("response has no fenced schedule block")]
    MissingBlock,
    #[error("schedule block is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("schedule schema failed to compile: {0}")]
    SchemaCompile(String),
    #[error("schedule block failed schema validation: {0:?}")]
    SchemaViolation(Vec<String>),
    #[error("schedule block is empty")]
    Empty,
    #[error("schedule item {index} has an unreadable time range '{value}'")]
    InvalidTimeRange { index: usize, value: String },
}

static SCHEDULE_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    let schema =
        serde_json::to_value(schema_for!(Vec<ScheduleItem>)).map_err(|err| err.to_string())?;
    JSONSchema::compile(&schema).map_err(|err| err.to_string())
});

/// Pulls the last fenced block out of an assistant reply and turns it into a
/// schedule with `h:mm AM - h:mm PM` time ranges. Any failure leaves the
/// caller's previous schedule in charge.
pub fn extract_schedule(text: &str) -> Result<Vec<ScheduleItem>, ScheduleParseError> {
    let block = last_fenced_block(text).ok_or(ScheduleParseError::MissingBlock)?;
    let payload: Value = serde_json::from_str(block)?;

    let validator = SCHEDULE_VALIDATOR
        .as_ref()
        .map_err(|message| ScheduleParseError::SchemaCompile(message.clone()))?;
    if let Err(validation_errors) = validator.validate(&payload) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(ScheduleParseError::SchemaViolation(errors));
    }

    let items: Vec<ScheduleItem> = serde_json::from_value(payload)?;
    if items.is_empty() {
        return Err(ScheduleParseError::Empty);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let time = normalize_time_range(&item.time).ok_or_else(|| {
                ScheduleParseError::InvalidTimeRange {
                    index,
                    value: item.time.clone(),
                }
            })?;
            Ok(ScheduleItem {
                time,
                activity: item.activity.trim().to_string(),
                description: item.description.trim().to_string(),
            })
        })
        .collect()
}

fn last_fenced_block(text: &str) -> Option<&str> {
    let close = text.rfind(FENCE)?;
    let open = text[..close].rfind(FENCE)?;
    let inner = &text[open + FENCE.len()..close];

    // Drop an info string such as `json` on the opening fence line.
    let body = match inner.split_once('\n') {
        Some((info, rest)) if !info.trim_start().starts_with(['[', '{']) => rest,
        _ => inner,
    };

    let body = body.trim();
    (!body.is_empty()).then_some(body)
}

/// Accepts `19:00 - 20:30`, `7pm-9pm`, `7:00 to 8:30 PM`, ... and renders
/// `7:00 PM - 8:30 PM`.
pub fn normalize_time_range(raw: &str) -> Option<String> {
    let unified = raw
        .replace(['\u{2013}', '\u{2014}'], "-")
        .to_ascii_uppercase()
        .replace(" TO ", "-")
        .replace('.', "");
    let (start, end) = unified.split_once('-')?;

    let start = ClockToken::parse(start)?;
    let end = ClockToken::parse(end)?;
    let start = start.resolve(end.meridiem)?;
    let end = end.resolve(None)?;

    Some(format!(
        "{} - {}",
        start.format("%-I:%M %p"),
        end.format("%-I:%M %p")
    ))
}

struct ClockToken {
    hour: u32,
    minute: u32,
    meridiem: Option<&'static str>,
}

impl ClockToken {
    fn parse(raw: &str) -> Option<Self> {
        let compact = raw.split_whitespace().collect::<String>();
        let (digits, meridiem) = if let Some(rest) = compact.strip_suffix("AM") {
            (rest, Some("AM"))
        } else if let Some(rest) = compact.strip_suffix("PM") {
            (rest, Some("PM"))
        } else {
            (compact.as_str(), None)
        };

        let (hour, minute) = match digits.split_once(':') {
            Some((hour, minute)) => (hour.parse::<u32>().ok()?, minute.parse::<u32>().ok()?),
            None => (digits.parse::<u32>().ok()?, 0),
        };

        Some(Self {
            hour,
            minute,
            meridiem,
        })
    }

    /// A bare start time borrows the end's meridiem (`7:00 - 8:30 PM`).
    fn resolve(&self, fallback_meridiem: Option<&'static str>) -> Option<NaiveTime> {
        let meridiem = self
            .meridiem
            .or(fallback_meridiem.filter(|_| (1..=12).contains(&self.hour)));

        match meridiem {
            Some(meridiem) => NaiveTime::parse_from_str(
                &format!("{:02}:{:02} {meridiem}", self.hour, self.minute),
                "%I:%M %p",
            )
            .ok(),
            None => NaiveTime::from_hms_opt(self.hour, self.minute, 0),
        }
    }
}
