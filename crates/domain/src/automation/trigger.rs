//! Trigger: the event source that starts an automation.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::comparison::ComparisonOperator;
use crate::error::{HomeRuleError, ValidationError};
use crate::feed::FeedReading;
use crate::id::{FeedId, PremisesId, TriggerId};
use crate::time::Timestamp;

/// Largest sunrise/sunset offset accepted, in minutes either way.
pub const MAX_SUN_OFFSET_MINUTES: i32 = 180;

/// A tenant-scoped event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub premises_id: PremisesId,
    pub config: TriggerConfig,
}

/// Discriminant of [`TriggerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Schedule,
    Voice,
    Feed,
}

impl TriggerType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Voice => "voice",
            Self::Feed => "feed",
        }
    }
}

/// Typed configuration of a [`Trigger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    Schedule(ScheduleTriggerConfig),
    Voice(VoiceTriggerConfig),
    Feed(FeedTriggerConfig),
}

impl TriggerConfig {
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Schedule(_) => TriggerType::Schedule,
            Self::Voice(_) => TriggerType::Voice,
            Self::Feed(_) => TriggerType::Feed,
        }
    }

    /// Check the configuration is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Validation`] for blank voice commands, sun
    /// offsets beyond [`MAX_SUN_OFFSET_MINUTES`], or non-finite thresholds.
    pub fn validate(&self) -> Result<(), HomeRuleError> {
        match self {
            Self::Schedule(schedule) => {
                if let ScheduleAt::Sun { offset_minutes, .. } = schedule.at
                    && offset_minutes.abs() > MAX_SUN_OFFSET_MINUTES
                {
                    return Err(ValidationError::SunOffsetOutOfRange {
                        minutes: offset_minutes,
                    }
                    .into());
                }
            }
            Self::Voice(voice) => {
                if voice.commands.is_empty() {
                    return Err(ValidationError::EmptyVoiceCommands.into());
                }
                if voice.commands.iter().any(|c| c.trim().is_empty()) {
                    return Err(ValidationError::BlankVoiceCommand.into());
                }
            }
            Self::Feed(feed) => {
                if !feed.threshold.is_finite() {
                    return Err(ValidationError::NonFiniteValue.into());
                }
            }
        }
        Ok(())
    }
}

/// Day of the week, ordered Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<chrono::Weekday> for DayOfWeek {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// Solar event a sun-relative schedule is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SunEvent {
    Sunrise,
    Sunset,
}

/// Sunrise and sunset for one premises on one day, supplied by an external
/// time source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
}

impl SunTimes {
    #[must_use]
    pub fn time_of(&self, event: SunEvent) -> NaiveTime {
        match event {
            SunEvent::Sunrise => self.sunrise,
            SunEvent::Sunset => self.sunset,
        }
    }
}

/// When in the day a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ScheduleAt {
    /// A fixed wall-clock time.
    Time { time: NaiveTime },
    /// A solar event shifted by `offset_minutes` (negative means before).
    Sun {
        event: SunEvent,
        #[serde(default)]
        offset_minutes: i32,
    },
}

/// Fires at a time of day on selected weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTriggerConfig {
    pub at: ScheduleAt,
    /// Days the schedule fires on; empty means every day.
    #[serde(default)]
    pub repeat: BTreeSet<DayOfWeek>,
}

/// A minute-resolution clock tick delivered by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTick {
    pub day: DayOfWeek,
    pub time: NaiveTime,
}

impl ScheduleTick {
    /// Truncate a timestamp to the minute it falls in.
    #[must_use]
    pub fn at(ts: Timestamp) -> Self {
        let time = NaiveTime::from_hms_opt(ts.hour(), ts.minute(), 0).unwrap_or(NaiveTime::MIN);
        Self {
            day: ts.weekday().into(),
            time,
        }
    }
}

impl ScheduleTriggerConfig {
    /// Time of day this schedule fires, when it can be determined.
    ///
    /// Sun-relative schedules need `sun`; without it they have no firing time.
    #[must_use]
    pub fn firing_time(&self, sun: Option<&SunTimes>) -> Option<NaiveTime> {
        match self.at {
            ScheduleAt::Time { time } => Some(time),
            ScheduleAt::Sun {
                event,
                offset_minutes,
            } => sun.map(|sun| {
                let (shifted, _) = sun
                    .time_of(event)
                    .overflowing_add_signed(chrono::Duration::minutes(i64::from(offset_minutes)));
                shifted
            }),
        }
    }

    /// Whether this schedule is due at `tick`.
    #[must_use]
    pub fn is_due(&self, tick: &ScheduleTick, sun: Option<&SunTimes>) -> bool {
        if !self.repeat.is_empty() && !self.repeat.contains(&tick.day) {
            return false;
        }
        self.firing_time(sun).is_some_and(|time| {
            time.hour() == tick.time.hour() && time.minute() == tick.time.minute()
        })
    }

    #[must_use]
    pub fn is_sun_relative(&self) -> bool {
        matches!(self.at, ScheduleAt::Sun { .. })
    }
}

/// Fires when a spoken command matches one of the configured phrases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTriggerConfig {
    pub commands: Vec<String>,
}

/// Lowercased words, with surrounding punctuation stripped.
fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

impl VoiceTriggerConfig {
    /// Case- and whitespace-insensitive match of a whole phrase: the heard
    /// command equals a configured phrase or contains it as consecutive words.
    #[must_use]
    pub fn matches(&self, command: &str) -> bool {
        let heard = words(command);
        self.commands.iter().map(String::as_str).map(words).any(|phrase| {
            !phrase.is_empty() && heard.windows(phrase.len()).any(|window| window == phrase.as_slice())
        })
    }
}

/// Fires when a feed reading starts satisfying `operator` against `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedTriggerConfig {
    pub feed_id: FeedId,
    pub operator: ComparisonOperator,
    pub threshold: f64,
}

impl FeedTriggerConfig {
    /// Whether `value` is on the firing side of the threshold.
    #[must_use]
    pub fn holds_for(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }

    /// Edge-triggered: fires only when `reading` crosses into the firing
    /// side. Readings that stay on it do not fire again.
    #[must_use]
    pub fn fires_on(&self, reading: &FeedReading) -> bool {
        self.feed_id == reading.feed_id
            && !self.holds_for(reading.previous)
            && self.holds_for(reading.value)
    }
}

impl Trigger {
    #[must_use]
    pub fn new(premises_id: PremisesId, config: TriggerConfig) -> Self {
        Self {
            id: TriggerId::new(),
            premises_id,
            config,
        }
    }

    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        self.config.trigger_type()
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.config {
            TriggerConfig::Schedule(schedule) => match schedule.at {
                ScheduleAt::Time { time } => write!(f, "schedule({})", time.format("%H:%M")),
                ScheduleAt::Sun {
                    event,
                    offset_minutes,
                } => write!(f, "schedule({event:?}{offset_minutes:+}m)"),
            },
            TriggerConfig::Voice(voice) => write!(f, "voice({})", voice.commands.join("|")),
            TriggerConfig::Feed(feed) => {
                write!(f, "feed({} {} {})", feed.feed_id, feed.operator, feed.threshold)
            }
        }
    }
}
