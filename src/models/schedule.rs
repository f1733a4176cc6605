//! Schedule descriptors and similar-item filter rules.
//!
//! A descriptor looks like `"Tue Thu 09:00-10:00"`: a set of day tokens
//! followed by an optional time range. Filter rules compare against the
//! parsed form, never against the raw string.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Day of the week as it appears in a schedule descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Day {
    pub fn as_str(&self) -> &'static str {
        match self {
            Day::Mon => "Mon",
            Day::Tue => "Tue",
            Day::Wed => "Wed",
            Day::Thu => "Thu",
            Day::Fri => "Fri",
            Day::Sat => "Sat",
            Day::Sun => "Sun",
        }
    }
}

impl FromStr for Day {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mon" | "monday" => Ok(Day::Mon),
            "tue" | "tues" | "tuesday" => Ok(Day::Tue),
            "wed" | "wednesday" => Ok(Day::Wed),
            "thu" | "thur" | "thurs" | "thursday" => Ok(Day::Thu),
            "fri" | "friday" => Ok(Day::Fri),
            "sat" | "saturday" => Ok(Day::Sat),
            "sun" | "sunday" => Ok(Day::Sun),
            _ => Err(AppError::schedule(s, "unknown day token")),
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty set of days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DaySet(BTreeSet<Day>);

impl DaySet {
    /// Parse whitespace, comma or slash separated day tokens.
    pub fn parse(s: &str) -> Result<Self> {
        let days = s
            .split(|c: char| c.is_whitespace() || c == ',' || c == '/')
            .filter(|token| !token.is_empty())
            .map(str::parse)
            .collect::<Result<BTreeSet<Day>>>()?;

        if days.is_empty() {
            return Err(AppError::schedule(s, "no day tokens"));
        }
        Ok(Self(days))
    }

    pub fn contains(&self, day: Day) -> bool {
        self.0.contains(&day)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Day> for DaySet {
    fn from_iter<I: IntoIterator<Item = Day>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<&str> = self.0.iter().map(Day::as_str).collect();
        f.write_str(&tokens.join(" "))
    }
}

/// A `HH:MM-HH:MM` meeting time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn parse(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| AppError::schedule(s, "expected HH:MM-HH:MM"))?;

        let start =
            NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|e| AppError::schedule(s, e))?;
        let end =
            NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|e| AppError::schedule(s, e))?;

        if end <= start {
            return Err(AppError::schedule(s, "end must be after start"));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Parsed schedule descriptor of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schedule {
    pub days: DaySet,
    pub time: Option<TimeRange>,
}

fn descriptor_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^\s*(?P<days>[A-Za-z][A-Za-z,/\s]*?)\s*(?P<time>\d{1,2}:\d{2}\s*-\s*\d{1,2}:\d{2})?\s*$")
        })
        .as_ref()
        .map_err(|e| AppError::config(format!("schedule pattern: {e}")))
}

impl Schedule {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let caps = descriptor_pattern()?
            .captures(descriptor)
            .ok_or_else(|| AppError::schedule(descriptor, "unrecognized descriptor"))?;

        let days = DaySet::parse(&caps["days"])?;
        let time = caps
            .name("time")
            .map(|m| TimeRange::parse(m.as_str()))
            .transpose()?;

        Ok(Self { days, time })
    }

    /// Parse a descriptor, treating anything unparseable (e.g. "TBA") as unscheduled.
    pub fn parse_lenient(descriptor: &str) -> Option<Self> {
        match Self::parse(descriptor) {
            Ok(schedule) => Some(schedule),
            Err(e) => {
                log::debug!("Treating schedule as unscheduled: {}", e);
                None
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.time {
            Some(time) => write!(f, "{} {}", self.days, time),
            None => write!(f, "{}", self.days),
        }
    }
}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Schedule::parse(&raw).map_err(de::Error::custom)
    }
}

/// Serde helper: an unparseable descriptor deserializes to `None`.
pub(crate) fn lenient_schedule<'de, D>(deserializer: D) -> std::result::Result<Option<Schedule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Schedule::parse_lenient))
}

/// One similar-item filter of a watch rule.
///
/// Built from untrusted subscription data. Anything that does not parse
/// becomes `Unrecognized`, which never matches.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterRule {
    Pattern {
        days: DaySet,
        times: Vec<TimeRange>,
    },
    Unrecognized {
        raw: Value,
        reason: String,
    },
}

impl FilterRule {
    pub fn pattern(days: &str, times: &[&str]) -> Result<Self> {
        Ok(Self::Pattern {
            days: DaySet::parse(days)?,
            times: times
                .iter()
                .map(|t| TimeRange::parse(t))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Days must be equal; times, when present, must contain the item's time.
    pub fn matches(&self, schedule: Option<&Schedule>) -> bool {
        match self {
            FilterRule::Pattern { days, times } => {
                let Some(schedule) = schedule else {
                    return false;
                };
                if &schedule.days != days {
                    return false;
                }
                times.is_empty() || schedule.time.is_some_and(|t| times.contains(&t))
            }
            FilterRule::Unrecognized { .. } => false,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, FilterRule::Pattern { .. })
    }

    fn from_value(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| AppError::validation("filter rule must be an object"))?;

        let days = obj
            .get("days")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation("filter rule needs a 'days' string"))?;

        let times = match obj.get("times") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .ok_or_else(|| AppError::validation("'times' entries must be strings"))
                        .and_then(TimeRange::parse)
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(AppError::validation("'times' must be an array")),
        };

        Ok(Self::Pattern {
            days: DaySet::parse(days)?,
            times,
        })
    }
}

impl From<Value> for FilterRule {
    fn from(raw: Value) -> Self {
        match Self::from_value(&raw) {
            Ok(rule) => rule,
            Err(e) => FilterRule::Unrecognized {
                raw,
                reason: e.to_string(),
            },
        }
    }
}

impl From<&FilterRule> for Value {
    fn from(rule: &FilterRule) -> Self {
        match rule {
            FilterRule::Pattern { days, times } => serde_json::json!({
                "days": days.to_string(),
                "times": times.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }),
            FilterRule::Unrecognized { raw, .. } => raw.clone(),
        }
    }
}

impl Serialize for FilterRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(FilterRule::from(Value::deserialize(deserializer)?))
    }
}

/// OR across rules; an empty list matches unconditionally.
pub fn filters_match(rules: &[FilterRule], schedule: Option<&Schedule>) -> bool {
    rules.is_empty() || rules.iter().any(|rule| rule.matches(schedule))
}
