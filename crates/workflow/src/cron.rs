//! Five-field cron matching: `minute hour day-of-month month day-of-week`.
//!
//! Each field is `*`, `N`, `A-B`, `*/S`, `A-B/S`, or a comma list of those.
//! A field matches when any of its atoms does; a schedule matches when all
//! five fields do. Day-of-week 0 is Sunday.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};

use crate::error::ScheduleSyntaxError;

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const FIELDS: [FieldSpec; 5] = [
    FieldSpec { name: "minute", min: 0, max: 59 },
    FieldSpec { name: "hour", min: 0, max: 23 },
    FieldSpec { name: "day-of-month", min: 1, max: 31 },
    FieldSpec { name: "month", min: 1, max: 12 },
    FieldSpec { name: "day-of-week", min: 0, max: 6 },
];

/// Set of accepted values for one field, one bit per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FieldMask(u64);

impl FieldMask {
    fn insert(&mut self, value: u32) {
        self.0 |= 1 << value;
    }

    fn insert_stepped(&mut self, start: u32, end: u32, step: u32) {
        let mut v = start;
        while v <= end {
            self.insert(v);
            v += step;
        }
    }

    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

/// A validated cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    source: String,
    fields: [FieldMask; 5],
}

impl CronSchedule {
    /// Parse and validate every atom of every field.
    pub fn parse(schedule: &str) -> Result<Self, ScheduleSyntaxError> {
        let parts: Vec<&str> = schedule.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(syntax_error(
                schedule,
                format!(
                    "expected 5 fields (minute hour day-of-month month day-of-week), got {}",
                    parts.len()
                ),
            ));
        }

        let mut fields = [FieldMask::default(); 5];
        for (i, (part, spec)) in parts.iter().zip(FIELDS.iter()).enumerate() {
            fields[i] = parse_field(part, spec).map_err(|reason| syntax_error(schedule, reason))?;
        }

        Ok(Self {
            source: schedule.trim().to_string(),
            fields,
        })
    }

    /// The schedule text as given (trimmed).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the wall-clock fields of `at` satisfy all five fields.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let values = [
            at.minute(),
            at.hour(),
            at.day(),
            at.month(),
            at.weekday().num_days_from_sunday(),
        ];
        self.fields
            .iter()
            .zip(values)
            .all(|(mask, value)| mask.contains(value))
    }

    /// The first whole minute strictly after `after` that matches, searching
    /// up to four years ahead (enough for any Feb 29 schedule).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let start = after.clone() - Duration::seconds(i64::from(after.second()))
            - Duration::nanoseconds(i64::from(after.nanosecond()));
        let mut candidate = start + Duration::minutes(1);
        let limit = after.clone() + Duration::days(4 * 366);
        while candidate <= limit {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for CronSchedule {
    type Err = ScheduleSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Evaluate `schedule` against `at`.
pub fn matches<Tz: TimeZone>(schedule: &str, at: &DateTime<Tz>) -> Result<bool, ScheduleSyntaxError> {
    Ok(CronSchedule::parse(schedule)?.matches(at))
}

fn syntax_error(schedule: &str, reason: String) -> ScheduleSyntaxError {
    ScheduleSyntaxError {
        schedule: schedule.to_string(),
        reason,
    }
}

fn parse_field(field: &str, spec: &FieldSpec) -> Result<FieldMask, String> {
    let mut mask = FieldMask::default();
    for atom in field.split(',') {
        parse_atom(atom, spec, &mut mask)
            .map_err(|detail| format!("{} field: invalid atom `{atom}` ({detail})", spec.name))?;
    }
    Ok(mask)
}

fn parse_atom(atom: &str, spec: &FieldSpec, mask: &mut FieldMask) -> Result<(), String> {
    if let Some((base, step)) = atom.split_once('/') {
        let step: u32 = step
            .parse()
            .map_err(|_| format!("step `{step}` is not a positive integer"))?;
        if step == 0 {
            return Err("step must be positive".into());
        }
        let (start, end) = if base == "*" {
            (spec.min, spec.max)
        } else if base.contains('-') {
            parse_range(base, spec)?
        } else {
            return Err("step base must be `*` or a range".into());
        };
        mask.insert_stepped(start, end, step);
    } else if atom == "*" {
        mask.insert_stepped(spec.min, spec.max, 1);
    } else if atom.contains('-') {
        let (start, end) = parse_range(atom, spec)?;
        mask.insert_stepped(start, end, 1);
    } else {
        mask.insert(parse_value(atom, spec)?);
    }
    Ok(())
}

/// An `A-B` range with both ends validated. `A > B` accepts nothing.
fn parse_range(range: &str, spec: &FieldSpec) -> Result<(u32, u32), String> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| format!("`{range}` is not a range"))?;
    Ok((parse_value(start, spec)?, parse_value(end, spec)?))
}

fn parse_value(value: &str, spec: &FieldSpec) -> Result<u32, String> {
    let v: u32 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if v < spec.min || v > spec.max {
        return Err(format!("{v} out of range {}-{}", spec.min, spec.max));
    }
    Ok(v)
}
