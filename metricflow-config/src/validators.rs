//! Leaf value parsers used by the schema engine
//!
//! These are plain functions returning `Result<_, String>`; the schema engine attaches
//! the path of the value being validated.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

/// Maximum number of re-expansion rounds for environment variables
pub const MAX_ENV_DEPTH: usize = 16;

/// Characters allowed in module and task names besides ascii letters and digits
pub const NAME_SPECIAL_CHARS: &str = "_-.+";

static ENV_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env pattern"));

static DURATION_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)([a-zA-Z]+)$").expect("valid duration pattern"));

/// Expand `${NAME}` references from the process environment
///
/// Expansion is repeated while it changes the string, so a variable may reference other
/// variables. Unset variables are left verbatim.
pub fn expand_env(value: &str) -> Result<String, String> {
    expand_env_with(value, MAX_ENV_DEPTH, |name| std::env::var(name).ok())
}

/// Expand environment references with a custom lookup
pub fn expand_env_with<F>(value: &str, depth: usize, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut current = value.to_string();
    let mut remaining = depth as isize;

    loop {
        let expanded = ENV_PATTERN
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        if expanded == current {
            return Ok(current);
        }

        remaining -= 1;
        if remaining < 0 {
            return Err("Max depth reached while expanding environment variables.".to_string());
        }
        current = expanded;
    }
}

/// Parse a duration into seconds
///
/// Accepts plain numbers (`"5"`, `"2.5"`) and `:`-joined `<number><unit>` parts with the
/// units `ms`, `s`, `m`, `h` and `d`, e.g. `"1h:30m:15s"`. A leading `-` negates the total.
pub fn parse_duration(value: &str) -> Result<f64, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds as f64);
    }
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() {
            return Ok(seconds);
        }
    }

    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut total = 0.0;
    for part in body.split(':') {
        if part.trim().is_empty() {
            continue;
        }
        let caps = DURATION_PART
            .captures(part.trim())
            .ok_or_else(|| format!("Invalid time format `{part}` not parsable!"))?;

        let amount: f64 = caps[1]
            .parse()
            .map_err(|_| format!("Invalid time format `{part}` not parsable!"))?;
        let factor = match caps[2].to_ascii_lowercase().as_str() {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "d" => 86400.0,
            _ => return Err(format!("Invalid time format `{part}` not parsable!")),
        };
        total += amount * factor;
    }

    Ok(if negative { -total } else { total })
}

/// Duration seconds as a JSON number, integral values stay integers
pub fn seconds_to_json(seconds: f64) -> Value {
    if seconds.fract() == 0.0 && seconds.abs() < i64::MAX as f64 {
        Value::Number(Number::from(seconds as i64))
    } else {
        Number::from_f64(seconds).map_or(Value::Null, Value::Number)
    }
}

/// Validate a module or task name
pub fn validate_name(value: &str, allow_uppercase: bool) -> Result<String, String> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || NAME_SPECIAL_CHARS.contains(c));

    if !valid {
        return Err(format!(
            "Module `{value}` contains invalid characters. Allowed: `a-zA-Z0-9{NAME_SPECIAL_CHARS}`"
        ));
    }

    Ok(if allow_uppercase {
        value.to_string()
    } else {
        value.to_lowercase()
    })
}

/// Interpret a value as boolean, accepting common string spellings
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().and_then(|n| match n {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "enable" => Some(true),
            "0" | "false" | "no" | "off" | "disable" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// A parsed 5-field cron expression
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parse `minute hour day-of-month month day-of-week`, missing fields default to `*`
    pub fn parse(value: &str) -> Result<Self, String> {
        let invalid = || format!("`{value}` is not a valid string with cron syntax");

        let mut fields: Vec<String> = value.split_whitespace().map(str::to_string).collect();
        if fields.is_empty() || fields.len() > 5 {
            return Err(invalid());
        }
        while fields.len() < 5 {
            fields.push("*".to_string());
        }
        fields[4] = translate_weekdays(&fields[4]).ok_or_else(invalid)?;

        let expression = format!("0 {}", fields.join(" "));
        let schedule = cron::Schedule::from_str(&expression).map_err(|_| invalid())?;

        Ok(Self {
            expression: value.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

/// Day number of the cron parser for a `0-7` weekday (0 and 7 are Sunday)
fn cron_weekday(day: u8) -> u8 {
    day % 7 + 1
}

/// Convert `0-7` weekday numbers to the `1-7` numbering of the cron parser
///
/// Numeric ranges are expanded to day lists, so ranges ending on Sunday stay ascending.
/// Day names and `*` pass through.
fn translate_weekdays(field: &str) -> Option<String> {
    let mut items = Vec::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };

        let bounds: Vec<&str> = base.split('-').collect();
        let numbers: Vec<u8> = bounds.iter().filter_map(|b| b.parse::<u8>().ok()).collect();
        if numbers.len() != bounds.len() {
            // Names or `*`
            items.push(item.to_string());
            continue;
        }
        if numbers.iter().any(|day| *day > 7) {
            return None;
        }

        let (first, last) = match numbers[..] {
            [day] if step.is_some() => (day, 6),
            [day] => {
                items.push(cron_weekday(day).to_string());
                continue;
            }
            [first, last] if first <= last => (first, last),
            _ => return None,
        };
        let step = match step {
            Some(step) => step.parse::<usize>().ok().filter(|s| *s > 0)?,
            None => 1,
        };

        let days: BTreeSet<u8> = (first..=last).step_by(step).map(cron_weekday).collect();
        items.extend(days.into_iter().map(|day| day.to_string()));
    }
    Some(items.join(","))
}
