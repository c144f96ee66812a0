//! Display helpers shared by the table, chart and CLI layers.

use chrono::{DateTime, Utc};

const TURN_MILLIS: i64 = 2 * 60 * 60 * 1000;

/// Alliance display name, falling back to `AA:<id>` when blank.
pub fn format_alliance_name(name: Option<&str>, id: i64) -> String {
    match name.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => format!("AA:{}", id),
    }
}

/// Nation display name, falling back to `nation:<id>` when blank.
pub fn format_nation_name(name: Option<&str>, id: i64) -> String {
    match name.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => format!("nation:{}", id),
    }
}

/// Parses loosely typed alliance ids, keeping only positive integers.
pub fn normalize_alliance_ids(raw: &[&str]) -> Vec<i64> {
    raw.iter()
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .filter(|id| id.is_finite() && *id > 0.0 && id.fract() == 0.0)
        .map(|id| id as i64)
        .collect()
}

/// Thousands separators without locale lookups.
pub fn commafy(num: f64) -> String {
    let text = num.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };
    let digits: Vec<char> = int_part.chars().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 8);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    if num < 0.0 {
        format!("-{}", out)
    } else {
        out
    }
}

fn format_utc_millis(ms: i64) -> String {
    let Some(date) = DateTime::<Utc>::from_timestamp_millis(ms) else {
        return "N/A".to_string();
    };
    let formatted = date.format("%Y-%m-%d %H:%M").to_string();
    if formatted.ends_with("00:00") {
        formatted[..10].to_string()
    } else {
        formatted
    }
}

/// Epoch millis to `YYYY-MM-DD[ HH:MM]`; `-1` is the "ongoing" sentinel.
pub fn format_date(ms: Option<i64>) -> String {
    match ms {
        None | Some(-1) => "N/A".to_string(),
        Some(ms) => format_utc_millis(ms),
    }
}

/// Turn ticks (2 hours each, counted from the epoch) to a date string.
pub fn format_turns_to_date(turn: i64) -> String {
    format_utc_millis(turn.saturating_mul(TURN_MILLIS))
}

pub fn format_days_to_date(day: i64) -> String {
    format_turns_to_date(day.saturating_mul(12))
}

/// Human readable duration, e.g. `1 year, 2 days and 3 seconds`.
pub fn format_duration(secs: u64) -> String {
    const UNITS: [(u64, &str); 6] = [
        (31_536_000, "year"),
        (604_800, "week"),
        (86_400, "day"),
        (3_600, "hour"),
        (60, "minute"),
        (1, "second"),
    ];
    let mut rest = secs;
    let mut parts = Vec::new();
    for (size, word) in UNITS {
        let n = rest / size;
        rest -= n * size;
        if n > 0 {
            parts.push(format!("{} {}{}", n, word, if n != 1 { "s" } else { "" }));
        }
    }
    match parts.len() {
        0 => String::new(),
        1 => parts.remove(0),
        _ => {
            let last = parts.pop().unwrap_or_default();
            format!("{} and {}", parts.join(", "), last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alliance_name_falls_back_to_id() {
        assert_eq!(format_alliance_name(Some("  Rose "), 7), "Rose");
        assert_eq!(format_alliance_name(Some("   "), 7), "AA:7");
        assert_eq!(format_alliance_name(None, 9), "AA:9");
        assert_eq!(format_nation_name(None, 3), "nation:3");
    }

    #[test]
    fn normalize_ids_drops_junk() {
        assert_eq!(
            normalize_alliance_ids(&["12", " 4 ", "abc", "0", "-3", "2.5", "NaN"]),
            vec![12, 4]
        );
    }

    #[test]
    fn commafy_groups_thousands() {
        assert_eq!(commafy(0.0), "0");
        assert_eq!(commafy(999.0), "999");
        assert_eq!(commafy(1000.0), "1,000");
        assert_eq!(commafy(1234567.0), "1,234,567");
        assert_eq!(commafy(-1234.5), "-1,234.5");
    }

    #[test]
    fn dates_drop_midnight_time() {
        assert_eq!(format_date(Some(-1)), "N/A");
        assert_eq!(format_date(None), "N/A");
        assert_eq!(format_date(Some(0)), "1970-01-01");
        assert_eq!(format_date(Some(90 * 60 * 1000)), "1970-01-01 01:30");
        assert_eq!(format_turns_to_date(13), "1970-01-02 02:00");
        assert_eq!(format_days_to_date(1), "1970-01-02");
    }

    #[test]
    fn duration_joins_with_and() {
        assert_eq!(format_duration(0), "");
        assert_eq!(format_duration(1), "1 second");
        assert_eq!(format_duration(31_536_000 + 2 * 86_400 + 3), "1 year, 2 days and 3 seconds");
        assert_eq!(format_duration(3_660), "1 hour and 1 minute");
    }
}
