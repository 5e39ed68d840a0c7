//! Value parsers for the environment loader.

use std::collections::HashMap;
use std::time::Duration;

use super::ConfigError;

/// Parse a Go-style duration string such as `300ms`, `15s` or `1h30m`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Components may carry a
/// decimal fraction (`1.5s`). A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in {input:?}"))?;
        let (number, tail) = rest.split_at(num_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            other => return Err(format!("unknown unit {other:?} in {input:?}")),
        };

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(format!("expected a number in {input:?}"));
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("invalid number {number:?}"))?
        };
        let mut component = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| format!("duration {input:?} overflows"))?;
        if !frac.is_empty() {
            if frac.contains('.') {
                return Err(format!("invalid number {number:?}"));
            }
            // Digits past nanosecond precision do not change the result.
            let digits = &frac[..frac.len().min(18)];
            let frac_value: u128 = digits
                .parse()
                .map_err(|_| format!("invalid number {number:?}"))?;
            component += frac_value * unit_nanos / 10u128.pow(digits.len() as u32);
        }

        total_nanos = total_nanos
            .checked_add(component)
            .ok_or_else(|| format!("duration {input:?} overflows"))?;
        rest = next;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| format!("duration {input:?} overflows"))?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

/// A request count: a whole number above zero.
pub fn parse_max_requests(input: &str) -> Result<u64, String> {
    let value: u64 = input
        .trim()
        .parse()
        .map_err(|_| format!("{input:?} is not a positive integer"))?;
    if value == 0 {
        return Err("must be greater than zero".to_string());
    }
    Ok(value)
}

/// Longest block duration accepted: the millisecond range of Redis `PEXPIRE`.
pub const MAX_BLOCK_DURATION: Duration = Duration::from_millis(i64::MAX as u64);

/// A block duration: a Go-style duration above zero and at most
/// [`MAX_BLOCK_DURATION`].
pub fn parse_block_duration(input: &str) -> Result<Duration, String> {
    let value = parse_duration(input)?;
    if value.is_zero() {
        return Err("must be greater than zero".to_string());
    }
    if value > MAX_BLOCK_DURATION {
        return Err(format!("must be at most {MAX_BLOCK_DURATION:?}"));
    }
    Ok(value)
}

/// Parse `id=value;id=value` override lists.
///
/// Pairs without exactly one `=` are skipped. A pair whose value does not
/// parse fails the whole list. A repeated identifier keeps its last value.
pub fn parse_overrides<T>(
    key: &str,
    raw: &str,
    parse_value: impl Fn(&str) -> Result<T, String>,
) -> Result<HashMap<String, T>, ConfigError> {
    let mut overrides = HashMap::new();

    for pair in raw.split(';') {
        let parts: Vec<&str> = pair.split('=').collect();
        let [identifier, value] = parts.as_slice() else {
            continue;
        };
        let (identifier, value) = (identifier.trim(), value.trim());

        let parsed = parse_value(value).map_err(|reason| ConfigError::Invalid {
            key: format!("{key}[{identifier}]"),
            value: value.to_string(),
            reason,
        })?;
        overrides.insert(identifier.to_string(), parsed);
    }

    Ok(overrides)
}
