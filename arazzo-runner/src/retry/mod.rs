use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

/// Delay requested by a `Retry-After` header, either delta-seconds or an
/// HTTP-date. Dates in the past yield `None`.
pub fn parse_retry_after(headers: &BTreeMap<String, String>, now: SystemTime) -> Option<Duration> {
    let v = get_header_ci(headers, "retry-after")?.trim();
    if let Ok(secs) = v.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = v.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Some(Duration::from_secs_f64(secs));
        }
    }
    let at = parse_http_date(v).ok()?;
    at.duration_since(now).ok()
}

/// The delay the workflow driver waits before retrying a step: the larger of
/// the server's request and the action's `retryAfter`, capped at `max`.
pub fn retry_delay(server: Option<Duration>, action_secs: Option<f64>, max: Duration) -> Duration {
    let action = action_secs
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or_default();
    server.unwrap_or_default().max(action).min(max)
}

pub(crate) fn get_header_ci<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(v: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("Retry-After".to_string(), v.to_string())])
    }

    #[test]
    fn parses_seconds_and_dates() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        assert_eq!(parse_retry_after(&headers("7"), now), Some(Duration::from_secs(7)));

        let later = httpdate::fmt_http_date(now + Duration::from_secs(30));
        assert_eq!(parse_retry_after(&headers(&later), now), Some(Duration::from_secs(30)));

        let earlier = httpdate::fmt_http_date(now - Duration::from_secs(30));
        assert_eq!(parse_retry_after(&headers(&earlier), now), None);
        assert_eq!(parse_retry_after(&BTreeMap::new(), now), None);
    }

    #[test]
    fn delay_takes_larger_and_caps() {
        let max = Duration::from_secs(10);
        assert_eq!(retry_delay(Some(Duration::from_secs(2)), Some(5.0), max), Duration::from_secs(5));
        assert_eq!(retry_delay(Some(Duration::from_secs(60)), None, max), max);
        assert_eq!(retry_delay(None, None, max), Duration::ZERO);
    }
}
