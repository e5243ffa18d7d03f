use std::time::Duration;

/// Parses a duration string into a number of milliseconds.
///
/// Accepts any sequence of `<digits><unit>` pairs where unit is one of
/// `s`, `m`, `h` or `d`, e.g. `1d1h1m1s`. Returns `None` on malformed input
/// or overflow.
///
/// # Examples
///
/// ```
/// use pkgcrawl_utils::time::parse_duration;
///
/// assert_eq!(parse_duration("1m30s"), Some(90_000));
/// ```
pub fn parse_duration(input: &str) -> Option<u128> {
    let mut total: u128 = 0;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut number_str = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                number_str.push(chars.next()?);
            } else {
                break;
            }
        }

        if number_str.is_empty() {
            return None;
        }

        let number: u128 = number_str.parse().ok()?;
        let multiplier = match chars.next()? {
            's' => 1000,
            'm' => 60 * 1000,
            'h' => 60 * 60 * 1000,
            'd' => 24 * 60 * 60 * 1000,
            _ => return None,
        };

        total = total.checked_add(number.checked_mul(multiplier)?)?;
    }

    Some(total)
}

/// Like [`parse_duration`], but returns a [`Duration`].
pub fn parse_std_duration(input: &str) -> Option<Duration> {
    let millis = parse_duration(input)?;
    u64::try_from(millis).ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1s"), Some(1000));
        assert_eq!(parse_duration("10m"), Some(10 * 60 * 1000));
        assert_eq!(parse_duration("1h"), Some(60 * 60 * 1000));
        assert_eq!(parse_duration("1d"), Some(24 * 60 * 60 * 1000));
        assert_eq!(
            parse_duration("1d1h1m1s"),
            Some(24 * 60 * 60 * 1000 + 60 * 60 * 1000 + 60 * 1000 + 1000)
        );
        assert_eq!(parse_duration("1h1"), None);
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration("fail"), None);
        assert_eq!(parse_duration(""), Some(0));
    }

    #[test]
    fn test_integer_overflow() {
        assert_eq!(
            parse_duration("340282366920938463463374607431768211456s"),
            None
        );
    }

    #[test]
    fn test_parse_std_duration() {
        assert_eq!(parse_std_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_std_duration("bad"), None);
    }
}
