/// Parse a spreadsheet cell into a number, accepting both `1.234,56` and
/// `1,234.56` conventions.
///
/// Formatted cells carry units (`12,5 %`, `1 234,56 Kč`, `$180.40`); those
/// affixes are dropped. Blank, missing or unparseable cells yield `0.0`.
/// Sheet ingestion relies on this: a broken cell must never poison a holding
/// with NaN.
pub fn parse_locale_number(value: Option<&str>) -> f64 {
    let Some(raw) = value else {
        return 0.0;
    };

    // Plain, no-break (U+00A0), narrow no-break (U+202F) and thin spaces are
    // all `char::is_whitespace`.
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();
    let Some(cleaned) = strip_affixes(&compact) else {
        return 0.0;
    };

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => resolve_single_separator(&cleaned, ','),
        (None, Some(_)) => resolve_single_separator(&cleaned, '.'),
        (None, None) => cleaned,
    };

    match normalized.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// The numeric core of `s` with its sign: everything before the first digit
/// (bar a sign and a leading separator) and after the last digit is a unit.
/// `None` when there is no digit or the core holds anything but separators.
fn strip_affixes(s: &str) -> Option<String> {
    let first = s.find(|c: char| c.is_ascii_digit())?;
    let last = s.rfind(|c: char| c.is_ascii_digit())?;
    let (prefix, core) = (&s[..first], &s[first..=last]);

    if !core.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return None;
    }
    let mut out = String::with_capacity(core.len() + 2);
    if prefix.contains(['-', '\u{2212}']) {
        out.push('-');
    }
    if prefix.ends_with(['.', ',']) {
        out.push_str("0.");
    }
    out.push_str(core);
    Some(out)
}

/// Only one kind of separator is present: it is a decimal point when it
/// occurs once and is followed by one or two digits, otherwise every
/// occurrence groups thousands.
fn resolve_single_separator(s: &str, sep: char) -> String {
    let occurrences = s.matches(sep).count();
    let trailing = s.rsplit(sep).next().unwrap_or_default();
    let is_decimal = occurrences == 1
        && (1..=2).contains(&trailing.len())
        && trailing.chars().all(|c| c.is_ascii_digit());

    if is_decimal {
        s.replace(sep, ".")
    } else {
        s.replace(sep, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_comma_decimal_with_dot_thousands() {
        assert!(close(parse_locale_number(Some("1.234,56")), 1234.56));
    }

    #[test]
    fn test_dot_decimal_with_comma_thousands() {
        assert!(close(parse_locale_number(Some("1,234.56")), 1234.56));
    }

    #[test]
    fn test_single_comma_decimal() {
        assert!(close(parse_locale_number(Some("0,13")), 0.13));
        assert!(close(parse_locale_number(Some("12,5")), 12.5));
    }

    #[test]
    fn test_single_separator_as_thousands() {
        assert_eq!(parse_locale_number(Some("1,234")), 1234.0);
        assert_eq!(parse_locale_number(Some("1.234")), 1234.0);
        assert_eq!(parse_locale_number(Some("1.234.567")), 1234567.0);
        assert_eq!(parse_locale_number(Some("12,345,678")), 12345678.0);
    }

    #[test]
    fn test_plain_dot_decimal() {
        assert!(close(parse_locale_number(Some("123.45")), 123.45));
    }

    #[test]
    fn test_space_variants_stripped() {
        assert!(close(parse_locale_number(Some("1 234 567,8")), 1234567.8));
        assert!(close(parse_locale_number(Some("1\u{00A0}234,50")), 1234.5));
        assert!(close(parse_locale_number(Some("  2\u{202F}500  ")), 2500.0));
    }

    #[test]
    fn test_negative_values() {
        assert!(close(parse_locale_number(Some("-12,5")), -12.5));
        assert!(close(parse_locale_number(Some("-1.234,56")), -1234.56));
    }

    #[test]
    fn test_empty_and_missing_are_zero() {
        assert_eq!(parse_locale_number(Some("")), 0.0);
        assert_eq!(parse_locale_number(Some("   ")), 0.0);
        assert_eq!(parse_locale_number(None), 0.0);
    }

    #[test]
    fn test_garbage_is_zero() {
        assert_eq!(parse_locale_number(Some("n/a")), 0.0);
        assert_eq!(parse_locale_number(Some("#REF!")), 0.0);
        assert_eq!(parse_locale_number(Some("NaN")), 0.0);
        assert_eq!(parse_locale_number(Some("inf")), 0.0);
    }

    #[test]
    fn test_unit_suffixes_and_prefixes() {
        assert!(close(parse_locale_number(Some("5,23 %")), 5.23));
        assert!(close(parse_locale_number(Some("12.5%")), 12.5));
        assert!(close(parse_locale_number(Some("1 234,56 Kč")), 1234.56));
        assert!(close(parse_locale_number(Some("1 234,56 Kč.")), 1234.56));
        assert!(close(parse_locale_number(Some("$180.40")), 180.4));
        assert!(close(parse_locale_number(Some("-$12.50")), -12.5));
        assert!(close(parse_locale_number(Some("\u{2212}3,4 %")), -3.4));
        assert!(close(parse_locale_number(Some("USD 2,255.00")), 2255.0));
        assert!(close(parse_locale_number(Some(".5")), 0.5));
    }

    #[test]
    fn test_digits_split_by_text_are_zero() {
        assert_eq!(parse_locale_number(Some("12abc34")), 0.0);
        assert_eq!(parse_locale_number(Some("1-2")), 0.0);
    }

    #[test]
    fn test_formatted_values_round_trip() {
        for (formatted, expected) in [
            ("9.876,54", 9876.54),
            ("9,876.54", 9876.54),
            ("0,5", 0.5),
            ("0.5", 0.5),
            ("1.000.000,01", 1_000_000.01),
        ] {
            assert!(close(parse_locale_number(Some(formatted)), expected), "{formatted}");
        }
    }
}
