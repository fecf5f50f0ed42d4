use chrono::NaiveDate;
use regex::Regex;

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// First substring that looks like a US-style amount: optional `$`, digits
/// with optional thousands separators, optional two-digit fraction.
///
/// Only the first match is used; no attempt to tell a subtotal from a grand
/// total. The user corrects the prefill when the guess is wrong.
pub(super) fn extract_amount(text: &str) -> Option<f64> {
    let re = Regex::new(r"\$?\s*(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)").ok()?;
    let cap = re.captures(text)?;
    cap[1].replace(',', "").parse().ok()
}

// ---------------------------------------------------------------------------
// Date
// ---------------------------------------------------------------------------

/// Date-shape rules in priority order. Each textual pattern is paired with
/// the format templates to attempt, in order; the first rule whose pattern
/// matches and whose templates yield a parse wins, and later rules are never
/// consulted once a date is found.
const DATE_RULES: &[(&str, &[&str])] = &[
    // US month-first, slash or hyphen, 2-or-4-digit year
    (
        r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}",
        &[
            "%m/%d/%Y",
            "%m-%d-%Y",
            "%-m/%-d/%Y",
            "%-m-%-d-%Y",
            "%m/%d/%y",
            "%m-%d-%y",
        ],
    ),
    // Year-first
    (
        r"\d{4}[/-]\d{1,2}[/-]\d{1,2}",
        &["%Y-%m-%d", "%Y/%m/%d", "%Y-%-m-%-d", "%Y/%-m/%-d"],
    ),
    // Long month-name form, with or without comma
    (
        r"[A-Z][a-z]+\s+\d{1,2},?\s+\d{4}",
        &["%B %d, %Y", "%B %d %Y", "%b %d, %Y", "%b %d %Y"],
    ),
];

pub(super) fn extract_date(text: &str) -> Option<NaiveDate> {
    for (pattern, formats) in DATE_RULES {
        let Some(found) = Regex::new(pattern).ok()?.find(text) else {
            continue;
        };
        for format in *formats {
            if let Ok(date) = NaiveDate::parse_from_str(found.as_str(), format) {
                return Some(date);
            }
        }
        // Pattern matched but nothing parsed: fall through to the next rule.
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dollar_amount_with_thousands_separators() {
        assert_eq!(extract_amount("Total: $1,234.56 due"), Some(1234.56));
    }

    #[test]
    fn plain_decimal_and_bare_integer_amounts() {
        assert_eq!(extract_amount("amount 45.00 paid"), Some(45.0));
        assert_eq!(extract_amount("balance 300"), Some(300.0));
    }

    #[test]
    fn text_without_digits_yields_no_amount() {
        assert_eq!(extract_amount("no charge, with our compliments"), None);
        assert_eq!(extract_amount(""), None);
    }

    #[test]
    fn first_amount_wins_even_when_a_total_follows() {
        assert_eq!(
            extract_amount("Subtotal $10.00 Tax $0.80 Total $10.80"),
            Some(10.0)
        );
    }

    #[test]
    fn us_slash_and_hyphen_dates() {
        assert_eq!(extract_date("Date: 12/31/2024"), Some(ymd(2024, 12, 31)));
        assert_eq!(extract_date("Date: 03-05-2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(extract_date("Date: 3/5/2024"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn year_first_dates() {
        assert_eq!(extract_date("issued 2024-05-01"), Some(ymd(2024, 5, 1)));
        assert_eq!(extract_date("issued 2024/05/01"), Some(ymd(2024, 5, 1)));
    }

    #[test]
    fn month_name_dates_full_and_abbreviated() {
        assert_eq!(extract_date("due May 2, 2024"), Some(ymd(2024, 5, 2)));
        assert_eq!(extract_date("due March 15 2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(extract_date("due Jan 7, 2025"), Some(ymd(2025, 1, 7)));
    }

    #[test]
    fn earlier_rule_family_preempts_later_ones() {
        // Both an ISO date and a month-name date are present; the year-first
        // family outranks the month-name family.
        assert_eq!(
            extract_date("Scanned 2024-05-01, printed May 2, 2024"),
            Some(ymd(2024, 5, 1))
        );
    }

    #[test]
    fn iso_dates_survive_the_us_family_probe() {
        // The US-family pattern matches the "24-05-01" tail of an ISO date but
        // no US template parses it; the year-first family must still win.
        assert_eq!(extract_date("2024-05-01"), Some(ymd(2024, 5, 1)));
    }

    #[test]
    fn text_without_dates_yields_none() {
        assert_eq!(extract_date("pay on receipt"), None);
    }

    #[test]
    fn amount_and_date_extract_independently() {
        let fields = crate::heuristics::extract_fields("Total $88.20, no date here");
        assert_eq!(fields.amount, Some(88.2));
        assert_eq!(fields.date, None);

        let fields = crate::heuristics::extract_fields("nothing recognizable at all");
        assert_eq!(fields.amount, None);
        assert_eq!(fields.date, None);
    }
}
