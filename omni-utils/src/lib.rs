//! Shared utility functions for the omni crates.

/// Date utility functions
pub mod dates {
    use chrono::{Duration, Months, NaiveDate, NaiveDateTime};

    /// Formats accepted by [`parse_date`], tried in order.
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%m/%d/%Y"];

    /// Format a NaiveDate as "YYYY-MM-DD"
    pub fn format_date(date: &NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Parse a calendar date.
    ///
    /// Accepts "YYYY-MM-DD", "YYYYMMDD", "YYYY/MM/DD", "MM/DD/YYYY" and full
    /// timestamps ("YYYY-MM-DDTHH:MM:SS", optionally with an offset), in which
    /// case only the date part is kept.
    pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
        let trimmed = s.trim();
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Ok(date);
            }
        }
        if let Ok(stamp) = chrono::DateTime::parse_from_rfc3339(trimmed) {
            return Ok(stamp.date_naive());
        }
        if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
            return Ok(stamp.date());
        }
        if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
            return Ok(stamp.date());
        }
        anyhow::bail!("Can only convert date strings into dates, received {:?}", s)
    }

    /// End date of a relative range starting at `start`.
    ///
    /// The range covers `months` months plus `days` days, inclusive of the
    /// start day, so the end is `start + months + (days - 1)`. Returns `None`
    /// when the result falls outside chrono's representable range.
    pub fn relative_end(start: &NaiveDate, months: u32, days: u32) -> Option<NaiveDate> {
        let shifted = start.checked_add_months(Months::new(months))?;
        shifted.checked_add_signed(Duration::days(i64::from(days) - 1))
    }

}

/// Environment key helpers
pub mod env {
    /// Join `prefix`, `base` and `suffix` with `_`, skipping empty parts.
    ///
    /// `affix("ACME", "OMNITURE_SECRET", "")` is `"ACME_OMNITURE_SECRET"`.
    pub fn affix(prefix: &str, base: &str, suffix: &str) -> String {
        affix_with(prefix, base, suffix, "_")
    }

    /// Like [`affix`] with a custom connector.
    pub fn affix_with(prefix: &str, base: &str, suffix: &str, connector: &str) -> String {
        let mut key = String::new();
        if !prefix.is_empty() {
            key.push_str(prefix);
            key.push_str(connector);
        }
        key.push_str(base);
        if !suffix.is_empty() {
            key.push_str(connector);
            key.push_str(suffix);
        }
        key
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_affix() {
            assert_eq!(affix("", "OMNITURE_USERNAME", ""), "OMNITURE_USERNAME");
            assert_eq!(affix("ACME", "OMNITURE_USERNAME", ""), "ACME_OMNITURE_USERNAME");
            assert_eq!(
                affix("ACME", "OMNITURE_USERNAME", "PROD"),
                "ACME_OMNITURE_USERNAME_PROD"
            );
            assert_eq!(affix_with("a", "b", "c", "-"), "a-b-c");
        }
    }
}
