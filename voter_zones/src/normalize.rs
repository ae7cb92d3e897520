//! Field normalization.
//!
//! All the functions in this module are total: they never fail, and return
//! `None` when the input cannot be understood. Callers decide what a missing
//! value means for them.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use log::debug;

use crate::config::ResolverConfig;

/// The age used when neither a date of birth nor an age column is available.
pub const DEFAULT_AGE: i32 = 18;

/// Excel serial number of 1970-01-01.
pub const EXCEL_UNIX_EPOCH_SERIAL: f64 = 25569.0;

// Largest serial Excel accepts (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

// ********* Contact fields *********

/// Normalizes a phone number to exactly 10 digits.
///
/// All the non-digit characters are dropped first. A 12 digit number with the
/// `91` country code is reduced to its last 10 digits. Anything that does not
/// end up with 10 digits is rejected rather than guessed.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_not_available(trimmed) {
        return None;
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(digits),
        12 if digits.starts_with("91") => Some(digits[2..].to_string()),
        _ => None,
    }
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_not_available(trimmed) {
        return None;
    }
    Some(trimmed.to_lowercase())
}

fn is_not_available(s: &str) -> bool {
    s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("n/a")
}

// ********* Dates of birth *********

/// A date of birth as found in a source file.
#[derive(PartialEq, Debug, Clone)]
pub enum RawDob {
    /// Free text, `DD/MM/YYYY` or `DD-MM-YYYY`, possibly with a 2 digit year.
    Text(String),
    /// A plain number that may be an Excel serial date.
    Serial(f64),
    /// A cell that the workbook itself types as a date (Excel serial).
    ExcelDate(f64),
    Date(NaiveDate),
}

pub fn normalize_dob(raw: &RawDob) -> Option<NaiveDate> {
    let res = match raw {
        RawDob::Text(s) => parse_dob_text(s),
        RawDob::Serial(serial) => dob_from_serial(*serial),
        RawDob::ExcelDate(serial) => dob_from_excel_date(*serial),
        RawDob::Date(d) => Some(*d),
    };
    debug!("normalize_dob: {:?} -> {:?}", raw, res);
    res
}

/// Parses `DD/MM/YYYY` or `DD-MM-YYYY`.
///
/// Two digit years are expanded: `50` and above is in the 1900s, below is in
/// the 2000s. A time component after the date is ignored. A text holding a
/// single number is read as a serial date.
pub fn parse_dob_text(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split_whitespace().next()?;
    if let Ok(serial) = date_part.parse::<f64>() {
        return dob_from_serial(serial);
    }
    let normalized = date_part.replace('-', "/");
    let fields: Vec<&str> = normalized.split('/').collect();
    let [day, month, year] = fields[..] else {
        return None;
    };
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(day) || !all_digits(month) || !all_digits(year) {
        return None;
    }
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = match year.len() {
        1 | 2 => expand_two_digit_year(year.parse().ok()?),
        4 => year.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn expand_two_digit_year(yy: i32) -> i32 {
    if yy >= 50 {
        1900 + yy
    } else {
        2000 + yy
    }
}

/// Reads a plain number as an Excel serial date.
///
/// Only serials after 1970-01-01 are accepted: smaller numbers in a date of
/// birth column are not dates.
pub fn dob_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial <= EXCEL_UNIX_EPOCH_SERIAL || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    let seconds = ((serial - EXCEL_UNIX_EPOCH_SERIAL) * 86400.0).floor() as i64;
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|dt| dt.date_naive())
}

/// Converts a cell typed as a date by the workbook.
pub fn dob_from_excel_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    // Excel counts from 1899-12-30 once its fictitious 1900-02-29 is behind.
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Formats a date as `DD/MM/YYYY`.
pub fn format_dob(dob: NaiveDate) -> String {
    format!("{:02}/{:02}/{:04}", dob.day(), dob.month(), dob.year())
}

// ********* Age *********

/// Full years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

/// The age of a voter: from the date of birth, else from the age column,
/// else [`DEFAULT_AGE`].
pub fn derive_age(dob: Option<NaiveDate>, sheet_age: Option<i32>, today: NaiveDate) -> i32 {
    match (dob, sheet_age) {
        (Some(d), _) => age_on(d, today),
        (None, Some(a)) => a,
        (None, None) => DEFAULT_AGE,
    }
}

/// Reads an age column value. Fractional ages are truncated.
pub fn parse_age(raw: &str) -> Option<i32> {
    let v: f64 = raw.trim().parse().ok()?;
    if v.is_finite() && (0.0..200.0).contains(&v) {
        Some(v as i32)
    } else {
        None
    }
}

// ********* Regions *********

/// Trims a label and collapses inner runs of whitespace.
pub fn clean_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Region labels compare case-insensitively once cleaned.
pub fn same_label(a: &str, b: &str) -> bool {
    clean_label(a).to_lowercase() == clean_label(b).to_lowercase()
}

/// Applies the alias table then the city-based splits to a region label.
pub fn canonical_region(label: &str, city: Option<&str>, config: &ResolverConfig) -> String {
    let cleaned = clean_label(label);
    let aliased = config
        .aliases
        .iter()
        .find(|(from, _)| same_label(from, &cleaned))
        .map(|(_, to)| clean_label(to))
        .unwrap_or(cleaned);

    match config
        .splits
        .iter()
        .find(|split| same_label(&split.composite, &aliased))
    {
        Some(split) => {
            let in_town = city
                .map(|c| {
                    let c = c.trim().to_lowercase();
                    split.towns.iter().any(|t| t.trim().to_lowercase() == c)
                })
                .unwrap_or(false);
            debug!(
                "canonical_region: split {:?} city {:?} in_town {}",
                aliased, city, in_town
            );
            if in_town {
                split.town_region.clone()
            } else {
                split.other_region.clone()
            }
        }
        None => aliased,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionSplit;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn phone_strips_formatting() {
        assert_eq!(
            normalize_phone("98765 43210"),
            Some("9876543210".to_string())
        );
        assert_eq!(
            normalize_phone("+91-98765-43210"),
            Some("9876543210".to_string())
        );
        assert_eq!(
            normalize_phone("919876543210"),
            Some("9876543210".to_string())
        );
    }

    #[test]
    fn phone_rejects_placeholders_and_bad_lengths() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("  "), None);
        assert_eq!(normalize_phone("NA"), None);
        assert_eq!(normalize_phone("n/a"), None);
        assert_eq!(normalize_phone("N/A"), None);
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("029876543210"), None);
        assert_eq!(normalize_phone("98765432101"), None);
        assert_eq!(normalize_phone("not a phone"), None);
    }

    #[test]
    fn email_is_lowercased() {
        assert_eq!(
            normalize_email(" Asha.Shah@Example.COM "),
            Some("asha.shah@example.com".to_string())
        );
        assert_eq!(normalize_email("NA"), None);
        assert_eq!(normalize_email(""), None);
    }

    #[test]
    fn dob_text_forms() {
        assert_eq!(parse_dob_text("15/06/1980"), Some(ymd(1980, 6, 15)));
        assert_eq!(parse_dob_text("15-06-1980"), Some(ymd(1980, 6, 15)));
        assert_eq!(parse_dob_text("5/6/1980"), Some(ymd(1980, 6, 5)));
        assert_eq!(parse_dob_text("15/06/80"), Some(ymd(1980, 6, 15)));
        assert_eq!(parse_dob_text("15/06/05"), Some(ymd(2005, 6, 15)));
        assert_eq!(parse_dob_text("01/01/50"), Some(ymd(1950, 1, 1)));
        assert_eq!(parse_dob_text("01/01/49"), Some(ymd(2049, 1, 1)));
        assert_eq!(
            parse_dob_text("15/06/1980 00:00:00"),
            Some(ymd(1980, 6, 15))
        );
    }

    #[test]
    fn dob_text_rejects_garbage() {
        assert_eq!(parse_dob_text(""), None);
        assert_eq!(parse_dob_text("15/13/1980"), None);
        assert_eq!(parse_dob_text("31/02/1980"), None);
        assert_eq!(parse_dob_text("15/06"), None);
        assert_eq!(parse_dob_text("15/06/1980/1"), None);
        assert_eq!(parse_dob_text("aa/06/1980"), None);
        assert_eq!(parse_dob_text("1980-06-15"), None);
        assert_eq!(parse_dob_text("15/06/198"), None);
    }

    #[test]
    fn dob_serials() {
        // 29387 is 1980-06-15 in Excel.
        assert_eq!(dob_from_serial(29387.0), Some(ymd(1980, 6, 15)));
        assert_eq!(dob_from_serial(29387.75), Some(ymd(1980, 6, 15)));
        assert_eq!(parse_dob_text("29387"), Some(ymd(1980, 6, 15)));
        assert_eq!(dob_from_serial(25569.0), None);
        assert_eq!(dob_from_serial(18264.0), None);
        assert_eq!(dob_from_serial(f64::NAN), None);
        assert_eq!(dob_from_excel_date(18264.0), Some(ymd(1950, 1, 1)));
        assert_eq!(dob_from_excel_date(29387.0), Some(ymd(1980, 6, 15)));
    }

    #[test]
    fn dob_dispatch() {
        assert_eq!(
            normalize_dob(&RawDob::Date(ymd(1980, 6, 15))),
            Some(ymd(1980, 6, 15))
        );
        assert_eq!(
            normalize_dob(&RawDob::Text("15-06-1980".to_string())),
            Some(ymd(1980, 6, 15))
        );
        assert_eq!(
            normalize_dob(&RawDob::Serial(29387.0)),
            Some(ymd(1980, 6, 15))
        );
        assert_eq!(format_dob(ymd(1980, 6, 5)), "05/06/1980");
    }

    #[test]
    fn age_boundaries() {
        let today = ymd(2025, 7, 1);
        assert_eq!(age_on(ymd(1980, 6, 15), today), 45);
        assert_eq!(age_on(ymd(2007, 7, 1), today), 18);
        assert_eq!(age_on(ymd(2007, 7, 2), today), 17);
        assert_eq!(age_on(ymd(2007, 6, 30), today), 18);
        assert_eq!(age_on(ymd(2000, 2, 29), ymd(2025, 2, 28)), 24);
        assert_eq!(age_on(ymd(2000, 2, 29), ymd(2025, 3, 1)), 25);
    }

    #[test]
    fn age_fallbacks() {
        let today = ymd(2025, 7, 1);
        assert_eq!(derive_age(Some(ymd(1980, 6, 15)), Some(30), today), 45);
        assert_eq!(derive_age(None, Some(30), today), 30);
        assert_eq!(derive_age(None, None, today), DEFAULT_AGE);
        assert_eq!(parse_age("42"), Some(42));
        assert_eq!(parse_age("42.0"), Some(42));
        assert_eq!(parse_age("forty"), None);
        assert_eq!(parse_age("-3"), None);
    }

    fn region_config() -> ResolverConfig {
        let mut aliases = BTreeMap::new();
        aliases.insert("Karnataka-Goa".to_string(), "Karnataka & Goa".to_string());
        aliases.insert(
            "Anjar - Anya Gujarat".to_string(),
            "Anjar-Anya Gujarat".to_string(),
        );
        ResolverConfig {
            regions: BTreeMap::new(),
            aliases,
            splits: vec![RegionSplit {
                composite: "Anjar-Anya Gujarat".to_string(),
                towns: vec!["Anjar".to_string(), "Adipur".to_string()],
                town_region: "Anjar".to_string(),
                other_region: "Anya Gujarat".to_string(),
            }],
            default_region: "Mumbai".to_string(),
            youth_wing_allow_list: None,
        }
    }

    #[test]
    fn region_aliases_and_splits() {
        let config = region_config();
        assert_eq!(
            canonical_region(" karnataka-goa ", None, &config),
            "Karnataka & Goa"
        );
        assert_eq!(
            canonical_region("Anjar-Anya Gujarat", Some(" ADIPUR "), &config),
            "Anjar"
        );
        assert_eq!(
            canonical_region("Anjar - Anya Gujarat", Some("Anjar"), &config),
            "Anjar"
        );
        assert_eq!(
            canonical_region("Anjar-Anya Gujarat", Some("Surat"), &config),
            "Anya Gujarat"
        );
        assert_eq!(
            canonical_region("Anjar-Anya Gujarat", None, &config),
            "Anya Gujarat"
        );
        assert_eq!(canonical_region("Pune   City", None, &config), "Pune City");
    }

    proptest! {
        #[test]
        fn ten_digit_phones_pass_through(phone in "[0-9]{10}") {
            prop_assert_eq!(normalize_phone(&phone), Some(phone.clone()));
        }

        #[test]
        fn country_code_is_dropped(rest in "[0-9]{10}") {
            let phone = format!("91{}", rest);
            prop_assert_eq!(normalize_phone(&phone), Some(rest));
        }

        #[test]
        fn other_lengths_are_rejected(phone in "[0-9]{0,20}") {
            prop_assume!(phone.len() != 10 && !(phone.len() == 12 && phone.starts_with("91")));
            prop_assert_eq!(normalize_phone(&phone), None);
        }

        #[test]
        fn phone_normalization_is_idempotent(raw in "[0-9 +-]{0,16}") {
            if let Some(p) = normalize_phone(&raw) {
                prop_assert_eq!(normalize_phone(&p), Some(p.clone()));
            }
        }

        #[test]
        fn dob_format_round_trips(day in 1u32..=28, month in 1u32..=12, year in 1900i32..=2025) {
            let dob = ymd(year, month, day);
            prop_assert_eq!(parse_dob_text(&format_dob(dob)), Some(dob));
        }

        #[test]
        fn age_on_anniversary(years in 0i32..100, month in 1u32..=12, day in 1u32..=28) {
            let today = ymd(2025, month, day);
            let dob = ymd(2025 - years, month, day);
            prop_assert_eq!(age_on(dob, today), years);
            let day_after = dob.succ_opt().unwrap();
            prop_assert_eq!(age_on(day_after, today), years - 1);
        }
    }
}
