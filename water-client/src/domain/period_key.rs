use std::{cmp::Ordering, fmt, str::FromStr};

use time::Month;

use crate::error::RegistryError;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One monthly reporting period, written `Mon-YY` (e.g. `Jan-25`).
///
/// Keys order chronologically, so a `BTreeMap<PeriodKey, _>` iterates in
/// calendar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodKey {
    year: i32,
    month: Month,
}

impl PeriodKey {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Month {
        self.month
    }

    /// Three-letter month abbreviation, as used in the key.
    pub fn month_abbrev(&self) -> &'static str {
        MONTH_ABBREVIATIONS[self.month as usize - 1]
    }

    pub fn next(self) -> Self {
        let year = if self.month == Month::December {
            self.year + 1
        } else {
            self.year
        };
        Self {
            year,
            month: self.month.next(),
        }
    }

    pub fn days_in_month(&self) -> u8 {
        time::util::days_in_year_month(self.year, self.month)
    }
}

impl Ord for PeriodKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then((self.month as u8).cmp(&(other.month as u8)))
    }
}

impl PartialOrd for PeriodKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.month_abbrev(), self.year.rem_euclid(100))
    }
}

impl FromStr for PeriodKey {
    type Err = RegistryError;

    /// Accepts `Jan-25` and `Jan-2025`; the month is case-insensitive.
    /// Keys display with a two-digit year, so four-digit years must fall in
    /// 2000..=2099.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidPeriodKey(s.to_string());

        let (month_str, year_str) = s.trim().split_once('-').ok_or_else(invalid)?;
        let month_idx = MONTH_ABBREVIATIONS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(month_str.trim()))
            .ok_or_else(invalid)?;
        let month = Month::try_from(month_idx as u8 + 1).map_err(|_| invalid())?;

        let year_str = year_str.trim();
        if !year_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = match year_str.len() {
            2 => 2000 + year_str.parse::<i32>().map_err(|_| invalid())?,
            4 => year_str
                .parse::<i32>()
                .ok()
                .filter(|y| (2000..=2099).contains(y))
                .ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };

        Ok(Self { year, month })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PeriodKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PeriodKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_four_digit_years() {
        let a: PeriodKey = "Jan-25".parse().unwrap();
        let b: PeriodKey = "jan-2025".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.year(), 2025);
        assert_eq!(a.month(), Month::January);
        assert_eq!(a.to_string(), "Jan-25");
    }

    #[test]
    fn rejects_malformed_keys() {
        for bad in ["", "Jan", "Foo-25", "Jan-5", "Jan-x5", "Jan-20255", "Jan-1999", "Jan-2100"] {
            assert!(
                matches!(bad.parse::<PeriodKey>(), Err(RegistryError::InvalidPeriodKey(_))),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn four_digit_years_survive_display() {
        for s in ["Jan-2000", "Dec-2099"] {
            let key: PeriodKey = s.parse().unwrap();
            assert_eq!(key.to_string().parse::<PeriodKey>().unwrap(), key);
        }
    }

    #[test]
    fn orders_chronologically_across_years() {
        let dec: PeriodKey = "Dec-24".parse().unwrap();
        let jan: PeriodKey = "Jan-25".parse().unwrap();
        let feb: PeriodKey = "Feb-24".parse().unwrap();
        assert!(feb < dec);
        assert!(dec < jan);
        assert_eq!(dec.next(), jan);
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!("Feb-24".parse::<PeriodKey>().unwrap().days_in_month(), 29);
        assert_eq!("Feb-25".parse::<PeriodKey>().unwrap().days_in_month(), 28);
        assert_eq!("Jan-25".parse::<PeriodKey>().unwrap().days_in_month(), 31);
    }
}
