//! The `YYYY-MM` year-month tag used as the Store's sharding key and as the
//! unit every query is parameterised over.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid year-month")
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("invalid year-month tag: {s}"))?;
        let year: i32 = y.parse()?;
        let month: u32 = m.parse()?;
        if !(1..=12).contains(&month) {
            anyhow::bail!("invalid month in year-month tag: {s}");
        }
        Ok(Self { year, month })
    }
}

impl From<YearMonth> for String {
    fn from(ym: YearMonth) -> Self {
        ym.to_string()
    }
}

impl TryFrom<String> for YearMonth {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parses a `months` query parameter (comma-separated `YYYY-MM` tags),
/// optionally combined with `quarter`+`year` or a bare `year`.
pub fn expand_months_query(
    months: Option<&str>,
    quarter: Option<u32>,
    year: Option<i32>,
    known_months: &[YearMonth],
) -> anyhow::Result<BTreeSet<YearMonth>> {
    let mut out = BTreeSet::new();

    if let Some(months) = months {
        for tag in months.split(',') {
            let tag = tag.trim();
            if tag.is_empty() {
                continue;
            }
            out.insert(tag.parse::<YearMonth>()?);
        }
    }

    if let (Some(q), Some(y)) = (quarter, year) {
        if !(1..=4).contains(&q) {
            anyhow::bail!("quarter must be 1..=4, got {q}");
        }
        let start_month = (q - 1) * 3 + 1;
        for m in start_month..start_month + 3 {
            out.insert(YearMonth { year: y, month: m });
        }
    } else if let Some(y) = year {
        for ym in known_months {
            if ym.year == y {
                out.insert(*ym);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        let ym: YearMonth = "2025-08".parse().unwrap();
        assert_eq!(ym.year, 2025);
        assert_eq!(ym.month, 8);
        assert_eq!(ym.to_string(), "2025-08");
    }

    #[test]
    fn rejects_bad_month() {
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("not-a-month".parse::<YearMonth>().is_err());
    }

    #[test]
    fn ordering_is_chronological() {
        let a: YearMonth = "2025-01".parse().unwrap();
        let b: YearMonth = "2025-02".parse().unwrap();
        let c: YearMonth = "2024-12".parse().unwrap();
        let mut v = vec![a, b, c];
        v.sort();
        assert_eq!(v, vec![c, a, b]);
    }

    #[test]
    fn expands_quarter() {
        let out = expand_months_query(None, Some(3), Some(2025), &[]).unwrap();
        let expect: BTreeSet<YearMonth> = ["2025-07", "2025-08", "2025-09"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(out, expect);
    }

    #[test]
    fn expands_bare_year_from_known_months() {
        let known = vec![
            "2024-12".parse().unwrap(),
            "2025-01".parse().unwrap(),
            "2025-02".parse().unwrap(),
        ];
        let out = expand_months_query(None, None, Some(2025), &known).unwrap();
        let expect: BTreeSet<YearMonth> = ["2025-01", "2025-02"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(out, expect);
    }
}
