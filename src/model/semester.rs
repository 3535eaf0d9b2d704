use crate::error::{Error, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SemesterId(pub i64);

impl fmt::Display for SemesterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Term {
    First,
    Second,
}

impl Term {
    pub fn number(self) -> u8 {
        match self {
            Term::First => 1,
            Term::Second => 2,
        }
    }
}

impl TryFrom<i64> for Term {
    type Error = Error;

    fn try_from(n: i64) -> Result<Self> {
        match n {
            1 => Ok(Term::First),
            2 => Ok(Term::Second),
            other => Err(Error::validation(format!(
                "term must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// An academic year written `2023/2024`. Both years must be consecutive.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct AcademicYear {
    start: i32,
}

impl AcademicYear {
    pub fn starting(start: i32) -> Self {
        AcademicYear { start }
    }

    pub fn start(&self) -> i32 {
        self.start
    }
}

impl FromStr for AcademicYear {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::validation(format!("malformed academic year {s:?}, expected YYYY/YYYY"));
        let (first, second) = s.trim().split_once('/').ok_or_else(malformed)?;
        if first.len() != 4 || second.len() != 4 {
            return Err(malformed());
        }
        let first = first.parse::<i32>().map_err(|_| malformed())?;
        let second = second.parse::<i32>().map_err(|_| malformed())?;
        if second != first + 1 {
            return Err(Error::validation(format!(
                "academic year {s:?} must span two consecutive years"
            )));
        }
        Ok(AcademicYear { start: first })
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.start + 1)
    }
}

/// Input for the creation of a new semester by the registry.
#[derive(Clone, Debug)]
pub struct NewSemester {
    pub term: Term,
    pub academic_year: AcademicYear,
    pub start_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Semester {
    pub id: SemesterId,
    pub term: Term,
    pub academic_year: AcademicYear,
    pub start_date: Option<NaiveDate>,
    /// Set once the semester projects have been frozen into the archive.
    pub archived: bool,
    /// Derived from the current-semester pointer, never stored per row.
    pub is_latest: bool,
}

impl Semester {
    /// Label used in archived records, e.g. `1 - 2023/2024`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.term, self.academic_year)
    }

    pub fn is_same_period(&self, term: Term, academic_year: &AcademicYear) -> bool {
        self.term == term && &self.academic_year == academic_year
    }

    /// A semester lasts 15 weeks, mid-semester break included, and ends on a Friday.
    pub fn end_date(&self) -> Option<NaiveDate> {
        let mut end = self.start_date? + Duration::weeks(14);
        while end.weekday() != Weekday::Fri {
            end += Duration::days(1);
        }
        Some(end)
    }

    /// Weekdays of the last week, reserved for final presentations.
    pub fn final_week(&self) -> Vec<NaiveDate> {
        self.end_date()
            .map(|end| (0..5).rev().map(|d| end - Duration::days(d)).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Semester {} - {}", self.term, self.academic_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn semester(start_date: Option<NaiveDate>) -> Semester {
        Semester {
            id: SemesterId(1),
            term: Term::First,
            academic_year: AcademicYear::starting(2023),
            start_date,
            archived: false,
            is_latest: true,
        }
    }

    #[test]
    fn test_academic_year() {
        let year: AcademicYear = "2023/2024".parse().unwrap();
        assert_eq!(year.start(), 2023);
        assert_eq!(year.to_string(), "2023/2024");
        assert!("2023/2025".parse::<AcademicYear>().is_err());
        assert!("2023-2024".parse::<AcademicYear>().is_err());
        assert!("23/24".parse::<AcademicYear>().is_err());
        assert!("".parse::<AcademicYear>().is_err());
    }

    #[test]
    fn test_term() {
        assert_eq!(Term::try_from(1).unwrap(), Term::First);
        assert_eq!(Term::try_from(2).unwrap(), Term::Second);
        assert!(matches!(Term::try_from(3), Err(Error::Validation(_))));
    }

    #[test]
    fn test_label() {
        assert_eq!(semester(None).label(), "1 - 2023/2024");
    }

    #[test]
    fn test_calendar() {
        // Monday 2 October 2023
        let s = semester(NaiveDate::from_ymd_opt(2023, 10, 2));
        assert_eq!(s.end_date(), NaiveDate::from_ymd_opt(2024, 1, 12));
        let week = s.final_week();
        assert_eq!(week.len(), 5);
        assert_eq!(week[0], NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(week[4], NaiveDate::from_ymd_opt(2024, 1, 12).unwrap());
        assert!(semester(None).final_week().is_empty());
    }
}
