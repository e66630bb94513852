//! Grouping dimensions and calendar derivations

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use smartsales_dw::FactRow;

use crate::error::CubeError;

/// Calendar quarter of a date: Q1 = Jan-Mar ... Q4 = Oct-Dec.
pub fn quarter_of(date: NaiveDate) -> u32 {
    date.month0() / 3 + 1
}

/// Last calendar day of a quarter.
pub fn quarter_end(year: i32, quarter: u32) -> Option<NaiveDate> {
    if !(1..=4).contains(&quarter) {
        return None;
    }
    let (next_year, next_month) = if quarter == 4 {
        (year + 1, 1)
    } else {
        (year, quarter * 3 + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// An attribute a cube can group fact rows by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Year,
    Quarter,
    Month,
    DayOfWeek,
    Category,
    Region,
    ProductId,
    CustomerId,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::Year,
        Dimension::Quarter,
        Dimension::Month,
        Dimension::DayOfWeek,
        Dimension::Category,
        Dimension::Region,
        Dimension::ProductId,
        Dimension::CustomerId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Year => "year",
            Dimension::Quarter => "quarter",
            Dimension::Month => "month",
            Dimension::DayOfWeek => "day_of_week",
            Dimension::Category => "category",
            Dimension::Region => "region",
            Dimension::ProductId => "product_id",
            Dimension::CustomerId => "customer_id",
        }
    }

    pub fn value_of(self, row: &FactRow) -> DimValue {
        match self {
            Dimension::Year => DimValue::Int(i64::from(row.sale_date.year())),
            Dimension::Quarter => DimValue::Int(i64::from(quarter_of(row.sale_date))),
            Dimension::Month => DimValue::Int(i64::from(row.sale_date.month())),
            Dimension::DayOfWeek => {
                DimValue::Weekday(row.sale_date.weekday().num_days_from_monday() as u8)
            }
            Dimension::Category => DimValue::Text(row.category.as_str().to_string()),
            Dimension::Region => row
                .region
                .clone()
                .map(DimValue::Text)
                .unwrap_or(DimValue::Missing),
            Dimension::ProductId => DimValue::Int(row.product_id),
            Dimension::CustomerId => DimValue::Int(row.customer_id),
        }
    }

    /// Standard SQL expression over `sale s JOIN product p JOIN customer c`.
    pub fn sql_expr(self) -> &'static str {
        match self {
            Dimension::Year => "EXTRACT(YEAR FROM s.sale_date)",
            Dimension::Quarter => "EXTRACT(QUARTER FROM s.sale_date)",
            Dimension::Month => "EXTRACT(MONTH FROM s.sale_date)",
            Dimension::DayOfWeek => "dayname(s.sale_date)",
            Dimension::Category => "p.category",
            Dimension::Region => "c.region",
            Dimension::ProductId => "s.product_id",
            Dimension::CustomerId => "s.customer_id",
        }
    }

    /// ORDER BY term for the grouped column at `position`, matching the
    /// in-memory order of this dimension's values.
    pub fn sql_order_term(self, position: usize) -> String {
        match self {
            // Weekday names sort Monday first, not alphabetically
            Dimension::DayOfWeek => "MIN(EXTRACT(ISODOW FROM s.sale_date))".to_string(),
            _ => position.to_string(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let dimension = match normalized.as_str() {
            "year" => Dimension::Year,
            "quarter" => Dimension::Quarter,
            "month" => Dimension::Month,
            "day_of_week" | "dayofweek" | "weekday" => Dimension::DayOfWeek,
            "category" => Dimension::Category,
            "region" => Dimension::Region,
            "product_id" | "product" => Dimension::ProductId,
            "customer_id" | "customer" => Dimension::CustomerId,
            _ => return Err(CubeError::UnknownDimension(s.to_string())),
        };
        Ok(dimension)
    }
}

/// The value of one dimension for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimValue {
    Int(i64),
    /// 0 = Monday
    Weekday(u8),
    Text(String),
    Missing,
}

impl DimValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DimValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DimValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            DimValue::Int(_) => 0,
            DimValue::Weekday(_) => 1,
            DimValue::Text(_) => 2,
            DimValue::Missing => 3,
        }
    }
}

impl Ord for DimValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DimValue::Int(a), DimValue::Int(b)) => a.cmp(b),
            (DimValue::Weekday(a), DimValue::Weekday(b)) => a.cmp(b),
            (DimValue::Text(a), DimValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for DimValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimValue::Int(i) => write!(f, "{}", i),
            DimValue::Weekday(d) => f.write_str(WEEKDAYS.get(*d as usize).copied().unwrap_or("?")),
            DimValue::Text(s) => f.write_str(s),
            DimValue::Missing => Ok(()),
        }
    }
}

impl Serialize for DimValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DimValue::Int(i) => serializer.serialize_i64(*i),
            DimValue::Weekday(_) | DimValue::Text(_) => serializer.collect_str(self),
            DimValue::Missing => serializer.serialize_none(),
        }
    }
}
