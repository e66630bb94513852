//! Star schema record types
//!
//! Two layers live here:
//! - the cleaned-source records (`CustomerRecord`, `ProductRecord`, `SaleRecord`)
//!   where every attribute is optional, exactly as it arrives from the
//!   data-preparation step
//! - the validated warehouse rows (`Customer`, `Product`, `Sale`) that the
//!   loader writes and the cube builder reads back
//!
//! `validate` converts the former into the latter or names the reason the
//! record has to be rejected.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// US dollar amount held as integer cents so sums are exact and independent
/// of row order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Usd(i64);

impl Usd {
    pub const ZERO: Usd = Usd(0);

    /// Largest amount, in dollars, a single record may carry.
    pub const MAX_DOLLARS: f64 = 1e12;

    pub fn from_cents(cents: i64) -> Self {
        Usd(cents)
    }

    /// Rounds to the nearest cent. `None` for non-finite amounts and
    /// amounts beyond [`Usd::MAX_DOLLARS`] in either direction.
    pub fn from_dollars(dollars: f64) -> Option<Self> {
        if !dollars.is_finite() || dollars.abs() > Self::MAX_DOLLARS {
            return None;
        }
        Some(Usd((dollars * 100.0).round() as i64))
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_add(self, rhs: Usd) -> Option<Usd> {
        self.0.checked_add(rhs.0).map(Usd)
    }

    /// Sum of `amounts`, or `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Usd>>(amounts: I) -> Option<Usd> {
        amounts.into_iter().try_fold(Usd::ZERO, Usd::checked_add)
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Usd {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.dollars())
    }
}

/// Product category, normalized to trimmed lowercase ("Clothing " -> "clothing").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Category(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a source record was kept out of the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("missing required attribute `{0}`")]
    MissingField(&'static str),

    #[error("invalid `{field}`: {detail}")]
    InvalidValue { field: &'static str, detail: String },

    #[error("unparseable record: {0}")]
    Unparseable(String),

    #[error("unknown customer_id {0}")]
    UnknownCustomer(i64),

    #[error("unknown product_id {0}")]
    UnknownProduct(i64),
}

impl RejectReason {
    fn invalid(field: &'static str, detail: impl Into<String>) -> Self {
        RejectReason::InvalidValue {
            field,
            detail: detail.into(),
        }
    }
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, RejectReason> {
    value.ok_or(RejectReason::MissingField(field))
}

fn non_negative_amount(value: f64, field: &'static str) -> Result<Usd, RejectReason> {
    if !value.is_finite() {
        return Err(RejectReason::invalid(field, format!("{value} is not a finite number")));
    }
    if value < 0.0 {
        return Err(RejectReason::invalid(field, format!("{value} is negative")));
    }
    Usd::from_dollars(value).ok_or_else(|| {
        RejectReason::invalid(
            field,
            format!("{value} exceeds the largest accepted amount {}", Usd::MAX_DOLLARS),
        )
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub customer_id: i64,
    pub name: String,
    pub region: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub age: Option<i32>,
    pub preferred_contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub product_id: i64,
    pub product_name: String,
    pub category: Category,
    pub unit_price_usd: Usd,
    pub stock: Option<i32>,
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sale {
    pub sale_id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub sale_date: NaiveDate,
    pub sale_amount_usd: Usd,
    pub quantity: i32,
    pub store_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub discount_percent: Option<f64>,
    pub payment_type: Option<String>,
}

/// A sale joined with the dimension attributes the cube builder groups by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRow {
    pub sale_id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub sale_date: NaiveDate,
    pub sale_amount: Usd,
    pub quantity: i32,
    pub category: Category,
    pub region: Option<String>,
}

/// Cleaned customer record as delivered by the data-preparation step.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CustomerRecord {
    pub customer_id: Option<i64>,
    pub name: Option<String>,
    pub region: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub age: Option<i32>,
    pub preferred_contact: Option<String>,
}

impl CustomerRecord {
    pub fn key(&self) -> Option<String> {
        self.customer_id.map(|id| id.to_string())
    }

    pub fn validate(self) -> Result<Customer, RejectReason> {
        let customer_id = required(self.customer_id, "customer_id")?;
        let name = required(text(self.name), "name")?;
        if let Some(age) = self.age {
            if age < 0 {
                return Err(RejectReason::invalid("age", format!("{age} is negative")));
            }
        }

        Ok(Customer {
            customer_id,
            name,
            region: text(self.region),
            join_date: self.join_date,
            age: self.age,
            preferred_contact: text(self.preferred_contact),
        })
    }
}

/// Cleaned product record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProductRecord {
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub unit_price_usd: Option<f64>,
    pub stock: Option<i32>,
    pub supplier: Option<String>,
}

impl ProductRecord {
    pub fn key(&self) -> Option<String> {
        self.product_id.map(|id| id.to_string())
    }

    pub fn validate(self) -> Result<Product, RejectReason> {
        let product_id = required(self.product_id, "product_id")?;
        let product_name = required(text(self.product_name), "product_name")?;
        let category = required(
            self.category.as_deref().and_then(Category::parse),
            "category",
        )?;
        let unit_price = required(self.unit_price_usd, "unit_price_usd")?;
        let unit_price_usd = non_negative_amount(unit_price, "unit_price_usd")?;
        if let Some(stock) = self.stock {
            if stock < 0 {
                return Err(RejectReason::invalid("stock", format!("{stock} is negative")));
            }
        }

        Ok(Product {
            product_id,
            product_name,
            category,
            unit_price_usd,
            stock: self.stock,
            supplier: text(self.supplier),
        })
    }
}

/// Cleaned sale record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SaleRecord {
    pub sale_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub product_id: Option<i64>,
    pub sale_date: Option<NaiveDate>,
    pub sale_amount_usd: Option<f64>,
    pub quantity: Option<i32>,
    pub store_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub discount_percent: Option<f64>,
    pub payment_type: Option<String>,
}

impl SaleRecord {
    pub fn key(&self) -> Option<String> {
        self.sale_id.map(|id| id.to_string())
    }

    /// Checks the record on its own; foreign keys are resolved by the loader.
    pub fn validate(self) -> Result<Sale, RejectReason> {
        let sale_id = required(self.sale_id, "sale_id")?;
        let customer_id = required(self.customer_id, "customer_id")?;
        let product_id = required(self.product_id, "product_id")?;
        let sale_date = required(self.sale_date, "sale_date")?;
        let sale_amount_usd = non_negative_amount(
            required(self.sale_amount_usd, "sale_amount_usd")?,
            "sale_amount_usd",
        )?;
        let quantity = required(self.quantity, "quantity")?;
        if quantity < 1 {
            return Err(RejectReason::invalid(
                "quantity",
                format!("{quantity} is less than 1"),
            ));
        }
        if let Some(discount) = self.discount_percent {
            if !(0.0..=100.0).contains(&discount) {
                return Err(RejectReason::invalid(
                    "discount_percent",
                    format!("{discount} is outside 0..=100"),
                ));
            }
        }

        Ok(Sale {
            sale_id,
            customer_id,
            product_id,
            sale_date,
            sale_amount_usd,
            quantity,
            store_id: self.store_id,
            campaign_id: self.campaign_id,
            discount_percent: self.discount_percent,
            payment_type: text(self.payment_type),
        })
    }
}
