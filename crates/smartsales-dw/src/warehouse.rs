//! DuckDB-backed warehouse handle
//!
//! Owns the connection to the warehouse file (or an in-memory database for
//! tests) and provides typed read-back of every table, the joined fact view
//! the cube builder aggregates over, and generic JSON result sets for the
//! reporting layer.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use duckdb::types::{Type, ValueRef};
use duckdb::{AccessMode, Config, Connection, Result as DuckResult, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, WarehouseError};
use crate::model::{Category, Customer, FactRow, Product, Sale, Usd};
use crate::schema::StarSchema;

/// Row counts per star-schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub customers: u64,
    pub products: u64,
    pub sales: u64,
}

/// A read-only result set with cells rendered as JSON values.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

impl QueryResult {
    /// Rows as objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();

        serde_json::json!({
            "columns": self.columns,
            "rows": rows,
            "row_count": self.row_count,
        })
    }
}

pub struct Warehouse {
    conn: Connection,
    location: String,
}

impl Warehouse {
    /// Open (or create) a warehouse file, creating its directory if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened warehouse");
        Ok(Self {
            conn,
            location: path.display().to_string(),
        })
    }

    /// Open an existing warehouse file for reads only.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        Ok(Self {
            conn,
            location: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> Option<PathBuf> {
        (self.location != ":memory:").then(|| PathBuf::from(&self.location))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Create (or reset) the star schema atomically.
    pub fn define_schema(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        StarSchema::declared().create(&tx)?;
        tx.commit()?;
        Ok(())
    }

    pub fn verify_schema(&self) -> Result<()> {
        StarSchema::declared().verify(&self.conn)
    }

    pub fn row_counts(&self) -> Result<RowCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(RowCounts {
            customers: count("customer")?,
            products: count("product")?,
            sales: count("sale")?,
        })
    }

    pub fn customers(&self) -> Result<Vec<Customer>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, name, region, CAST(join_date AS VARCHAR), age, preferred_contact \
             FROM customer ORDER BY customer_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Customer {
                    customer_id: row.get(0)?,
                    name: row.get(1)?,
                    region: row.get(2)?,
                    join_date: optional_date_column(row, 3)?,
                    age: row.get(4)?,
                    preferred_contact: row.get(5)?,
                })
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn products(&self) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(
            "SELECT product_id, product_name, category, unit_price_usd, stock, supplier \
             FROM product ORDER BY product_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Product {
                    product_id: row.get(0)?,
                    product_name: row.get(1)?,
                    category: category_column(row, 2)?,
                    unit_price_usd: amount_column(row, 3)?,
                    stock: row.get(4)?,
                    supplier: row.get(5)?,
                })
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn sales(&self) -> Result<Vec<Sale>> {
        let mut stmt = self.conn.prepare(
            "SELECT sale_id, customer_id, product_id, CAST(sale_date AS VARCHAR), sale_amount_usd, \
                    quantity, store_id, campaign_id, discount_percent, payment_type \
             FROM sale ORDER BY sale_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Sale {
                    sale_id: row.get(0)?,
                    customer_id: row.get(1)?,
                    product_id: row.get(2)?,
                    sale_date: date_column(row, 3)?,
                    sale_amount_usd: amount_column(row, 4)?,
                    quantity: row.get(5)?,
                    store_id: row.get(6)?,
                    campaign_id: row.get(7)?,
                    discount_percent: row.get(8)?,
                    payment_type: row.get(9)?,
                })
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sales joined with their product and customer dimensions.
    pub fn fact_rows(&self) -> Result<Vec<FactRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.sale_id, s.customer_id, s.product_id, CAST(s.sale_date AS VARCHAR), \
                    s.sale_amount_usd, s.quantity, p.category, c.region \
             FROM sale s \
             JOIN product p ON p.product_id = s.product_id \
             JOIN customer c ON c.customer_id = s.customer_id \
             ORDER BY s.sale_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FactRow {
                    sale_id: row.get(0)?,
                    customer_id: row.get(1)?,
                    product_id: row.get(2)?,
                    sale_date: date_column(row, 3)?,
                    sale_amount: amount_column(row, 4)?,
                    quantity: row.get(5)?,
                    category: category_column(row, 6)?,
                    region: row.get(7)?,
                })
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        tracing::debug!(rows = rows.len(), "Read fact rows");
        Ok(rows)
    }

    /// Latest sale date in the fact table, if any.
    pub fn last_sale_date(&self) -> Result<Option<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT CAST(MAX(sale_date) AS VARCHAR) FROM sale")?;
        let date = stmt.query_row([], |row| optional_date_column(row, 0))?;
        Ok(date)
    }

    /// SHA-256 over the full warehouse contents in key order.
    ///
    /// Two warehouses with the same fingerprint hold the same rows.
    pub fn fingerprint(&self) -> Result<String> {
        let contents = serde_json::json!({
            "customer": self.customers()?,
            "product": self.products()?,
            "sale": self.sales()?,
        });
        let mut hasher = Sha256::new();
        hasher.update(contents.to_string().as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// All rows of one star-schema table.
    pub fn table_rows(&self, table: &str) -> Result<QueryResult> {
        let def = StarSchema::declared()
            .table(table)
            .ok_or_else(|| WarehouseError::UnknownTable(table.to_string()))?;
        self.query(&format!(
            "SELECT * FROM {} ORDER BY {}",
            def.name, def.primary_key
        ))
    }

    /// Run a read query and render every cell as JSON.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        tracing::debug!(sql = %sql, "Executing report query");
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let columns: Vec<String> = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();

        let mut result_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut json_row = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                json_row.push(value_to_json(row.get_ref(i)?));
            }
            result_rows.push(json_row);
        }

        let row_count = result_rows.len();
        Ok(QueryResult {
            columns,
            rows: result_rows,
            row_count,
        })
    }
}

fn parse_date(idx: usize, text: &str) -> DuckResult<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn date_column(row: &Row<'_>, idx: usize) -> DuckResult<NaiveDate> {
    let text: String = row.get(idx)?;
    parse_date(idx, &text)
}

fn optional_date_column(row: &Row<'_>, idx: usize) -> DuckResult<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_date(idx, &t)).transpose()
}

fn category_column(row: &Row<'_>, idx: usize) -> DuckResult<Category> {
    let text: String = row.get(idx)?;
    Category::parse(&text).ok_or_else(|| {
        duckdb::Error::FromSqlConversionFailure(idx, Type::Text, "blank category".into())
    })
}

fn amount_column(row: &Row<'_>, idx: usize) -> DuckResult<Usd> {
    let dollars: f64 = row.get(idx)?;
    Usd::from_dollars(dollars).ok_or_else(|| {
        duckdb::Error::FromSqlConversionFailure(
            idx,
            Type::Double,
            format!("amount {dollars} is out of range").into(),
        )
    })
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Boolean(b) => serde_json::Value::Bool(b),
        ValueRef::TinyInt(i) => serde_json::json!(i),
        ValueRef::SmallInt(i) => serde_json::json!(i),
        ValueRef::Int(i) => serde_json::json!(i),
        ValueRef::BigInt(i) => serde_json::json!(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string())),
        ValueRef::UTinyInt(i) => serde_json::json!(i),
        ValueRef::USmallInt(i) => serde_json::json!(i),
        ValueRef::UInt(i) => serde_json::json!(i),
        ValueRef::UBigInt(i) => serde_json::json!(i),
        ValueRef::Float(f) => serde_json::json!(f),
        ValueRef::Double(f) => serde_json::json!(f),
        ValueRef::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
            .map(|d| serde_json::Value::String(d.to_string()))
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
        _ => serde_json::Value::String("<unsupported>".to_string()),
    }
}
