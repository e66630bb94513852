//! ETL loader: cleaned sources -> star schema
//!
//! A load runs in three phases:
//! 1. read every source completely (an unreadable source aborts before any
//!    write)
//! 2. validate dimensions, then facts against the accepted dimension keys,
//!    collecting rejections
//! 3. replace the warehouse contents inside a single transaction
//!
//! Reloading identical input therefore yields identical contents, and a
//! failed write leaves the previous contents in place.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use duckdb::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{LoadStage, Result, WarehouseError};
use crate::model::{
    Customer, CustomerRecord, Product, ProductRecord, RejectReason, Sale, SaleRecord,
};
use crate::schema::StarSchema;
use crate::source::{RecordSource, SourceRow};
use crate::warehouse::Warehouse;

/// Which input table a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Customer,
    Product,
    Sale,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Table::Customer => "customer",
            Table::Product => "product",
            Table::Sale => "sale",
        };
        f.write_str(name)
    }
}

/// A record kept out of the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub table: Table,
    /// Position of the record in its source.
    pub row: usize,
    /// Natural key of the record, when it had one.
    pub key: Option<String>,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: Table,
    pub source: String,
    pub read: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Records replaced by a later record with the same key in the same batch.
    pub superseded: usize,
}

impl TableReport {
    fn new(table: Table, source: String, read: usize) -> Self {
        Self {
            table,
            source,
            read,
            accepted: 0,
            rejected: 0,
            superseded: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub tables: Vec<TableReport>,
    pub rejections: Vec<Rejection>,
}

impl LoadReport {
    pub fn table(&self, table: Table) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn accepted(&self) -> usize {
        self.tables.iter().map(|t| t.accepted).sum()
    }

    pub fn rejected(&self) -> usize {
        self.rejections.len()
    }

    pub fn is_clean(&self) -> bool {
        self.rejections.is_empty()
    }

    pub fn rejections_for(&self, table: Table) -> impl Iterator<Item = &Rejection> {
        self.rejections.iter().filter(move |r| r.table == table)
    }
}

/// The three cleaned sources of one load.
pub struct LoadInput<'a> {
    pub customers: &'a dyn RecordSource<CustomerRecord>,
    pub products: &'a dyn RecordSource<ProductRecord>,
    pub sales: &'a dyn RecordSource<SaleRecord>,
}

/// Validated rows waiting to be written, keyed (and therefore ordered) by id.
struct Staged {
    customers: BTreeMap<i64, Customer>,
    products: BTreeMap<i64, Product>,
    sales: BTreeMap<i64, Sale>,
}

/// Loads cleaned sources into a warehouse.
///
/// Holding `&mut Warehouse` keeps a second loader off the same handle for
/// the duration of the load.
pub struct Loader<'w> {
    warehouse: &'w mut Warehouse,
}

impl<'w> Loader<'w> {
    pub fn new(warehouse: &'w mut Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn load(&mut self, input: &LoadInput<'_>) -> Result<LoadReport> {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, "Starting warehouse load");

        let customer_rows = read_source(input.customers)?;
        let product_rows = read_source(input.products)?;
        let sale_rows = read_source(input.sales)?;

        self.warehouse.verify_schema()?;

        let mut report = LoadReport {
            run_id,
            tables: Vec::with_capacity(3),
            rejections: Vec::new(),
        };

        let customers = stage_table(
            Table::Customer,
            input.customers.label(),
            customer_rows,
            &mut report,
            CustomerRecord::key,
            |record| record.validate(),
            |c: &Customer| c.customer_id,
        );
        let products = stage_table(
            Table::Product,
            input.products.label(),
            product_rows,
            &mut report,
            ProductRecord::key,
            |record| record.validate(),
            |p: &Product| p.product_id,
        );

        let customer_ids: HashSet<i64> = customers.keys().copied().collect();
        let product_ids: HashSet<i64> = products.keys().copied().collect();
        let sales = stage_table(
            Table::Sale,
            input.sales.label(),
            sale_rows,
            &mut report,
            SaleRecord::key,
            |record| {
                let sale = record.validate()?;
                if !customer_ids.contains(&sale.customer_id) {
                    return Err(RejectReason::UnknownCustomer(sale.customer_id));
                }
                if !product_ids.contains(&sale.product_id) {
                    return Err(RejectReason::UnknownProduct(sale.product_id));
                }
                Ok(sale)
            },
            |s: &Sale| s.sale_id,
        );

        let staged = Staged {
            customers,
            products,
            sales,
        };
        self.write(&staged, report.rejected())?;

        tracing::info!(
            %run_id,
            customers = staged.customers.len(),
            products = staged.products.len(),
            sales = staged.sales.len(),
            rejected = report.rejected(),
            "Warehouse load committed"
        );
        Ok(report)
    }

    fn write(&mut self, staged: &Staged, rejected: usize) -> Result<()> {
        let conn = self.warehouse.connection_mut();
        let tx = conn.transaction()?;

        let mut accepted = 0;
        let fail = move |stage: LoadStage, accepted: usize| {
            move |error: duckdb::Error| WarehouseError::LoadFailed {
                stage,
                accepted,
                rejected,
                error,
            }
        };

        tx.execute_batch(&StarSchema::declared().ddl())
            .map_err(fail(LoadStage::Reset, accepted))?;

        insert_customers(&tx, staged.customers.values())
            .map_err(fail(LoadStage::Customers, accepted))?;
        accepted += staged.customers.len();

        insert_products(&tx, staged.products.values())
            .map_err(fail(LoadStage::Products, accepted))?;
        accepted += staged.products.len();

        insert_sales(&tx, staged.sales.values())
            .map_err(fail(LoadStage::Sales, accepted))?;
        accepted += staged.sales.len();

        tx.commit().map_err(fail(LoadStage::Commit, accepted))?;
        Ok(())
    }
}

fn read_source<T>(source: &dyn RecordSource<T>) -> Result<Vec<SourceRow<T>>> {
    let rows = source.read();
    if let Err(ref e) = rows {
        tracing::error!(source = %source.label(), error = %e, "Source unavailable, aborting load");
    }
    rows
}

/// Validate one table's records, dedupe by key (later record wins) and
/// record every rejection.
fn stage_table<R, T>(
    table: Table,
    label: String,
    rows: Vec<SourceRow<R>>,
    report: &mut LoadReport,
    key_of: impl Fn(&R) -> Option<String>,
    validate: impl Fn(R) -> std::result::Result<T, RejectReason>,
    id_of: impl Fn(&T) -> i64,
) -> BTreeMap<i64, T> {
    let mut summary = TableReport::new(table, label, rows.len());
    let mut staged = BTreeMap::new();

    for SourceRow { row, record } in rows {
        let (key, outcome) = match record {
            Ok(record) => (key_of(&record), validate(record)),
            Err(detail) => (None, Err(RejectReason::Unparseable(detail))),
        };
        match outcome {
            Ok(value) => {
                if staged.insert(id_of(&value), value).is_some() {
                    summary.superseded += 1;
                }
            }
            Err(reason) => {
                tracing::warn!(%table, row, key = ?key, %reason, "Rejected record");
                summary.rejected += 1;
                report.rejections.push(Rejection {
                    table,
                    row,
                    key,
                    reason,
                });
            }
        }
    }

    summary.accepted = staged.len();
    tracing::info!(
        %table,
        read = summary.read,
        accepted = summary.accepted,
        rejected = summary.rejected,
        superseded = summary.superseded,
        "Validated source"
    );
    report.tables.push(summary);
    staged
}

fn insert_customers<'a>(
    conn: &Connection,
    customers: impl Iterator<Item = &'a Customer>,
) -> duckdb::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO customer (customer_id, name, region, join_date, age, preferred_contact) \
         VALUES (?, ?, ?, CAST(? AS DATE), ?, ?)",
    )?;
    for c in customers {
        stmt.execute(params![
            c.customer_id,
            c.name,
            c.region,
            c.join_date.map(|d| d.to_string()),
            c.age,
            c.preferred_contact,
        ])?;
    }
    Ok(())
}

fn insert_products<'a>(
    conn: &Connection,
    products: impl Iterator<Item = &'a Product>,
) -> duckdb::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO product (product_id, product_name, category, unit_price_usd, stock, supplier) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )?;
    for p in products {
        stmt.execute(params![
            p.product_id,
            p.product_name,
            p.category.as_str(),
            p.unit_price_usd.dollars(),
            p.stock,
            p.supplier,
        ])?;
    }
    Ok(())
}

fn insert_sales<'a>(
    conn: &Connection,
    sales: impl Iterator<Item = &'a Sale>,
) -> duckdb::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO sale (sale_id, customer_id, product_id, sale_date, sale_amount_usd, quantity, \
                           store_id, campaign_id, discount_percent, payment_type) \
         VALUES (?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?)",
    )?;
    for s in sales {
        stmt.execute(params![
            s.sale_id,
            s.customer_id,
            s.product_id,
            s.sale_date.to_string(),
            s.sale_amount_usd.dollars(),
            s.quantity,
            s.store_id,
            s.campaign_id,
            s.discount_percent,
            s.payment_type,
        ])?;
    }
    Ok(())
}
