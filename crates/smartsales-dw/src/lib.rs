//! SmartSales data warehouse
//!
//! Star-schema warehouse on DuckDB for retail sales data: two dimension
//! tables (`customer`, `product`), one fact table (`sale`), and an ETL loader
//! that validates cleaned records, enforces referential integrity and
//! replaces the warehouse contents idempotently.

pub mod error;
pub mod loader;
pub mod model;
pub mod schema;
pub mod source;
pub mod warehouse;

pub use error::{LoadStage, Result, WarehouseError};
pub use loader::{LoadInput, LoadReport, Loader, Rejection, Table, TableReport};
pub use model::{
    Category, Customer, CustomerRecord, FactRow, Product, ProductRecord, RejectReason, Sale,
    SaleRecord, Usd,
};
pub use schema::StarSchema;
pub use source::{CsvSource, RecordSource, SourceRow};
pub use warehouse::{QueryResult, RowCounts, Warehouse};
