//! End-to-end loader tests against an in-memory and a file-backed warehouse

use chrono::NaiveDate;
use smartsales_dw::{
    CsvSource, CustomerRecord, LoadInput, Loader, ProductRecord, RecordSource, RejectReason,
    Result, SaleRecord, SourceRow, Table, Warehouse, WarehouseError,
};
use std::fs;

fn customers() -> Vec<CustomerRecord> {
    vec![
        CustomerRecord {
            customer_id: Some(1001),
            name: Some("William White".to_string()),
            region: Some("East".to_string()),
            join_date: NaiveDate::from_ymd_opt(2021, 11, 11),
            ..Default::default()
        },
        CustomerRecord {
            customer_id: Some(1002),
            name: Some("Wylie Coyote".to_string()),
            region: Some("West".to_string()),
            ..Default::default()
        },
    ]
}

fn products() -> Vec<ProductRecord> {
    vec![
        ProductRecord {
            product_id: Some(101),
            product_name: Some("laptop".to_string()),
            category: Some("Electronics".to_string()),
            unit_price_usd: Some(793.12),
            ..Default::default()
        },
        ProductRecord {
            product_id: Some(102),
            product_name: Some("hoodie".to_string()),
            category: Some("Clothing".to_string()),
            unit_price_usd: Some(39.10),
            ..Default::default()
        },
    ]
}

fn sale(
    id: i64,
    customer_id: i64,
    product_id: i64,
    date: (i32, u32, u32),
    amount: f64,
) -> SaleRecord {
    SaleRecord {
        sale_id: Some(id),
        customer_id: Some(customer_id),
        product_id: Some(product_id),
        sale_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        sale_amount_usd: Some(amount),
        quantity: Some(1),
        ..Default::default()
    }
}

fn sales() -> Vec<SaleRecord> {
    vec![
        sale(550, 1001, 101, (2024, 1, 6), 6344.96),
        sale(551, 1002, 102, (2024, 1, 6), 312.80),
        sale(552, 1001, 102, (2024, 4, 16), 431.00),
    ]
}

fn loaded_warehouse() -> Result<Warehouse> {
    let mut warehouse = Warehouse::open_in_memory()?;
    warehouse.define_schema()?;
    let (c, p, s) = (customers(), products(), sales());
    Loader::new(&mut warehouse).load(&LoadInput {
        customers: &c,
        products: &p,
        sales: &s,
    })?;
    Ok(warehouse)
}

#[test]
fn test_idempotent_reload() -> Result<()> {
    let mut warehouse = loaded_warehouse()?;
    let counts_once = warehouse.row_counts()?;
    let fingerprint_once = warehouse.fingerprint()?;

    let (c, p, s) = (customers(), products(), sales());
    let report = Loader::new(&mut warehouse).load(&LoadInput {
        customers: &c,
        products: &p,
        sales: &s,
    })?;

    assert!(report.is_clean());
    assert_eq!(warehouse.row_counts()?, counts_once);
    assert_eq!(warehouse.fingerprint()?, fingerprint_once);
    assert_eq!(counts_once.sales, 3);
    Ok(())
}

#[test]
fn test_reload_replaces_changed_dimension_rows() -> Result<()> {
    let mut warehouse = loaded_warehouse()?;

    let mut c = customers();
    c[1].region = Some("North".to_string());
    let (p, s) = (products(), sales());
    Loader::new(&mut warehouse).load(&LoadInput {
        customers: &c,
        products: &p,
        sales: &s,
    })?;

    let stored = warehouse.customers()?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].region.as_deref(), Some("North"));
    Ok(())
}

#[test]
fn test_dangling_customer_is_rejected() -> Result<()> {
    let mut warehouse = Warehouse::open_in_memory()?;
    warehouse.define_schema()?;

    let mut s = sales();
    s.push(sale(553, 9999, 101, (2024, 5, 1), 10.0));
    let (c, p) = (customers(), products());
    let report = Loader::new(&mut warehouse).load(&LoadInput {
        customers: &c,
        products: &p,
        sales: &s,
    })?;

    assert_eq!(report.rejected(), 1);
    let rejection = &report.rejections[0];
    assert_eq!(rejection.table, Table::Sale);
    assert_eq!(rejection.key.as_deref(), Some("553"));
    assert_eq!(rejection.reason, RejectReason::UnknownCustomer(9999));

    let stored = warehouse.sales()?;
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|s| s.sale_id != 553));

    let sale_report = report.table(Table::Sale).unwrap();
    assert_eq!((sale_report.read, sale_report.accepted, sale_report.rejected), (4, 3, 1));
    Ok(())
}

#[test]
fn test_every_loaded_sale_resolves_its_dimensions() -> Result<()> {
    let warehouse = loaded_warehouse()?;
    let dangling = warehouse.query(
        "SELECT COUNT(*) AS n FROM sale s \
         LEFT JOIN customer c ON c.customer_id = s.customer_id \
         LEFT JOIN product p ON p.product_id = s.product_id \
         WHERE c.customer_id IS NULL OR p.product_id IS NULL",
    )?;
    assert_eq!(dangling.rows[0][0], serde_json::json!(0));
    Ok(())
}

#[test]
fn test_malformed_records_are_counted_not_loaded() -> Result<()> {
    let mut warehouse = Warehouse::open_in_memory()?;
    warehouse.define_schema()?;

    let mut s = sales();
    s.push(SaleRecord {
        sale_amount_usd: None,
        ..sale(554, 1001, 101, (2024, 5, 1), 0.0)
    });
    let (c, p) = (customers(), products());
    let report = Loader::new(&mut warehouse).load(&LoadInput {
        customers: &c,
        products: &p,
        sales: &s,
    })?;

    assert_eq!(report.rejected(), 1);
    assert_eq!(
        report.rejections[0].reason,
        RejectReason::MissingField("sale_amount_usd")
    );
    assert_eq!(report.accepted(), 2 + 2 + 3);
    Ok(())
}

struct BrokenSource;

impl RecordSource<SaleRecord> for BrokenSource {
    fn label(&self) -> String {
        "sales-feed".to_string()
    }

    fn read(&self) -> Result<Vec<SourceRow<SaleRecord>>> {
        Err(WarehouseError::SourceUnavailable {
            source_name: self.label(),
            reason: "connection reset".to_string(),
        })
    }
}

#[test]
fn test_unavailable_source_leaves_prior_state() -> Result<()> {
    let mut warehouse = loaded_warehouse()?;
    let before = warehouse.fingerprint()?;

    let empty_customers: Vec<CustomerRecord> = Vec::new();
    let p = products();
    let err = Loader::new(&mut warehouse)
        .load(&LoadInput {
            customers: &empty_customers,
            products: &p,
            sales: &BrokenSource,
        })
        .unwrap_err();

    assert!(matches!(
        err,
        WarehouseError::SourceUnavailable { ref source_name, .. } if source_name == "sales-feed"
    ));
    assert_eq!(warehouse.fingerprint()?, before);
    Ok(())
}

#[test]
fn test_csv_sources_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let customers_csv = dir.path().join("customers_data_prepared.csv");
    let products_csv = dir.path().join("products_data_prepared.csv");
    let sales_csv = dir.path().join("sales_data_prepared.csv");

    fs::write(
        &customers_csv,
        "customer_id,name,region,join_date,age,preferred_contact\n\
         1001,William White,East,2021-11-11,33,Email\n\
         1002,Wylie Coyote,East,2023-02-14,,\n",
    )?;
    fs::write(
        &products_csv,
        "product_id,product_name,category,unit_price_usd,stock,supplier\n\
         101,laptop,Electronics,793.12,10,Acme\n\
         102,hoodie,Clothing,39.10,,\n",
    )?;
    fs::write(
        &sales_csv,
        "sale_id,customer_id,product_id,sale_date,sale_amount_usd,quantity,\
         store_id,campaign_id,discount_percent,payment_type\n\
         550,1001,101,2024-01-06,6344.96,8,404,0,0,CreditCard\n\
         551,1002,102,2024-01-06,312.80,8,403,0,10,PayPal\n\
         552,1002,777,2024-01-16,431.00,4,401,1,5,Cash\n\
         553,1001,102,yesterday,50.00,1,401,,,Cash\n",
    )?;

    let db_path = dir.path().join("dw").join("smart_sales.duckdb");
    let mut warehouse = Warehouse::open(&db_path)?;
    warehouse.define_schema()?;

    let report = Loader::new(&mut warehouse).load(&LoadInput {
        customers: &CsvSource::new(&customers_csv),
        products: &CsvSource::new(&products_csv),
        sales: &CsvSource::new(&sales_csv),
    })?;

    assert_eq!(report.rejected(), 2);
    assert!(report
        .rejections
        .iter()
        .any(|r| r.reason == RejectReason::UnknownProduct(777)));
    assert!(report
        .rejections
        .iter()
        .any(|r| matches!(r.reason, RejectReason::Unparseable(_)) && r.row == 4));

    drop(warehouse);
    let reader = Warehouse::open_read_only(&db_path)?;
    let stored = reader.sales()?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].sale_amount_usd.cents(), 634_496);
    assert_eq!(stored[1].discount_percent, Some(10.0));
    assert_eq!(reader.products()?[1].category.as_str(), "clothing");
    Ok(())
}
