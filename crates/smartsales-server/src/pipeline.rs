//! Batch stages driven by the CLI: define schema, load, build cubes

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use smartsales_dw::{
    CsvSource, CustomerRecord, LoadInput, LoadReport, Loader, ProductRecord, RecordSource,
    SaleRecord, Warehouse,
};
use smartsales_olap::{write_csv, CubeBuilder, CubeSpec};
use tracing::Level;

use crate::config::Config;

/// Create (or recreate) the star schema in the configured warehouse.
pub fn init_warehouse(config: &Config) -> anyhow::Result<Warehouse> {
    let started = Instant::now();
    let mut warehouse = open(config)?;
    warehouse.define_schema().context("defining star schema")?;

    crate::log_event!(
        level: Level::INFO,
        event: "stage_finished",
        stage: "init",
        duration_ms: started.elapsed().as_millis()
    );
    Ok(warehouse)
}

/// Load the configured CSV sources into an existing warehouse.
pub fn load(config: &Config) -> anyhow::Result<LoadReport> {
    let mut warehouse = open(config)?;
    load_into(&mut warehouse, config)
}

/// Load into the configured warehouse, creating the star schema first when it
/// is missing or does not match.
///
/// An existing warehouse keeps its data until every source has been read, so
/// a missing or unreadable file leaves the previous load in place.
pub fn run(config: &Config) -> anyhow::Result<LoadReport> {
    let mut warehouse = open(config)?;
    if let Err(err) = warehouse.verify_schema() {
        let customers = CsvSource::new(config.sources.customers_path());
        let products = CsvSource::new(config.sources.products_path());
        let sales = CsvSource::new(config.sources.sales_path());
        RecordSource::<CustomerRecord>::read(&customers)?;
        RecordSource::<ProductRecord>::read(&products)?;
        RecordSource::<SaleRecord>::read(&sales)?;

        tracing::warn!(error = %err, "Recreating star schema before load");
        warehouse.define_schema().context("defining star schema")?;
    }
    load_into(&mut warehouse, config)
}

fn open(config: &Config) -> anyhow::Result<Warehouse> {
    Warehouse::open(&config.warehouse.path)
        .with_context(|| format!("opening warehouse {}", config.warehouse.path.display()))
}

fn load_into(warehouse: &mut Warehouse, config: &Config) -> anyhow::Result<LoadReport> {
    let started = Instant::now();
    let customers = CsvSource::new(config.sources.customers_path());
    let products = CsvSource::new(config.sources.products_path());
    let sales = CsvSource::new(config.sources.sales_path());
    let report = Loader::new(warehouse).load(&LoadInput {
        customers: &customers,
        products: &products,
        sales: &sales,
    })?;

    crate::log_event!(
        level: Level::INFO,
        event: "stage_finished",
        stage: "load",
        accepted: report.accepted(),
        rejected: report.rejected(),
        duration_ms: started.elapsed().as_millis()
    );
    Ok(report)
}

/// Build cubes from the warehouse and write one CSV per cube.
///
/// `cubes` holds cube names or comma-separated dimension lists; when empty
/// the two standard cubes are built.
pub fn build_cubes(config: &Config, cubes: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let started = Instant::now();
    let warehouse = Warehouse::open_read_only(&config.warehouse.path)
        .with_context(|| format!("opening warehouse {}", config.warehouse.path.display()))?;
    let builder = CubeBuilder::new(&warehouse);

    let built = if cubes.is_empty() {
        vec![
            builder.build(&CubeSpec::by_quarter())?,
            builder.build(&CubeSpec::by_quarter_category())?,
        ]
    } else {
        cubes
            .iter()
            .map(|name| builder.build_named(name))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut written = Vec::with_capacity(built.len());
    for cube in &built {
        written.push(write_csv(cube, &config.output.cube_dir)?);
    }

    crate::log_event!(
        level: Level::INFO,
        event: "stage_finished",
        stage: "cube",
        cubes: written.len(),
        duration_ms: started.elapsed().as_millis()
    );
    Ok(written)
}

/// Print a human summary of a load report.
pub fn print_report(report: &LoadReport) {
    println!("Load run {}", report.run_id);
    for table in &report.tables {
        println!(
            "  {:<9} read {:>6}  accepted {:>6}  rejected {:>4}  superseded {:>4}  ({})",
            table.table.to_string(),
            table.read,
            table.accepted,
            table.rejected,
            table.superseded,
            table.source
        );
    }
    for rejection in &report.rejections {
        println!(
            "  rejected {} row {} key {}: {}",
            rejection.table,
            rejection.row,
            rejection.key.as_deref().unwrap_or("-"),
            rejection.reason
        );
    }
}
