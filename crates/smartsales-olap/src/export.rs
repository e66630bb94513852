//! CSV export of cubes for BI tools
//!
//! Column naming follows `<column>_<aggregate>`: the dimension columns first,
//! then `sale_amount_usd_sum`, `sale_amount_usd_mean`, `sale_id_count`,
//! `quantity_sum`, and `sale_ids` for traceability.

use std::path::{Path, PathBuf};

use crate::cube::Cube;
use crate::error::CubeError;

const METRIC_COLUMNS: [&str; 5] = [
    "sale_amount_usd_sum",
    "sale_amount_usd_mean",
    "sale_id_count",
    "quantity_sum",
    "sale_ids",
];

pub fn header(cube: &Cube) -> Vec<String> {
    cube.dimensions()
        .iter()
        .map(|d| d.name().to_string())
        .chain(METRIC_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

/// Write `<dir>/<cube name>.csv`, creating `dir` if needed.
pub fn write_csv(cube: &Cube, dir: impl AsRef<Path>) -> Result<PathBuf, CubeError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.csv", cube.name()));

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(header(cube))?;
    for cell in &cube.cells {
        let ids: Vec<String> = cell.sale_ids.iter().map(|id| id.to_string()).collect();
        let record: Vec<String> = cell
            .key
            .iter()
            .map(|v| v.to_string())
            .chain([
                cell.total_sales.to_string(),
                format!("{:.2}", cell.average_sale()),
                cell.transaction_count.to_string(),
                cell.total_quantity.to_string(),
                format!("[{}]", ids.join(", ")),
            ])
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    tracing::info!(cube = cube.name(), path = %path.display(), "OLAP cube saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{aggregate, CubeSpec};
    use chrono::NaiveDate;
    use smartsales_dw::{Category, FactRow, Usd};

    #[test]
    fn test_write_csv() {
        let rows = vec![
            FactRow {
                sale_id: 582,
                customer_id: 1001,
                product_id: 101,
                sale_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                sale_amount: Usd::from_cents(634_496),
                quantity: 1,
                category: Category::parse("electronics").unwrap(),
                region: Some("East".to_string()),
            },
            FactRow {
                sale_id: 550,
                customer_id: 1001,
                product_id: 101,
                sale_date: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
                sale_amount: Usd::from_cents(100),
                quantity: 2,
                category: Category::parse("electronics").unwrap(),
                region: Some("East".to_string()),
            },
        ];
        let spec = CubeSpec::parse(
            "multidimensional_olap_cube",
            &["quarter", "product_id", "customer_id"],
        )
        .unwrap();
        let cube = aggregate(&spec, &rows).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&cube, dir.path().join("olap_cubing_outputs")).unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "quarter,product_id,customer_id,sale_amount_usd_sum,sale_amount_usd_mean,\
             sale_id_count,quantity_sum,sale_ids"
        );
        assert_eq!(lines[1], "1,101,1001,6345.96,3172.98,2,3,\"[550, 582]\"");
        assert_eq!(lines.len(), 2);
    }
}
