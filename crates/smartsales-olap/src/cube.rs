//! Cube builder: group-by-and-reduce over joined fact rows
//!
//! Aggregation happens in Rust over the rows returned by a plain SQL join,
//! so the same cube can be built against any store that can produce those
//! rows. Cells are accumulated in a `BTreeMap` keyed by the grouping values:
//! - only groups with at least one row exist (the output is sparse)
//! - the output is sorted ascending by key in dimension order
//! - sums use integer cents, so the result does not depend on row order

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use smartsales_dw::{FactRow, Usd, Warehouse};

use crate::dimension::{DimValue, Dimension};
use crate::error::CubeError;

pub const BY_QUARTER: &str = "by_quarter";
pub const BY_QUARTER_CATEGORY: &str = "by_quarter_category";

/// Name and grouping dimensions of a cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CubeSpec {
    name: String,
    dimensions: Vec<Dimension>,
}

impl CubeSpec {
    pub fn new(name: impl Into<String>, dimensions: Vec<Dimension>) -> Result<Self, CubeError> {
        if dimensions.is_empty() {
            return Err(CubeError::NoDimensions);
        }
        let mut seen = HashSet::new();
        for dim in &dimensions {
            if !seen.insert(*dim) {
                return Err(CubeError::DuplicateDimension(dim.name().to_string()));
            }
        }
        Ok(Self {
            name: name.into(),
            dimensions,
        })
    }

    /// Build a spec from dimension names, e.g. `["quarter", "product_id"]`.
    pub fn parse<S: AsRef<str>>(
        name: impl Into<String>,
        dimensions: &[S],
    ) -> Result<Self, CubeError> {
        let dimensions = dimensions
            .iter()
            .map(|d| d.as_ref().parse::<Dimension>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, dimensions)
    }

    /// Sales by calendar quarter, split by year.
    pub fn by_quarter() -> Self {
        Self {
            name: BY_QUARTER.to_string(),
            dimensions: vec![Dimension::Year, Dimension::Quarter],
        }
    }

    /// Sales by calendar quarter and product category, split by year.
    pub fn by_quarter_category() -> Self {
        Self {
            name: BY_QUARTER_CATEGORY.to_string(),
            dimensions: vec![Dimension::Year, Dimension::Quarter, Dimension::Category],
        }
    }

    pub fn named(name: &str) -> Result<Self, CubeError> {
        match name {
            BY_QUARTER => Ok(Self::by_quarter()),
            BY_QUARTER_CATEGORY => Ok(Self::by_quarter_category()),
            _ => Err(CubeError::UnknownCube(name.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// The same grouping as a standard SQL `GROUP BY` query.
    pub fn to_sql(&self) -> String {
        let keys: Vec<String> = self
            .dimensions
            .iter()
            .map(|d| format!("{} AS {}", d.sql_expr(), d.name()))
            .collect();
        let positions: Vec<String> = (1..=self.dimensions.len()).map(|i| i.to_string()).collect();
        let order: Vec<String> = self
            .dimensions
            .iter()
            .zip(1..)
            .map(|(d, position)| d.sql_order_term(position))
            .collect();

        format!(
            "SELECT {keys}, \
             SUM(s.sale_amount_usd) AS sale_amount_usd_sum, \
             AVG(s.sale_amount_usd) AS sale_amount_usd_mean, \
             COUNT(*) AS sale_id_count, \
             SUM(s.quantity) AS quantity_sum \
             FROM sale s \
             JOIN product p ON p.product_id = s.product_id \
             JOIN customer c ON c.customer_id = s.customer_id \
             GROUP BY {groups} \
             ORDER BY {order}",
            keys = keys.join(", "),
            groups = positions.join(", "),
            order = order.join(", "),
        )
    }
}

/// One group of a cube with its metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeCell {
    pub key: Vec<DimValue>,
    pub total_sales: Usd,
    pub transaction_count: u64,
    pub total_quantity: i64,
    /// Contributing sales, ascending.
    pub sale_ids: Vec<i64>,
}

impl CubeCell {
    fn empty(key: Vec<DimValue>) -> Self {
        Self {
            key,
            total_sales: Usd::ZERO,
            transaction_count: 0,
            total_quantity: 0,
            sale_ids: Vec::new(),
        }
    }

    /// `None` when a running total no longer fits.
    fn add(&mut self, row: &FactRow) -> Option<()> {
        self.total_sales = self.total_sales.checked_add(row.sale_amount)?;
        self.total_quantity = self.total_quantity.checked_add(i64::from(row.quantity))?;
        self.transaction_count += 1;
        self.sale_ids.push(row.sale_id);
        Some(())
    }

    /// Mean sale amount in dollars.
    pub fn average_sale(&self) -> f64 {
        if self.transaction_count == 0 {
            0.0
        } else {
            self.total_sales.dollars() / self.transaction_count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    pub spec: CubeSpec,
    pub cells: Vec<CubeCell>,
}

impl Cube {
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn dimensions(&self) -> &[Dimension] {
        self.spec.dimensions()
    }

    /// Value of `dim` in `cell`, if the cube groups by it.
    pub fn value<'c>(&self, cell: &'c CubeCell, dim: Dimension) -> Option<&'c DimValue> {
        let idx = self.dimensions().iter().position(|d| *d == dim)?;
        cell.key.get(idx)
    }

    pub fn cell(&self, key: &[DimValue]) -> Option<&CubeCell> {
        self.cells.iter().find(|c| c.key == key)
    }

    /// Grand total over all cells, `None` on overflow.
    pub fn total_sales(&self) -> Option<Usd> {
        Usd::checked_sum(self.cells.iter().map(|c| c.total_sales))
    }

    pub fn transaction_count(&self) -> u64 {
        self.cells.iter().map(|c| c.transaction_count).sum()
    }

    /// Cells as flat JSON objects: one field per dimension plus the metrics.
    pub fn to_json(&self) -> serde_json::Value {
        let cells: Vec<serde_json::Value> = self
            .cells
            .iter()
            .map(|cell| {
                let mut object = serde_json::Map::new();
                for (dim, value) in self.dimensions().iter().zip(&cell.key) {
                    object.insert(dim.name().to_string(), serde_json::json!(value));
                }
                object.insert("total_sales".to_string(), serde_json::json!(cell.total_sales));
                object.insert(
                    "transaction_count".to_string(),
                    serde_json::json!(cell.transaction_count),
                );
                object.insert("average_sale".to_string(), serde_json::json!(cell.average_sale()));
                object.insert(
                    "total_quantity".to_string(),
                    serde_json::json!(cell.total_quantity),
                );
                object.insert("sale_ids".to_string(), serde_json::json!(cell.sale_ids));
                serde_json::Value::Object(object)
            })
            .collect();

        serde_json::json!({
            "name": self.name(),
            "dimensions": self.dimensions(),
            "cells": cells,
            "cell_count": self.cells.len(),
        })
    }
}

/// Group `rows` by the cube's dimensions and reduce each group.
///
/// Pure: any slice of rows, including an empty one, produces a cube unless a
/// cell's totals overflow.
pub fn aggregate(spec: &CubeSpec, rows: &[FactRow]) -> Result<Cube, CubeError> {
    let mut groups: BTreeMap<Vec<DimValue>, CubeCell> = BTreeMap::new();
    for row in rows {
        let key: Vec<DimValue> = spec.dimensions.iter().map(|d| d.value_of(row)).collect();
        groups
            .entry(key)
            .or_insert_with_key(|key| CubeCell::empty(key.clone()))
            .add(row)
            .ok_or_else(|| CubeError::Overflow {
                cube: spec.name().to_string(),
            })?;
    }

    let cells = groups
        .into_values()
        .map(|mut cell| {
            cell.sale_ids.sort_unstable();
            cell
        })
        .collect();

    Ok(Cube {
        spec: spec.clone(),
        cells,
    })
}

/// Builds cubes from the facts currently in a warehouse.
pub struct CubeBuilder<'w> {
    warehouse: &'w Warehouse,
}

impl<'w> CubeBuilder<'w> {
    pub fn new(warehouse: &'w Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn build(&self, spec: &CubeSpec) -> Result<Cube, CubeError> {
        let rows = self.warehouse.fact_rows()?;
        let cube = aggregate(spec, &rows)?;
        tracing::info!(
            cube = spec.name(),
            dimensions = ?spec.dimensions(),
            rows = rows.len(),
            cells = cube.cells.len(),
            "OLAP cube created"
        );
        Ok(cube)
    }

    pub fn by_quarter(&self) -> Result<Cube, CubeError> {
        self.build(&CubeSpec::by_quarter())
    }

    pub fn by_quarter_category(&self) -> Result<Cube, CubeError> {
        self.build(&CubeSpec::by_quarter_category())
    }

    /// Build a named cube, or an ad-hoc one from a comma-separated list of
    /// dimension names.
    pub fn build_named(&self, name: &str) -> Result<Cube, CubeError> {
        let spec = match CubeSpec::named(name) {
            Ok(spec) => spec,
            Err(_) if name.contains(',') || name.parse::<Dimension>().is_ok() => {
                let dims: Vec<&str> = name.split(',').filter(|d| !d.trim().is_empty()).collect();
                CubeSpec::parse(name.replace(',', "_"), &dims)?
            }
            Err(e) => return Err(e),
        };
        self.build(&spec)
    }
}
