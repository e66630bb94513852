//! SmartSales OLAP engine
//!
//! Derives calendar attributes from sale dates, groups warehouse facts by
//! one or more dimensions and reduces each group to sales metrics
//! (total, mean, transaction count, quantity).
//!
//! Two cubes answer the seasonal staffing question directly:
//! - [`CubeSpec::by_quarter`]: year × quarter
//! - [`CubeSpec::by_quarter_category`]: year × quarter × product category

pub mod cube;
pub mod dimension;
pub mod error;
pub mod export;

pub use cube::{aggregate, Cube, CubeBuilder, CubeCell, CubeSpec, BY_QUARTER, BY_QUARTER_CATEGORY};
pub use dimension::{quarter_end, quarter_of, DimValue, Dimension};
pub use error::CubeError;
pub use export::write_csv;
