use smartsales_dw::WarehouseError;
use thiserror::Error;

/// Errors raised while defining, building or exporting a cube.
///
/// The definition errors (`UnknownDimension`, `DuplicateDimension`,
/// `NoDimensions`, `UnknownCube`) are raised before any row is read, so a
/// failed build never yields a partial cube.
#[derive(Debug, Error)]
pub enum CubeError {
    #[error("Undefined grouping dimension: {0}")]
    UnknownDimension(String),

    #[error("Dimension `{0}` is listed more than once")]
    DuplicateDimension(String),

    #[error("A cube needs at least one grouping dimension")]
    NoDimensions,

    #[error("Unknown cube: {0}")]
    UnknownCube(String),

    #[error("Totals of cube `{cube}` do not fit in the accumulator")]
    Overflow { cube: String },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("Failed to write cube: {0}")]
    Export(#[from] csv::Error),

    #[error("Failed to prepare output directory: {0}")]
    Io(#[from] std::io::Error),
}

impl CubeError {
    /// True for errors in the cube definition itself, as opposed to failures
    /// of the warehouse or the filesystem.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            CubeError::UnknownDimension(_)
                | CubeError::DuplicateDimension(_)
                | CubeError::NoDimensions
                | CubeError::UnknownCube(_)
        )
    }
}
