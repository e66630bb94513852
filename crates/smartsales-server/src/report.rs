//! Read-only reporting API over the warehouse
//!
//! Provides REST API endpoints for:
//! - Table row counts and contents
//! - Named and ad-hoc cubes
//! - Ad-hoc SQL on a read-only connection
//!
//! Every request opens its own read-only connection on a blocking thread, so
//! the server never holds a DuckDB handle across requests.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use smartsales_dw::{Warehouse, WarehouseError};
use smartsales_olap::{quarter_end, quarter_of, Cube, CubeBuilder, CubeError, DimValue, Dimension};
use thiserror::Error;

#[derive(Clone)]
pub struct ReportState {
    warehouse_path: Arc<PathBuf>,
}

impl ReportState {
    pub fn new(warehouse_path: impl Into<PathBuf>) -> Self {
        Self {
            warehouse_path: Arc::new(warehouse_path.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Cube(#[from] CubeError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ReportError {
    fn status(&self) -> StatusCode {
        match self {
            ReportError::Warehouse(WarehouseError::UnknownTable(_)) => StatusCode::NOT_FOUND,
            ReportError::Cube(CubeError::UnknownCube(_)) => StatusCode::NOT_FOUND,
            ReportError::Cube(e) if e.is_definition_error() => StatusCode::BAD_REQUEST,
            ReportError::Warehouse(WarehouseError::Database(_)) => StatusCode::BAD_REQUEST,
            ReportError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Report request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Report request rejected");
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CubeParams {
    #[serde(default)]
    pub complete_quarters_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
}

pub fn router(state: ReportState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tables", get(list_tables))
        .route("/tables/:name", get(get_table))
        .route("/cubes/:name", get(get_cube))
        .route("/query", post(run_query))
        .with_state(state)
}

pub async fn serve(addr: &str, state: ReportState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("SmartSales reporting API listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Run `f` against a fresh read-only connection on the blocking pool.
async fn with_warehouse<T, F>(state: &ReportState, f: F) -> Result<T, ReportError>
where
    F: FnOnce(&Warehouse) -> Result<T, ReportError> + Send + 'static,
    T: Send + 'static,
{
    let path = Arc::clone(&state.warehouse_path);
    tokio::task::spawn_blocking(move || {
        let warehouse = Warehouse::open_read_only(path.as_path())?;
        f(&warehouse)
    })
    .await?
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_tables(
    State(state): State<ReportState>,
) -> Result<Json<serde_json::Value>, ReportError> {
    let counts = with_warehouse(&state, |w| Ok(w.row_counts()?)).await?;
    Ok(Json(serde_json::json!({
        "customer": counts.customers,
        "product": counts.products,
        "sale": counts.sales,
    })))
}

async fn get_table(
    State(state): State<ReportState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ReportError> {
    tracing::debug!(table = %name, "Table requested");
    let rows = with_warehouse(&state, move |w| Ok(w.table_rows(&name)?)).await?;
    Ok(Json(rows.to_json()))
}

async fn get_cube(
    State(state): State<ReportState>,
    Path(name): Path<String>,
    Query(params): Query<CubeParams>,
) -> Result<Json<serde_json::Value>, ReportError> {
    tracing::debug!(
        cube = %name,
        complete_quarters_only = params.complete_quarters_only,
        "Cube requested"
    );
    let cube = with_warehouse(&state, move |w| {
        let cube = CubeBuilder::new(w).build_named(&name)?;
        if params.complete_quarters_only {
            drop_incomplete_quarter(cube, w.last_sale_date()?)
        } else {
            Ok(cube)
        }
    })
    .await?;
    Ok(Json(cube.to_json()))
}

async fn run_query(
    State(state): State<ReportState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<serde_json::Value>, ReportError> {
    if req.sql.trim().is_empty() {
        return Err(ReportError::BadRequest("Query is empty".to_string()));
    }
    let result = with_warehouse(&state, move |w| Ok(w.query(&req.sql)?)).await?;
    Ok(Json(result.to_json()))
}

/// Remove the cells of the final quarter when the data stops before that
/// quarter's last calendar day.
///
/// Needs both `year` and `quarter` among the cube's dimensions.
pub fn drop_incomplete_quarter(
    mut cube: Cube,
    last_sale: Option<NaiveDate>,
) -> Result<Cube, ReportError> {
    let (Some(year_idx), Some(quarter_idx)) = (
        cube.dimensions().iter().position(|d| *d == Dimension::Year),
        cube.dimensions().iter().position(|d| *d == Dimension::Quarter),
    ) else {
        return Err(ReportError::BadRequest(format!(
            "Cube `{}` must group by year and quarter to exclude incomplete quarters",
            cube.name()
        )));
    };
    let Some(last) = last_sale else {
        return Ok(cube);
    };

    let quarter = quarter_of(last);
    if quarter_end(last.year(), quarter) == Some(last) {
        return Ok(cube);
    }

    let year = DimValue::Int(i64::from(last.year()));
    let quarter = DimValue::Int(i64::from(quarter));
    let before = cube.cells.len();
    cube.cells
        .retain(|cell| !(cell.key[year_idx] == year && cell.key[quarter_idx] == quarter));
    tracing::info!(
        cube = cube.name(),
        last_sale = %last,
        dropped = before - cube.cells.len(),
        "Excluded incomplete final quarter"
    );
    Ok(cube)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use smartsales_dw::{CustomerRecord, LoadInput, Loader, ProductRecord, SaleRecord};
    use smartsales_olap::{aggregate, CubeSpec};

    fn sale(id: i64, product_id: i64, date: &str, amount: f64) -> SaleRecord {
        SaleRecord {
            sale_id: Some(id),
            customer_id: Some(1),
            product_id: Some(product_id),
            sale_date: Some(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()),
            sale_amount_usd: Some(amount),
            quantity: Some(1),
            ..Default::default()
        }
    }

    fn warehouse_file(dir: &std::path::Path) -> ReportState {
        let path = dir.join("smart_sales.duckdb");
        let mut warehouse = Warehouse::open(&path).unwrap();
        warehouse.define_schema().unwrap();

        let customers = vec![CustomerRecord {
            customer_id: Some(1),
            name: Some("C1".to_string()),
            region: Some("East".to_string()),
            ..Default::default()
        }];
        let products = vec![
            ProductRecord {
                product_id: Some(1),
                product_name: Some("P1".to_string()),
                category: Some("clothing".to_string()),
                unit_price_usd: Some(50.0),
                ..Default::default()
            },
            ProductRecord {
                product_id: Some(2),
                product_name: Some("P2".to_string()),
                category: Some("sporting".to_string()),
                unit_price_usd: Some(20.0),
                ..Default::default()
            },
        ];
        let sales = vec![
            sale(1, 1, "2024-07-01", 100.0),
            sale(2, 1, "2024-07-15", 50.0),
            sale(3, 2, "2024-10-20", 20.0),
        ];
        Loader::new(&mut warehouse)
            .load(&LoadInput {
                customers: &customers,
                products: &products,
                sales: &sales,
            })
            .unwrap();
        drop(warehouse);

        ReportState::new(path)
    }

    #[tokio::test]
    async fn test_list_tables() {
        let dir = tempfile::tempdir().unwrap();
        let state = warehouse_file(dir.path());

        let Json(body) = list_tables(State(state)).await.unwrap();
        assert_eq!(body["customer"], 1);
        assert_eq!(body["product"], 2);
        assert_eq!(body["sale"], 3);
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = warehouse_file(dir.path());

        let err = get_table(State(state.clone()), Path("store".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let Json(body) = get_table(State(state), Path("product".to_string())).await.unwrap();
        assert_eq!(body["row_count"], 2);
    }

    #[tokio::test]
    async fn test_cube_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = warehouse_file(dir.path());

        let Json(all) = get_cube(
            State(state.clone()),
            Path("by_quarter".to_string()),
            Query(CubeParams::default()),
        )
        .await
        .unwrap();
        assert_eq!(all["cell_count"], 2);

        // Last sale is 2024-10-20, so Q4 2024 is incomplete
        let Json(complete) = get_cube(
            State(state.clone()),
            Path("by_quarter_category".to_string()),
            Query(CubeParams {
                complete_quarters_only: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(complete["cell_count"], 1);
        assert_eq!(complete["cells"][0]["quarter"], 3);
        assert_eq!(complete["cells"][0]["category"], "clothing");
        assert_eq!(complete["cells"][0]["total_sales"], 150.0);

        let err = get_cube(
            State(state),
            Path("quarter,weather".to_string()),
            Query(CubeParams::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let state = warehouse_file(dir.path());

        let Json(body) = run_query(
            State(state.clone()),
            Json(QueryRequest {
                sql: "SELECT COUNT(*) AS n FROM sale".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["rows"][0]["n"], 3);

        let err = run_query(
            State(state),
            Json(QueryRequest {
                sql: "DELETE FROM sale".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_complete_quarter_is_kept() {
        let rows = vec![smartsales_dw::FactRow {
            sale_id: 1,
            customer_id: 1,
            product_id: 1,
            sale_date: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            sale_amount: smartsales_dw::Usd::from_cents(100),
            quantity: 1,
            category: smartsales_dw::Category::parse("clothing").unwrap(),
            region: None,
        }];
        let cube = aggregate(&CubeSpec::by_quarter(), &rows).unwrap();
        let quarter_end = NaiveDate::from_ymd_opt(2024, 9, 30);
        let kept = drop_incomplete_quarter(cube.clone(), quarter_end).unwrap();
        assert_eq!(kept.cells.len(), 1);

        let by_month = CubeSpec::parse("by_month", &["month"]).unwrap();
        let month_only = aggregate(&by_month, &rows).unwrap();
        assert!(matches!(
            drop_incomplete_quarter(month_only, None),
            Err(ReportError::BadRequest(_))
        ));
    }
}
