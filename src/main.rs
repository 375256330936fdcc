/// API сервер конвейеров обучения

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber;

use seqlab::{
    ingest::{quote_columns, read_table_from_str, sales_columns},
    types::{
        DirectionRequest, DirectionResponse, SalesRequest, SalesResponse, SurvivalRequest,
        SurvivalResponse,
    },
    DirectionModel, SalesModel, SeqlabError, SurvivalModel,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/survival/train", post(train_survival))
        .route("/api/direction/train", post(train_direction))
        .route("/api/sales/train", post(train_sales))
        .layer(cors);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8000));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://0.0.0.0:8000");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Seqlab API (Rust)",
        "version": "0.1.0"
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Ошибки конвейера, отображенные на HTTP статусы
struct ApiError(SeqlabError);

impl From<SeqlabError> for ApiError {
    fn from(err: SeqlabError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SeqlabError::EmptyDataset | SeqlabError::MissingColumn(_) | SeqlabError::Csv(_) => {
                StatusCode::BAD_REQUEST
            }
            SeqlabError::InsufficientData { .. } | SeqlabError::InvalidParameter { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!("Request failed: {}", self.0);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn train_survival(
    Json(request): Json<SurvivalRequest>,
) -> Result<Json<SurvivalResponse>, ApiError> {
    tracing::info!("Survival train request: {} bytes of CSV", request.train_csv.len());

    let schema = request.schema.unwrap_or_default();
    let train_table = read_table_from_str(&request.train_csv, &SurvivalModel::columns(&schema, true))?;
    let test_columns = SurvivalModel::columns(&schema, false);

    let mut model = SurvivalModel::new(schema, request.options)?;
    let report = model.train(&train_table)?;

    let predictions = match &request.test_csv {
        Some(csv) => {
            let test_table = read_table_from_str(csv, &test_columns)?;
            Some(model.predict(&test_table)?)
        }
        None => None,
    };

    let bundle = model.bundle()?;
    Ok(Json(SurvivalResponse {
        report,
        predictions,
        bundle,
    }))
}

async fn train_direction(
    Json(request): Json<DirectionRequest>,
) -> Result<Json<DirectionResponse>, ApiError> {
    tracing::info!("Direction train request: {} bytes of CSV", request.csv.len());

    let table = read_table_from_str(&request.csv, &quote_columns())?;
    let mut model = DirectionModel::new(request.options)?;
    let report = model.train(&table)?;
    let bundle = model.bundle()?;

    Ok(Json(DirectionResponse { report, bundle }))
}

async fn train_sales(Json(request): Json<SalesRequest>) -> Result<Json<SalesResponse>, ApiError> {
    tracing::info!("Sales train request: {} bytes of CSV", request.csv.len());

    let table = read_table_from_str(&request.csv, &sales_columns())?;
    let mut model = SalesModel::new(request.options)?;
    let report = model.train(&table)?;
    let bundle = model.bundle()?;

    Ok(Json(SalesResponse { report, bundle }))
}
