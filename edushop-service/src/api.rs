use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use serde::Serialize;
use shared::*;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use crate::error::AppError;
use crate::store::{LessonStore, OrderStore};
use crate::workflow::OrderWorkflow;

#[derive(Clone)]
pub struct AppState {
    pub lessons: Arc<dyn LessonStore>,
    pub orders: OrderWorkflow,
}

impl AppState {
    pub fn new(lessons: Arc<dyn LessonStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self {
            lessons,
            orders: OrderWorkflow::new(orders),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateLessonsResponse {
    pub message: String,
    pub result: BulkInsertResult,
}

#[derive(Debug, Serialize)]
pub struct UpdateLessonResponse {
    pub message: String,
    pub result: UpdateResult,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub message: String,
    pub results: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub message: String,
    pub order: Order,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/lessons", get(list_lessons).post(create_lessons))
        .route("/api/lessons/:id", put(update_lesson))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_lessons(
    State(state): State<AppState>,
    payload: Result<Json<Vec<NewLesson>>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateLessonsResponse>), Response> {
    let insert = async {
        let Json(batch) = payload?;
        NewLesson::validate_batch(&batch)?;
        Ok::<_, AppError>(state.lessons.insert_lessons(batch).await?)
    };

    match insert.await {
        Ok(result) => {
            tracing::info!("Created {} lessons", result.inserted_count);
            Ok((
                StatusCode::CREATED,
                Json(CreateLessonsResponse {
                    message: "Lessons created successfully".to_string(),
                    result,
                }),
            ))
        }
        Err(e) => Err(e.into_flagged_response()),
    }
}

pub async fn update_lesson(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<LessonPatch>, JsonRejection>,
) -> Result<Json<UpdateLessonResponse>, AppError> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    patch.validate()?;

    let result = state.lessons.update_lesson(id, patch).await?;
    tracing::info!("Lesson {} update matched {} records", id, result.matched_count);

    Ok(Json(UpdateLessonResponse {
        message: "Lesson updated successfully".to_string(),
        result,
    }))
}

pub async fn list_lessons(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Lesson>>, AppError> {
    let results = state.lessons.list_lessons().await?;

    Ok(Json(ListResponse {
        message: "Lessons fetched successfully".to_string(),
        results,
    }))
}

pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let Json(request) = payload?;
    let order = state.orders.place_order(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            message: "Order created successfully".to_string(),
            order,
        }),
    ))
}

pub async fn list_orders(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Order>>, AppError> {
    let results = state.orders.list_orders().await?;

    Ok(Json(ListResponse {
        message: "Orders fetched successfully".to_string(),
        results,
    }))
}

pub async fn health_check() -> impl IntoResponse {
    "OK"
}
