//! Email mapping CRUD endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mapping::{CreateMappingRequest, MappingPage, MappingRecord, UpdateMappingRequest};
use crate::server::{acting_user, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub per_page: Option<i64>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> MessageResponse<T> {
    fn new(message: &str, data: Option<T>) -> Self {
        Self {
            message: message.to_string(),
            data,
        }
    }
}

/// GET /api/v1/email-mappings
#[tracing::instrument(name = "http.list_mappings", skip(state))]
pub async fn list_mappings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MappingPage>> {
    let page = state.mappings.list(query.per_page, query.page).await?;
    Ok(Json(page))
}

/// POST /api/v1/email-mappings
#[tracing::instrument(
    name = "http.create_mapping",
    skip(state, headers, request),
    fields(module = %request.module, menu = %request.menu, task = %request.task)
)]
pub async fn create_mapping(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateMappingRequest>,
) -> Result<(StatusCode, Json<MessageResponse<MappingRecord>>)> {
    let created = state
        .mappings
        .create(request, acting_user(&headers))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Email Mapping created successfully.",
            Some(created),
        )),
    ))
}

/// GET /api/v1/email-mappings/{id}
#[tracing::instrument(name = "http.get_mapping", skip(state))]
pub async fn get_mapping(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DataResponse<MappingRecord>>> {
    let mapping = state.mappings.get(id).await?;
    Ok(Json(DataResponse { data: mapping }))
}

/// PUT /api/v1/email-mappings/{id}
#[tracing::instrument(name = "http.update_mapping", skip(state, headers, request))]
pub async fn update_mapping(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<UpdateMappingRequest>,
) -> Result<Json<MessageResponse<MappingRecord>>> {
    let updated = state
        .mappings
        .update(id, request, acting_user(&headers))
        .await?;

    Ok(Json(MessageResponse::new(
        "Email Mapping updated successfully.",
        Some(updated),
    )))
}

/// DELETE /api/v1/email-mappings/{id}
#[tracing::instrument(name = "http.delete_mapping", skip(state))]
pub async fn delete_mapping(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse<()>>> {
    state.mappings.delete(id).await?;
    Ok(Json(MessageResponse::new(
        "Email Mapping deleted successfully.",
        None,
    )))
}
