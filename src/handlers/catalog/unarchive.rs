// handlers/catalog/unarchive.rs - POST /api/catalog/unarchive handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::api::entities_to_api_value;
use crate::api::opaque_id::{decode_product_id, decode_shop_id, encode_product_id};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{UnarchiveError, UnarchiveInput};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnarchiveProductsPayload {
    pub client_mutation_id: Option<String>,
    pub products: Value,
}

/// Body: `{ clientMutationId?, productIds: [opaque], shopId: opaque }`.
/// Ids are decoded here; the service only sees internal ids.
pub async fn unarchive_products(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<UnarchiveProductsPayload> {
    let Json(body) = body?;

    let client_mutation_id = match body.get("clientMutationId") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ApiError::validation_error("clientMutationId must be a string", None)),
    };

    let opaque = UnarchiveInput::from_value(&body)?;
    let product_ids = opaque
        .product_ids
        .iter()
        .map(|id| decode_product_id(id))
        .collect::<Result<Vec<_>, _>>()?;
    let shop_id = decode_shop_id(&opaque.shop_id)?;

    let checker = user.permission_checker();
    let products = state
        .service
        .unarchive(&checker, UnarchiveInput { product_ids, shop_id })
        .await
        .map_err(with_opaque_ids)?;

    Ok(ApiResponse::success(UnarchiveProductsPayload {
        client_mutation_id,
        products: entities_to_api_value(&products),
    }))
}

/// Errors that name entities must name them the way the caller does
fn with_opaque_ids(err: UnarchiveError) -> UnarchiveError {
    let encode_all = |ids: Vec<String>| -> Vec<String> { ids.iter().map(|id| encode_product_id(id)).collect() };
    match err {
        UnarchiveError::Authorization { denied } => UnarchiveError::Authorization { denied: encode_all(denied) },
        UnarchiveError::PartialFailure { failed, transitioned } => UnarchiveError::PartialFailure {
            failed: encode_all(failed),
            transitioned: encode_all(transitioned),
        },
        other => other,
    }
}
