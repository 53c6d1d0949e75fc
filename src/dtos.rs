use serde::{Deserialize, Serialize};
use serde_json::Value;

pub trait Response {}

pub const TOY_RECEIVED_MESSAGE: &str = "Toy data received successfully!";

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateToyResponse {
    pub message: String,
    pub inserted_id: Value,
}
impl Response for CreateToyResponse {}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateToysResponse {
    pub inserted_count: usize,
    pub inserted_ids: Vec<Value>,
}
impl Response for CreateToysResponse {}

/// Toys as the database returned them.
#[derive(Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ToysResponse {
    pub toys: Vec<Value>,
}
impl Response for ToysResponse {}

#[derive(Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ToyResponse {
    pub toy: Value,
}
impl Response for ToyResponse {}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub matched_count: u64,
    pub modified_count: u64,
}
impl Response for UpdateResponse {}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted_count: u64,
}
impl Response for DeleteResponse {}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct CountResponse {
    pub count: u64,
}
impl Response for CountResponse {}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}
impl Response for HealthResponse {}

#[derive(Debug, Deserialize, Serialize)]
pub struct ApiError {
    pub error: String,
}
impl Response for ApiError {}

// request bodies

#[derive(Debug, Deserialize)]
pub struct PriceUpdate {
    pub price: Value,
}

#[derive(Debug, Deserialize)]
pub struct RatingUpdate {
    pub rating: f64,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    #[serde(default = "default_restock_amount")]
    pub amount: i32,
}

fn default_restock_amount() -> i32 {
    1
}

impl Default for RestockRequest {
    fn default() -> Self {
        RestockRequest {
            amount: default_restock_amount(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PriceAdjustment {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct RenameFieldRequest {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub tag: String,
}

// query strings

#[derive(Debug, Default, Deserialize)]
pub struct PriceRangeParams {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoriesParams {
    pub categories: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub limit: Option<i64>,
}
