use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    routing::{get, post, put},
    Router,
};
use mongodb::bson::{Bson, Document};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::{
    catalog,
    config::ConfigError,
    cqrs::{
        AggregateToysQuery, CommandHandler, CountToysQuery, CreateToyCommand, CreateToysCommand,
        DeleteToyCommand, FindToysQuery, GetToyQuery, HealthQuery, QueryHandler, UpdateToysCommand,
    },
    domain::{parse_toy_id, toy_from_json},
    dtos::{
        CategoriesParams, LimitParams, PageParams, PriceAdjustment, PriceRangeParams, PriceUpdate,
        RatingUpdate, RenameFieldRequest, RestockRequest, SearchParams, TagRequest,
    },
    errors::ToyStoreError,
    repositories::FindSpec,
    state::AppState,
};

type ApiResult = Result<(StatusCode, Json<Value>), ToyStoreError>;

pub fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = origin.parse::<HeaderValue>().map_err(|_| ConfigError::Invalid {
        key: String::from("CORS_ORIGIN"),
        value: String::from(origin),
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true))
}

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/toys", post(create_toy).get(get_all_toys))
        .route("/toys/bulk", post(create_toys))
        .route("/toys/count", get(count_toys))
        .route("/toys/count/category/{category}", get(count_toys_in_category))
        .route("/toys/sorted/price-asc", get(get_toys_by_price_ascending))
        .route("/toys/sorted/price-desc", get(get_toys_by_price_descending))
        .route("/toys/sorted/rating", get(get_toys_by_rating))
        .route("/toys/top-rated", get(get_top_rated_toys))
        .route("/toys/category/{category}", get(get_toys_in_category))
        .route("/toys/category/{category}/price", put(adjust_category_price))
        .route("/toys/not-category/{category}", get(get_toys_not_in_category))
        .route("/toys/seller/{email}", get(get_toys_by_seller))
        .route("/toys/price-range", get(get_toys_in_price_range))
        .route("/toys/cheap", get(get_cheap_toys))
        .route("/toys/premium", get(get_premium_toys))
        .route("/toys/not-cheap", get(get_not_cheap_toys))
        .route("/toys/in-categories", get(get_toys_in_categories))
        .route("/toys/not-in-categories", get(get_toys_not_in_categories))
        .route("/toys/with-image", get(get_toys_with_image))
        .route("/toys/without-description", get(get_toys_without_description))
        .route("/toys/string-priced", get(get_string_priced_toys))
        .route("/toys/search", get(search_toys))
        .route("/toys/popular-in-stock", get(get_popular_in_stock_toys))
        .route("/toys/deals", get(get_deals))
        .route("/toys/out-of-stock", get(get_out_of_stock_toys))
        .route("/toys/names", get(get_toy_names))
        .route("/toys/summary", get(get_toy_summaries))
        .route("/toys/page", get(get_toy_page))
        .route("/toys/stats/categories", get(get_category_stats))
        .route("/toys/stats/sellers", get(get_seller_stats))
        .route("/toys/stats/price", get(get_price_stats))
        .route("/toys/{id}", get(get_toy).put(update_toy).delete(delete_toy))
        .route("/toys/{id}/price", put(update_toy_price))
        .route("/toys/{id}/restock", put(restock_toy))
        .route("/toys/{id}/rename-field", put(rename_toy_field))
        .route("/toys/{id}/unset-description", put(unset_toy_description))
        .route("/toys/{id}/tags", put(add_toy_tag))
        .route("/toys/{id}/tags/remove", put(remove_toy_tag))
        .route("/toys/{id}/rating", put(update_toy_rating))
        .with_state(state)
        .layer(cors)
}

pub async fn index() -> &'static str {
    "This is home page."
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult {
    let response = state.health_query_handler.handle(&HealthQuery).await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

async fn find_toys(state: &AppState, filter: Document, spec: FindSpec) -> ApiResult {
    let response = state
        .find_toys_query_handler
        .handle(&FindToysQuery { filter, spec })
        .await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

async fn count(state: &AppState, filter: Document) -> ApiResult {
    let response = state.count_toys_query_handler.handle(&CountToysQuery { filter }).await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

async fn aggregate(state: &AppState, pipeline: Vec<Document>) -> ApiResult {
    let response = state
        .aggregate_toys_query_handler
        .handle(&AggregateToysQuery { pipeline })
        .await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

async fn update_one_toy(state: &AppState, id: &str, update: Document) -> ApiResult {
    let command = UpdateToysCommand {
        filter: catalog::by_id(parse_toy_id(id)?),
        update,
        many: false,
        require_match: true,
    };
    let response = state.update_toys_command_handler.handle(&command).await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

// create

pub async fn create_toy(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> ApiResult {
    let command = CreateToyCommand {
        toy: toy_from_json(body)?,
    };
    let response = state.create_toy_command_handler.handle(&command).await?;
    Ok((StatusCode::CREATED, Json(json!(response))))
}

pub async fn create_toys(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Vec<Value>>,
) -> ApiResult {
    let command = CreateToysCommand {
        toys: body.into_iter().map(toy_from_json).collect::<Result<_, _>>()?,
    };
    let response = state.create_toys_command_handler.handle(&command).await?;
    Ok((StatusCode::CREATED, Json(json!(response))))
}

// read

pub async fn get_all_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::all_toys(), FindSpec::default()).await
}

pub async fn get_toy(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let query = GetToyQuery { id: parse_toy_id(&id)? };
    let response = state.get_toy_query_handler.handle(&query).await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

pub async fn count_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    count(&state, catalog::all_toys()).await
}

pub async fn count_toys_in_category(
    Path(category): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    count(&state, catalog::by_category(&category)).await
}

pub async fn get_toys_by_price_ascending(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::all_toys(), catalog::sorted_by_price(true)).await
}

pub async fn get_toys_by_price_descending(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::all_toys(), catalog::sorted_by_price(false)).await
}

pub async fn get_toys_by_rating(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::all_toys(), catalog::sorted_by_rating()).await
}

pub async fn get_top_rated_toys(
    Query(params): Query<LimitParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    find_toys(&state, catalog::all_toys(), catalog::top_rated(params.limit)).await
}

pub async fn get_toys_in_category(
    Path(category): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    find_toys(&state, catalog::by_category(&category), FindSpec::default()).await
}

pub async fn get_toys_not_in_category(
    Path(category): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    find_toys(&state, catalog::not_category(&category), FindSpec::default()).await
}

pub async fn get_toys_by_seller(
    Path(email): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    find_toys(&state, catalog::by_seller(&email), FindSpec::default()).await
}

pub async fn get_toys_in_price_range(
    Query(params): Query<PriceRangeParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    find_toys(&state, catalog::price_range(params.min, params.max), FindSpec::default()).await
}

pub async fn get_cheap_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::cheap(), FindSpec::default()).await
}

pub async fn get_premium_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::premium(), FindSpec::default()).await
}

pub async fn get_not_cheap_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::not_cheap(), FindSpec::default()).await
}

pub async fn get_toys_in_categories(
    Query(params): Query<CategoriesParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    let categories = catalog::parse_categories(params.categories.as_deref());
    find_toys(&state, catalog::in_categories(&categories), FindSpec::default()).await
}

pub async fn get_toys_not_in_categories(
    Query(params): Query<CategoriesParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    let categories = catalog::parse_categories(params.categories.as_deref());
    find_toys(&state, catalog::not_in_categories(&categories), FindSpec::default()).await
}

pub async fn get_toys_with_image(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::with_image(), FindSpec::default()).await
}

pub async fn get_toys_without_description(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::without_description(), FindSpec::default()).await
}

pub async fn get_string_priced_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::string_priced(), FindSpec::default()).await
}

pub async fn search_toys(
    Query(params): Query<SearchParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    find_toys(&state, catalog::name_search(&params.name), FindSpec::default()).await
}

pub async fn get_popular_in_stock_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::popular_in_stock(), FindSpec::default()).await
}

pub async fn get_deals(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::deals(), FindSpec::default()).await
}

pub async fn get_out_of_stock_toys(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::out_of_stock(), FindSpec::default()).await
}

pub async fn get_toy_names(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::all_toys(), catalog::names_only()).await
}

pub async fn get_toy_summaries(State(state): State<Arc<AppState>>) -> ApiResult {
    find_toys(&state, catalog::all_toys(), catalog::summary()).await
}

pub async fn get_toy_page(
    Query(params): Query<PageParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    find_toys(&state, catalog::all_toys(), catalog::page(params.page, params.limit)).await
}

pub async fn get_category_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    aggregate(&state, catalog::category_stats()).await
}

pub async fn get_seller_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    aggregate(&state, catalog::seller_stats()).await
}

pub async fn get_price_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    aggregate(&state, catalog::price_stats()).await
}

// update

pub async fn update_toy(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult {
    let fields = toy_from_json(body)?;
    if fields.is_empty() {
        return Err(ToyStoreError::InvalidBody(String::from("expected at least one field to set")));
    }
    update_one_toy(&state, &id, catalog::set_fields(fields)).await
}

pub async fn update_toy_price(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PriceUpdate>,
) -> ApiResult {
    let price = Bson::try_from(body.price)?;
    update_one_toy(&state, &id, catalog::set_price(price)).await
}

pub async fn update_toy_rating(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RatingUpdate>,
) -> ApiResult {
    update_one_toy(&state, &id, catalog::set_rating(body.rating)).await
}

pub async fn restock_toy(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: Option<Json<RestockRequest>>,
) -> ApiResult {
    let Json(body) = body.unwrap_or_else(|| Json(RestockRequest::default()));
    update_one_toy(&state, &id, catalog::restock(body.amount)).await
}

pub async fn rename_toy_field(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RenameFieldRequest>,
) -> ApiResult {
    if body.from.is_empty() || body.to.is_empty() || body.from == body.to {
        return Err(ToyStoreError::InvalidBody(String::from(
            "from and to must be different field names",
        )));
    }
    update_one_toy(&state, &id, catalog::rename_field(&body.from, &body.to)).await
}

pub async fn unset_toy_description(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    update_one_toy(&state, &id, catalog::unset_description()).await
}

pub async fn add_toy_tag(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TagRequest>,
) -> ApiResult {
    update_one_toy(&state, &id, catalog::push_tag(&body.tag)).await
}

pub async fn remove_toy_tag(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TagRequest>,
) -> ApiResult {
    update_one_toy(&state, &id, catalog::pull_tag(&body.tag)).await
}

pub async fn adjust_category_price(
    Path(category): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PriceAdjustment>,
) -> ApiResult {
    let command = UpdateToysCommand {
        filter: catalog::by_category(&category),
        update: catalog::adjust_price(body.amount),
        many: true,
        require_match: false,
    };
    let response = state.update_toys_command_handler.handle(&command).await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

// delete

pub async fn delete_toy(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let command = DeleteToyCommand { id: parse_toy_id(&id)? };
    let response = state.delete_toy_command_handler.handle(&command).await?;
    Ok((StatusCode::OK, Json(json!(response))))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use mongodb::bson::{doc, oid::ObjectId};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::DEFAULT_CORS_ORIGIN,
        repositories::{InMemoryToyRepository, ToyRepository},
    };

    struct Shelf {
        app: Router,
        racer: String,
        hauler: String,
        siren: String,
        castle: String,
    }

    async fn shelf() -> Shelf {
        let repository = Arc::new(InMemoryToyRepository::new());
        let ids = repository
            .insert_many(vec![
                doc! {
                    "name": "Racer", "category": "Sports Car", "price": 15, "rating": 4.7,
                    "quantity": 3,
                    "sellerName": "Ana", "sellerEmail": "ana@toys.test", "image": "racer.png",
                    "description": "Fast red car"
                },
                doc! {
                    "name": "Hauler", "category": "Truck", "price": 45.5, "rating": 4.2,
                    "quantity": 0, "sellerName": "Bo", "sellerEmail": "bo@toys.test",
                    "description": "Big dump truck"
                },
                doc! {
                    "name": "Siren", "category": "Police Car", "price": "12", "rating": 3.9,
                    "quantity": 5,
                    "sellerName": "Ana", "sellerEmail": "ana@toys.test", "image": "siren.png",
                    "description": "Lights and sound"
                },
                doc! {
                    "name": "Castle", "category": "Building", "price": 150, "rating": 4.9,
                    "quantity": 1,
                    "sellerName": "Cy", "sellerEmail": "cy@toys.test"
                },
            ])
            .await
            .unwrap();

        let hex: Vec<String> = ids
            .iter()
            .map(|id| id.as_object_id().unwrap().to_hex())
            .collect();
        let state = Arc::new(AppState::new(repository));

        Shelf {
            app: router(state, cors_layer(DEFAULT_CORS_ORIGIN).unwrap()),
            racer: hex[0].clone(),
            hauler: hex[1].clone(),
            siren: hex[2].clone(),
            castle: hex[3].clone(),
        }
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn get_json(app: &Router, uri: &str) -> Value {
        let (status, body) = send(app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK, "GET {} returned {}", uri, body);
        body
    }

    fn names(value: &Value) -> Vec<&str> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|toy| toy["name"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn home_page() {
        let shelf = shelf().await;
        let (status, body) = send(&shelf.app, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("This is home page."));
    }

    #[tokio::test]
    async fn health_pings_repository() {
        let shelf = shelf().await;
        assert_eq!(get_json(&shelf.app, "/health").await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn create_then_fetch_toy() {
        let shelf = shelf().await;
        let (status, body) = send(
            &shelf.app,
            Method::POST,
            "/toys",
            Some(json!({ "name": "Kite", "category": "Outdoor", "price": 8 })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], json!("Toy data received successfully!"));

        let id = body["insertedId"].as_str().unwrap().to_string();
        let toy = get_json(&shelf.app, &format!("/toys/{}", id)).await;
        assert_eq!(toy, json!({ "_id": id, "name": "Kite", "category": "Outdoor", "price": 8 }));
    }

    #[tokio::test]
    async fn create_rejects_non_object_body() {
        let shelf = shelf().await;
        let (status, body) = send(&shelf.app, Method::POST, "/toys", Some(json!(["Kite"]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn bulk_create() {
        let shelf = shelf().await;
        let (status, body) = send(
            &shelf.app,
            Method::POST,
            "/toys/bulk",
            Some(json!([{ "name": "Ball" }, { "name": "Drum" }])),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["insertedCount"], json!(2));
        assert_eq!(get_json(&shelf.app, "/toys/count").await, json!({ "count": 6 }));
    }

    #[tokio::test]
    async fn bulk_create_rejects_non_object_entries() {
        let shelf = shelf().await;
        let (status, body) = send(
            &shelf.app,
            Method::POST,
            "/toys/bulk",
            Some(json!([{ "name": "Ball" }, "Drum"])),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
        assert_eq!(get_json(&shelf.app, "/toys/count").await, json!({ "count": 4 }));
    }

    #[tokio::test]
    async fn malformed_json_is_rejected_by_the_extractor() {
        let shelf = shelf().await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/toys")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{\"name\": \"Kite\""))
            .unwrap();

        let response = shelf.app.clone().oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(get_json(&shelf.app, "/toys/count").await, json!({ "count": 4 }));
    }

    #[tokio::test]
    async fn restock_without_body_adds_one() {
        let shelf = shelf().await;
        let castle = format!("/toys/{}", shelf.castle);
        let restock = format!("{}/restock", castle);
        let (status, body) = send(&shelf.app, Method::PUT, &restock, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "matchedCount": 1, "modifiedCount": 1 }));
        assert_eq!(get_json(&shelf.app, &castle).await["quantity"], json!(2));
    }

    #[tokio::test]
    async fn nan_prices_sort_first() {
        let shelf = shelf().await;
        let toys: Vec<Value> = (0..40)
            .map(|i| {
                let price = if i % 3 == 0 {
                    json!({ "$numberDouble": "NaN" })
                } else {
                    json!(i)
                };
                json!({ "name": format!("Marble {}", i), "price": price })
            })
            .collect();
        let (status, _) =
            send(&shelf.app, Method::POST, "/toys/bulk", Some(Value::Array(toys))).await;
        assert_eq!(status, StatusCode::CREATED);

        let sorted = get_json(&shelf.app, "/toys/sorted/price-asc").await;
        assert_eq!(sorted.as_array().unwrap().len(), 44);
        assert_eq!(sorted[0]["price"], json!({ "$numberDouble": "NaN" }));
        assert_eq!(sorted[14]["price"], json!(1));
    }

    #[tokio::test]
    async fn decimal_prices_take_part_in_filters_and_stats() {
        let shelf = shelf().await;
        let (status, _) = send(
            &shelf.app,
            Method::POST,
            "/toys",
            Some(json!({ "name": "Abacus", "price": { "$numberDecimal": "5.00" } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        assert_eq!(names(&get_json(&shelf.app, "/toys/cheap").await), vec!["Racer", "Abacus"]);
        let price = get_json(&shelf.app, "/toys/stats/price").await;
        assert_eq!(price[0]["toys"], json!(4));
        assert!(price[0]["avgPrice"].is_number());
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids() {
        let shelf = shelf().await;

        let (status, body) = send(&shelf.app, Method::GET, "/toys/not-an-id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid toy id: not-an-id" }));

        let missing = ObjectId::new().to_hex();
        let (status, _) = send(&shelf.app, Method::GET, &format!("/toys/{}", missing), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &shelf.app,
            Method::PUT,
            &format!("/toys/{}/price", missing),
            Some(json!({ "price": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": format!("Toy not found: {}", missing) }));
    }

    #[tokio::test]
    async fn lists_and_counts() {
        let shelf = shelf().await;
        assert_eq!(
            names(&get_json(&shelf.app, "/toys").await),
            vec!["Racer", "Hauler", "Siren", "Castle"]
        );
        assert_eq!(get_json(&shelf.app, "/toys/count").await, json!({ "count": 4 }));
        assert_eq!(get_json(&shelf.app, "/toys/count/category/Truck").await, json!({ "count": 1 }));
    }

    #[tokio::test]
    async fn sorted_routes() {
        let shelf = shelf().await;
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/sorted/price-asc").await),
            vec!["Racer", "Hauler", "Castle", "Siren"]
        );
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/sorted/price-desc").await),
            vec!["Siren", "Castle", "Hauler", "Racer"]
        );
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/sorted/rating").await),
            vec!["Castle", "Racer", "Hauler", "Siren"]
        );
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/top-rated?limit=2").await),
            vec!["Castle", "Racer"]
        );
    }

    #[tokio::test]
    async fn equality_and_range_filters() {
        let shelf = shelf().await;
        assert_eq!(names(&get_json(&shelf.app, "/toys/category/Truck").await), vec!["Hauler"]);
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/not-category/Truck").await),
            vec!["Racer", "Siren", "Castle"]
        );
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/seller/ana@toys.test").await),
            vec!["Racer", "Siren"]
        );
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/price-range?min=10&max=50").await),
            vec!["Racer", "Hauler"]
        );
        assert_eq!(names(&get_json(&shelf.app, "/toys/cheap").await), vec!["Racer"]);
        assert_eq!(names(&get_json(&shelf.app, "/toys/premium").await), vec!["Castle"]);
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/not-cheap").await),
            vec!["Hauler", "Siren", "Castle"]
        );
    }

    #[tokio::test]
    async fn membership_existence_and_type_filters() {
        let shelf = shelf().await;
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/in-categories").await),
            vec!["Racer", "Hauler", "Siren"]
        );
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/not-in-categories?categories=Truck,Building").await),
            vec!["Racer", "Siren"]
        );
        assert_eq!(names(&get_json(&shelf.app, "/toys/with-image").await), vec!["Racer", "Siren"]);
        assert_eq!(names(&get_json(&shelf.app, "/toys/without-description").await), vec!["Castle"]);
        assert_eq!(names(&get_json(&shelf.app, "/toys/string-priced").await), vec!["Siren"]);
        assert_eq!(names(&get_json(&shelf.app, "/toys/search?name=SIR").await), vec!["Siren"]);
    }

    #[tokio::test]
    async fn logical_filters() {
        let shelf = shelf().await;
        assert_eq!(
            names(&get_json(&shelf.app, "/toys/popular-in-stock").await),
            vec!["Racer", "Castle"]
        );
        assert_eq!(names(&get_json(&shelf.app, "/toys/deals").await), vec!["Racer", "Castle"]);
        assert_eq!(names(&get_json(&shelf.app, "/toys/out-of-stock").await), vec!["Hauler"]);
    }

    #[tokio::test]
    async fn projections_and_paging() {
        let shelf = shelf().await;

        let listed = get_json(&shelf.app, "/toys/names").await;
        assert_eq!(listed[0], json!({ "name": "Racer", "price": 15 }));

        let summaries = get_json(&shelf.app, "/toys/summary").await;
        assert!(summaries[0].get("description").is_none());
        assert!(summaries[0].get("sellerEmail").is_none());
        assert_eq!(summaries[0]["_id"], json!(shelf.racer));

        assert_eq!(
            names(&get_json(&shelf.app, "/toys/page?page=2&limit=2").await),
            vec!["Siren", "Castle"]
        );
        let past_the_end = get_json(&shelf.app, "/toys/page?page=3&limit=2").await;
        assert!(past_the_end.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn field_updates() {
        let shelf = shelf().await;
        let racer = format!("/toys/{}", shelf.racer);

        let (status, body) = send(
            &shelf.app,
            Method::PUT,
            &format!("{}/restock", racer),
            Some(json!({ "amount": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "matchedCount": 1, "modifiedCount": 1 }));

        send(&shelf.app, Method::PUT, &format!("{}/restock", racer), Some(json!({}))).await;
        let price = json!({ "price": "17.50" });
        send(&shelf.app, Method::PUT, &format!("{}/price", racer), Some(price)).await;
        let rating = json!({ "rating": 5.0 });
        send(&shelf.app, Method::PUT, &format!("{}/rating", racer), Some(rating)).await;
        send(
            &shelf.app,
            Method::PUT,
            &format!("{}/rename-field", racer),
            Some(json!({ "from": "sellerName", "to": "seller" })),
        )
        .await;
        send(&shelf.app, Method::PUT, &format!("{}/unset-description", racer), None).await;
        send(&shelf.app, Method::PUT, &racer, Some(json!({ "image": "racer-v2.png" }))).await;

        let toy = get_json(&shelf.app, &racer).await;
        assert_eq!(toy["quantity"], json!(6));
        assert_eq!(toy["price"], json!("17.50"));
        assert_eq!(toy["rating"], json!(5.0));
        assert_eq!(toy["seller"], json!("Ana"));
        assert!(toy.get("sellerName").is_none());
        assert!(toy.get("description").is_none());
        assert_eq!(toy["image"], json!("racer-v2.png"));
    }

    #[tokio::test]
    async fn unchanged_update_reports_no_modification() {
        let shelf = shelf().await;
        let (status, body) = send(
            &shelf.app,
            Method::PUT,
            &format!("/toys/{}/unset-description", shelf.castle),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "matchedCount": 1, "modifiedCount": 0 }));
    }

    #[tokio::test]
    async fn rename_requires_distinct_names() {
        let shelf = shelf().await;
        let (status, _) = send(
            &shelf.app,
            Method::PUT,
            &format!("/toys/{}/rename-field", shelf.racer),
            Some(json!({ "from": "name", "to": "name" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tag_push_and_pull() {
        let shelf = shelf().await;
        let tags = format!("/toys/{}/tags", shelf.siren);

        send(&shelf.app, Method::PUT, &tags, Some(json!({ "tag": "loud" }))).await;
        send(&shelf.app, Method::PUT, &tags, Some(json!({ "tag": "blue" }))).await;
        let loud = json!({ "tag": "loud" });
        send(&shelf.app, Method::PUT, &format!("{}/remove", tags), Some(loud)).await;

        let toy = get_json(&shelf.app, &format!("/toys/{}", shelf.siren)).await;
        assert_eq!(toy["tags"], json!(["blue"]));
    }

    #[tokio::test]
    async fn category_wide_price_adjustment() {
        let shelf = shelf().await;
        let (status, body) = send(
            &shelf.app,
            Method::PUT,
            "/toys/category/Truck/price",
            Some(json!({ "amount": -5.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "matchedCount": 1, "modifiedCount": 1 }));

        let hauler = get_json(&shelf.app, &format!("/toys/{}", shelf.hauler)).await;
        assert_eq!(hauler["price"], json!(40.0));

        let (status, body) = send(
            &shelf.app,
            Method::PUT,
            "/toys/category/Kites/price",
            Some(json!({ "amount": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "matchedCount": 0, "modifiedCount": 0 }));
    }

    #[tokio::test]
    async fn delete_toy_once() {
        let shelf = shelf().await;
        let castle = format!("/toys/{}", shelf.castle);

        let (status, body) = send(&shelf.app, Method::DELETE, &castle, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "deletedCount": 1 }));

        let (status, _) = send(&shelf.app, Method::DELETE, &castle, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(get_json(&shelf.app, "/toys/count").await, json!({ "count": 3 }));
    }

    #[tokio::test]
    async fn aggregation_routes() {
        let shelf = shelf().await;

        let categories = get_json(&shelf.app, "/toys/stats/categories").await;
        assert_eq!(categories.as_array().unwrap().len(), 4);
        assert_eq!(categories[0], json!({ "_id": "Building", "count": 1, "avgPrice": 150.0 }));
        assert_eq!(categories[1], json!({ "_id": "Police Car", "count": 1, "avgPrice": null }));

        let sellers = get_json(&shelf.app, "/toys/stats/sellers").await;
        assert_eq!(
            sellers[0],
            json!({ "_id": "ana@toys.test", "sellerName": "Ana", "toys": 2, "totalQuantity": 8 })
        );
        assert_eq!(sellers[2]["_id"], json!("bo@toys.test"));

        let price = get_json(&shelf.app, "/toys/stats/price").await;
        assert_eq!(price[0]["toys"], json!(3));
        assert_eq!(price[0]["minPrice"], json!(15));
        assert_eq!(price[0]["maxPrice"], json!(150));
        assert!(price[0].get("_id").is_none());
    }

    #[tokio::test]
    async fn cors_headers_for_configured_origin() {
        let shelf = shelf().await;

        let request = Request::builder()
            .uri("/toys")
            .header("Origin", DEFAULT_CORS_ORIGIN)
            .body(Body::empty())
            .unwrap();
        let response = shelf.app.clone().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], DEFAULT_CORS_ORIGIN);
        assert_eq!(headers["access-control-allow-credentials"], "true");

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/toys")
            .header("Origin", DEFAULT_CORS_ORIGIN)
            .header("Access-Control-Request-Method", "PUT")
            .body(Body::empty())
            .unwrap();
        let response = shelf.app.clone().oneshot(preflight).await.unwrap();
        let methods = response.headers()["access-control-allow-methods"].to_str().unwrap();
        assert!(methods.contains("PUT"));
        assert!(methods.contains("DELETE"));
    }

    #[test]
    fn invalid_cors_origin_is_a_config_error() {
        assert!(matches!(cors_layer("bad\norigin"), Err(ConfigError::Invalid { .. })));
    }
}
