use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, Document};
use tracing::{event, Level};

use crate::{
    catalog,
    domain::{bson_to_json, toy_to_json, ID},
    dtos::{
        CountResponse, CreateToyResponse, CreateToysResponse, DeleteResponse, HealthResponse,
        Response, ToyResponse, ToysResponse, UpdateResponse, TOY_RECEIVED_MESSAGE,
    },
    errors::ToyStoreError,
    repositories::{FindSpec, ToyRepository},
};

// traits
pub trait Command {}
pub trait Query {}

#[allow(async_fn_in_trait)]
pub trait CommandHandler<C: Command, R: Response> {
    async fn handle(&self, input: &C) -> Result<R, ToyStoreError>;
}

#[allow(async_fn_in_trait)]
pub trait QueryHandler<Q: Query, R: Response> {
    async fn handle(&self, input: &Q) -> Result<R, ToyStoreError>;
}

// commands
pub struct CreateToyCommand {
    pub toy: Document,
}
impl Command for CreateToyCommand {}

pub struct CreateToysCommand {
    pub toys: Vec<Document>,
}
impl Command for CreateToysCommand {}

/// One update against the toys matching `filter`. With `require_match` an
/// empty match is reported as not found.
pub struct UpdateToysCommand {
    pub filter: Document,
    pub update: Document,
    pub many: bool,
    pub require_match: bool,
}
impl Command for UpdateToysCommand {}

pub struct DeleteToyCommand {
    pub id: ObjectId,
}
impl Command for DeleteToyCommand {}

// queries
pub struct FindToysQuery {
    pub filter: Document,
    pub spec: FindSpec,
}
impl Query for FindToysQuery {}

pub struct GetToyQuery {
    pub id: ObjectId,
}
impl Query for GetToyQuery {}

pub struct CountToysQuery {
    pub filter: Document,
}
impl Query for CountToysQuery {}

pub struct AggregateToysQuery {
    pub pipeline: Vec<Document>,
}
impl Query for AggregateToysQuery {}

pub struct HealthQuery;
impl Query for HealthQuery {}

// command handlers
#[derive(Clone)]
pub struct CreateToyCommandHandler {
    repository: Arc<dyn ToyRepository>,
}

impl CreateToyCommandHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        CreateToyCommandHandler { repository }
    }
}

impl CommandHandler<CreateToyCommand, CreateToyResponse> for CreateToyCommandHandler {
    async fn handle(&self, input: &CreateToyCommand) -> Result<CreateToyResponse, ToyStoreError> {
        event!(Level::DEBUG, "Inserting toy {}", input.toy);
        let inserted_id = self.repository.insert_one(input.toy.clone()).await?;

        Ok(CreateToyResponse {
            message: String::from(TOY_RECEIVED_MESSAGE),
            inserted_id: bson_to_json(&inserted_id),
        })
    }
}

#[derive(Clone)]
pub struct CreateToysCommandHandler {
    repository: Arc<dyn ToyRepository>,
}

impl CreateToysCommandHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        CreateToysCommandHandler { repository }
    }
}

impl CommandHandler<CreateToysCommand, CreateToysResponse> for CreateToysCommandHandler {
    async fn handle(&self, input: &CreateToysCommand) -> Result<CreateToysResponse, ToyStoreError> {
        if input.toys.is_empty() {
            return Err(ToyStoreError::InvalidBody(String::from("expected at least one toy")));
        }

        let inserted_ids = self.repository.insert_many(input.toys.clone()).await?;
        event!(Level::DEBUG, "Inserted {} toys", inserted_ids.len());

        Ok(CreateToysResponse {
            inserted_count: inserted_ids.len(),
            inserted_ids: inserted_ids.iter().map(bson_to_json).collect(),
        })
    }
}

#[derive(Clone)]
pub struct UpdateToysCommandHandler {
    repository: Arc<dyn ToyRepository>,
}

impl UpdateToysCommandHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        UpdateToysCommandHandler { repository }
    }
}

impl CommandHandler<UpdateToysCommand, UpdateResponse> for UpdateToysCommandHandler {
    async fn handle(&self, input: &UpdateToysCommand) -> Result<UpdateResponse, ToyStoreError> {
        event!(Level::DEBUG, "Updating toys matching {} with {}", input.filter, input.update);
        let outcome = self
            .repository
            .update(input.filter.clone(), input.update.clone(), input.many)
            .await?;

        if input.require_match && outcome.matched == 0 {
            let target = match input.filter.get_object_id(ID) {
                Ok(id) => id.to_hex(),
                Err(_) => input.filter.to_string(),
            };
            return Err(ToyStoreError::NotFound(target));
        }

        Ok(UpdateResponse {
            matched_count: outcome.matched,
            modified_count: outcome.modified,
        })
    }
}

#[derive(Clone)]
pub struct DeleteToyCommandHandler {
    repository: Arc<dyn ToyRepository>,
}

impl DeleteToyCommandHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        DeleteToyCommandHandler { repository }
    }
}

impl CommandHandler<DeleteToyCommand, DeleteResponse> for DeleteToyCommandHandler {
    async fn handle(&self, input: &DeleteToyCommand) -> Result<DeleteResponse, ToyStoreError> {
        let deleted_count = self.repository.delete(catalog::by_id(input.id), false).await?;

        if deleted_count == 0 {
            return Err(ToyStoreError::NotFound(input.id.to_hex()));
        }

        event!(Level::DEBUG, "Deleted toy {}", input.id);
        Ok(DeleteResponse { deleted_count })
    }
}

// query handlers
#[derive(Clone)]
pub struct FindToysQueryHandler {
    repository: Arc<dyn ToyRepository>,
}

impl FindToysQueryHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        FindToysQueryHandler { repository }
    }
}

impl QueryHandler<FindToysQuery, ToysResponse> for FindToysQueryHandler {
    async fn handle(&self, input: &FindToysQuery) -> Result<ToysResponse, ToyStoreError> {
        event!(Level::DEBUG, "Finding toys matching {}", input.filter);
        let toys = self.repository.find(input.filter.clone(), input.spec.clone()).await?;

        Ok(ToysResponse {
            toys: toys.iter().map(toy_to_json).collect(),
        })
    }
}

#[derive(Clone)]
pub struct GetToyQueryHandler {
    repository: Arc<dyn ToyRepository>,
}

impl GetToyQueryHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        GetToyQueryHandler { repository }
    }
}

impl QueryHandler<GetToyQuery, ToyResponse> for GetToyQueryHandler {
    async fn handle(&self, input: &GetToyQuery) -> Result<ToyResponse, ToyStoreError> {
        match self.repository.find_one(catalog::by_id(input.id)).await? {
            Some(toy) => Ok(ToyResponse { toy: toy_to_json(&toy) }),
            None => Err(ToyStoreError::NotFound(input.id.to_hex())),
        }
    }
}

#[derive(Clone)]
pub struct CountToysQueryHandler {
    repository: Arc<dyn ToyRepository>,
}

impl CountToysQueryHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        CountToysQueryHandler { repository }
    }
}

impl QueryHandler<CountToysQuery, CountResponse> for CountToysQueryHandler {
    async fn handle(&self, input: &CountToysQuery) -> Result<CountResponse, ToyStoreError> {
        let count = self.repository.count(input.filter.clone()).await?;
        Ok(CountResponse { count })
    }
}

#[derive(Clone)]
pub struct AggregateToysQueryHandler {
    repository: Arc<dyn ToyRepository>,
}

impl AggregateToysQueryHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        AggregateToysQueryHandler { repository }
    }
}

impl QueryHandler<AggregateToysQuery, ToysResponse> for AggregateToysQueryHandler {
    async fn handle(&self, input: &AggregateToysQuery) -> Result<ToysResponse, ToyStoreError> {
        let rows = self.repository.aggregate(input.pipeline.clone()).await?;
        event!(Level::DEBUG, "Aggregation produced {} rows", rows.len());

        Ok(ToysResponse {
            toys: rows.iter().map(toy_to_json).collect(),
        })
    }
}

#[derive(Clone)]
pub struct HealthQueryHandler {
    repository: Arc<dyn ToyRepository>,
}

impl HealthQueryHandler {
    pub fn new(repository: Arc<dyn ToyRepository>) -> Self {
        HealthQueryHandler { repository }
    }
}

impl QueryHandler<HealthQuery, HealthResponse> for HealthQueryHandler {
    async fn handle(&self, _: &HealthQuery) -> Result<HealthResponse, ToyStoreError> {
        self.repository.ping().await?;
        Ok(HealthResponse {
            status: String::from("ok"),
        })
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use mongodb::bson::{doc, Bson};

    use super::*;
    use crate::repositories::{MockToyRepository, UpdateOutcome};

    #[tokio::test]
    async fn create_returns_received_message_and_hex_id() {
        let oid = ObjectId::new();
        let mut repository = MockToyRepository::new();
        repository
            .expect_insert_one()
            .with(eq(doc! { "name": "Yo-yo" }))
            .times(1)
            .returning(move |_| Ok(Bson::ObjectId(oid)));

        let handler = CreateToyCommandHandler::new(Arc::new(repository));
        let response = handler
            .handle(&CreateToyCommand { toy: doc! { "name": "Yo-yo" } })
            .await
            .unwrap();

        assert_eq!(response.message, "Toy data received successfully!");
        assert_eq!(response.inserted_id, serde_json::json!(oid.to_hex()));
    }

    #[tokio::test]
    async fn bulk_create_rejects_empty_batches() {
        let mut repository = MockToyRepository::new();
        repository.expect_insert_many().never();

        let handler = CreateToysCommandHandler::new(Arc::new(repository));
        let result = handler.handle(&CreateToysCommand { toys: vec![] }).await;

        assert!(matches!(result, Err(ToyStoreError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn update_without_match_is_not_found_when_required() {
        let mut repository = MockToyRepository::new();
        repository
            .expect_update()
            .returning(|_, _, _| Ok(UpdateOutcome { matched: 0, modified: 0 }));
        let handler = UpdateToysCommandHandler::new(Arc::new(repository));
        let id = ObjectId::new();

        let result = handler
            .handle(&UpdateToysCommand {
                filter: catalog::by_id(id),
                update: catalog::restock(1),
                many: false,
                require_match: true,
            })
            .await;
        assert!(matches!(result, Err(ToyStoreError::NotFound(target)) if target == id.to_hex()));

        let response = handler
            .handle(&UpdateToysCommand {
                filter: catalog::by_category("Kite"),
                update: catalog::adjust_price(1.0),
                many: true,
                require_match: false,
            })
            .await
            .unwrap();
        assert_eq!(response, UpdateResponse { matched_count: 0, modified_count: 0 });
    }

    #[tokio::test]
    async fn delete_of_missing_toy_is_not_found() {
        let mut repository = MockToyRepository::new();
        repository
            .expect_delete()
            .withf(|_, many| !*many)
            .returning(|_, _| Ok(0));

        let handler = DeleteToyCommandHandler::new(Arc::new(repository));
        let result = handler.handle(&DeleteToyCommand { id: ObjectId::new() }).await;

        assert!(matches!(result, Err(ToyStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn database_errors_propagate() {
        let mut repository = MockToyRepository::new();
        repository
            .expect_find()
            .returning(|_, _| Err(ToyStoreError::Database(String::from("connection reset"))));

        let handler = FindToysQueryHandler::new(Arc::new(repository));
        let result = handler
            .handle(&FindToysQuery {
                filter: catalog::cheap(),
                spec: FindSpec::default(),
            })
            .await;

        assert!(matches!(result, Err(ToyStoreError::Database(_))));
    }

    #[tokio::test]
    async fn find_passes_filter_and_spec_through() {
        let mut repository = MockToyRepository::new();
        repository
            .expect_find()
            .with(eq(catalog::premium()), eq(catalog::names_only()))
            .returning(|_, _| Ok(vec![doc! { "name": "Castle", "price": 150 }]));

        let handler = FindToysQueryHandler::new(Arc::new(repository));
        let response = handler
            .handle(&FindToysQuery {
                filter: catalog::premium(),
                spec: catalog::names_only(),
            })
            .await
            .unwrap();

        assert_eq!(response.toys, vec![serde_json::json!({ "name": "Castle", "price": 150 })]);
    }

    #[tokio::test]
    async fn get_missing_toy_is_not_found() {
        let mut repository = MockToyRepository::new();
        repository.expect_find_one().returning(|_| Ok(None));

        let handler = GetToyQueryHandler::new(Arc::new(repository));
        let result = handler.handle(&GetToyQuery { id: ObjectId::new() }).await;

        assert!(matches!(result, Err(ToyStoreError::NotFound(_))));
    }
}
