use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    options::{ClientOptions, FindOptions, ServerApi, ServerApiVersion},
    Client, Collection,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{event, Level};

use crate::{config::MongoDbInitializationInfo, domain, engine, errors::ToyStoreError};

/// Cursor modifiers for a find. A limit of zero means no limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToyRepository: Send + Sync {
    async fn insert_one(&self, toy: Document) -> Result<Bson, ToyStoreError>;
    async fn insert_many(&self, toys: Vec<Document>) -> Result<Vec<Bson>, ToyStoreError>;
    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, ToyStoreError>;
    async fn find_one(&self, filter: Document) -> Result<Option<Document>, ToyStoreError>;
    async fn count(&self, filter: Document) -> Result<u64, ToyStoreError>;
    async fn update(
        &self,
        filter: Document,
        update: Document,
        many: bool,
    ) -> Result<UpdateOutcome, ToyStoreError>;
    async fn delete(&self, filter: Document, many: bool) -> Result<u64, ToyStoreError>;
    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, ToyStoreError>;
    async fn ping(&self) -> Result<(), ToyStoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryToyRepository {
    toys: Arc<Mutex<Vec<Document>>>,
}

impl InMemoryToyRepository {
    pub fn new() -> Self {
        InMemoryToyRepository {
            toys: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_id(toy: Document) -> (Bson, Document) {
        if let Some(id) = toy.get(domain::ID) {
            return (id.clone(), toy);
        }

        let id = Bson::ObjectId(ObjectId::new());
        let mut stored = Document::new();
        stored.insert(domain::ID, id.clone());
        stored.extend(toy);
        (id, stored)
    }
}

#[async_trait]
impl ToyRepository for InMemoryToyRepository {
    async fn insert_one(&self, toy: Document) -> Result<Bson, ToyStoreError> {
        let (id, toy) = InMemoryToyRepository::with_id(toy);
        let mut lock = self.toys.lock().await;
        if lock.iter().any(|existing| existing.get(domain::ID) == Some(&id)) {
            return Err(ToyStoreError::Database(format!("duplicate key {}", id)));
        }
        lock.push(toy);
        Ok(id)
    }

    async fn insert_many(&self, toys: Vec<Document>) -> Result<Vec<Bson>, ToyStoreError> {
        let mut ids = Vec::with_capacity(toys.len());
        for toy in toys {
            ids.push(self.insert_one(toy).await?);
        }
        Ok(ids)
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, ToyStoreError> {
        let lock = self.toys.lock().await;
        engine::find(&lock, &filter, &spec)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>, ToyStoreError> {
        let lock = self.toys.lock().await;
        for toy in lock.iter() {
            if engine::matches(toy, &filter)? {
                return Ok(Some(toy.clone()));
            }
        }
        Ok(None)
    }

    async fn count(&self, filter: Document) -> Result<u64, ToyStoreError> {
        let lock = self.toys.lock().await;
        let mut count = 0;
        for toy in lock.iter() {
            if engine::matches(toy, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        many: bool,
    ) -> Result<UpdateOutcome, ToyStoreError> {
        let mut lock = self.toys.lock().await;
        let mut outcome = UpdateOutcome::default();

        for toy in lock.iter_mut() {
            if !engine::matches(toy, &filter)? {
                continue;
            }

            // work on a copy so a failing operator leaves the stored toy untouched
            let mut updated = toy.clone();
            let modified = engine::apply_update(&mut updated, &update)?;
            if updated.get(domain::ID) != toy.get(domain::ID) {
                return Err(ToyStoreError::Query(String::from("the _id field is immutable")));
            }

            outcome.matched += 1;
            if modified {
                outcome.modified += 1;
                *toy = updated;
            }

            if !many {
                break;
            }
        }

        Ok(outcome)
    }

    async fn delete(&self, filter: Document, many: bool) -> Result<u64, ToyStoreError> {
        let mut lock = self.toys.lock().await;
        let mut deleted = 0;
        let mut index = 0;

        while index < lock.len() {
            if (many || deleted == 0) && engine::matches(&lock[index], &filter)? {
                lock.remove(index);
                deleted += 1;
            } else {
                index += 1;
            }
        }

        Ok(deleted)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, ToyStoreError> {
        let snapshot = self.toys.lock().await.clone();
        engine::run_pipeline(snapshot, &pipeline)
    }

    async fn ping(&self) -> Result<(), ToyStoreError> {
        event!(Level::DEBUG, "InMemoryToyRepository is always reachable");
        Ok(())
    }
}

#[derive(Clone)]
pub struct MongoDbToyRepository {
    client: Client,
    toy_collection: Collection<Document>,
}

impl MongoDbToyRepository {
    pub async fn new(info: &MongoDbInitializationInfo) -> Result<Self, ToyStoreError> {
        let mut options = ClientOptions::parse(&info.uri).await?;
        options.server_api = Some(
            ServerApi::builder()
                .version(ServerApiVersion::V1)
                .strict(true)
                .deprecation_errors(true)
                .build(),
        );
        options.app_name = Some(String::from(env!("CARGO_PKG_NAME")));

        let client = Client::with_options(options)?;
        let database = client.database(&info.database);

        Ok(MongoDbToyRepository {
            client,
            toy_collection: database.collection(&info.collection),
        })
    }
}

#[async_trait]
impl ToyRepository for MongoDbToyRepository {
    async fn insert_one(&self, toy: Document) -> Result<Bson, ToyStoreError> {
        let result = self.toy_collection.insert_one(toy).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, toys: Vec<Document>) -> Result<Vec<Bson>, ToyStoreError> {
        let count = toys.len();
        let result = self.toy_collection.insert_many(toys).await?;

        let mut ids = Vec::with_capacity(count);
        for index in 0..count {
            if let Some(id) = result.inserted_ids.get(&index) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>, ToyStoreError> {
        let options = FindOptions::builder()
            .sort(spec.sort)
            .projection(spec.projection)
            .skip(spec.skip)
            .limit(spec.limit)
            .build();

        let cursor = self.toy_collection.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>, ToyStoreError> {
        Ok(self.toy_collection.find_one(filter).await?)
    }

    async fn count(&self, filter: Document) -> Result<u64, ToyStoreError> {
        Ok(self.toy_collection.count_documents(filter).await?)
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        many: bool,
    ) -> Result<UpdateOutcome, ToyStoreError> {
        let result = if many {
            self.toy_collection.update_many(filter, update).await?
        } else {
            self.toy_collection.update_one(filter, update).await?
        };

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete(&self, filter: Document, many: bool) -> Result<u64, ToyStoreError> {
        let result = if many {
            self.toy_collection.delete_many(filter).await?
        } else {
            self.toy_collection.delete_one(filter).await?
        };
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, ToyStoreError> {
        let cursor = self.toy_collection.aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn ping(&self) -> Result<(), ToyStoreError> {
        self.client.database("admin").run_command(doc! { "ping": 1 }).await?;
        event!(Level::INFO, "Pinged your deployment. You successfully connected to MongoDB!");
        Ok(())
    }
}
