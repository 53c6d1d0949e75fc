use mongodb::bson::{oid::ObjectId, Bson, Document};
use serde_json::{Map, Value};

use crate::errors::ToyStoreError;

// toy document fields
pub const ID: &str = "_id";
pub const NAME: &str = "name";
pub const CATEGORY: &str = "category";
pub const SELLER_NAME: &str = "sellerName";
pub const SELLER_EMAIL: &str = "sellerEmail";
pub const PRICE: &str = "price";
pub const RATING: &str = "rating";
pub const QUANTITY: &str = "quantity";
pub const IMAGE: &str = "image";
pub const DESCRIPTION: &str = "description";
pub const TAGS: &str = "tags";

pub fn parse_toy_id(id: &str) -> Result<ObjectId, ToyStoreError> {
    ObjectId::parse_str(id).map_err(|_| ToyStoreError::InvalidId(String::from(id)))
}

/// Converts a client supplied JSON object into a toy document. Any `_id` is
/// dropped so the database assigns its own.
pub fn toy_from_json(value: Value) -> Result<Document, ToyStoreError> {
    match value {
        Value::Object(_) => match Bson::try_from(value)? {
            Bson::Document(mut doc) => {
                doc.remove(ID);
                Ok(doc)
            }
            other => Err(ToyStoreError::InvalidBody(format!(
                "expected a JSON object, got {}",
                other
            ))),
        },
        other => Err(ToyStoreError::InvalidBody(format!("expected a JSON object, got {}", other))),
    }
}

pub fn toy_to_json(doc: &Document) -> Value {
    let mut out = Map::new();
    for (key, value) in doc {
        out.insert(key.clone(), bson_to_json(value));
    }
    Value::Object(out)
}

pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Document(doc) => toy_to_json(doc),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        other => other.clone().into_relaxed_extjson(),
    }
}
