//! The literal filter, sort, projection, update and pipeline documents behind
//! each toy route.

use mongodb::bson::{doc, oid::ObjectId, Bson, Document};

use crate::{
    domain::{
        CATEGORY, DESCRIPTION, ID, IMAGE, NAME, PRICE, QUANTITY, RATING, SELLER_EMAIL, SELLER_NAME,
        TAGS,
    },
    repositories::FindSpec,
};

pub const CHEAP_PRICE_CEILING: f64 = 20.0;
pub const PREMIUM_PRICE_FLOOR: f64 = 100.0;
pub const BARGAIN_PRICE_CEILING: f64 = 10.0;
pub const POPULAR_RATING: f64 = 4.0;
pub const STANDOUT_RATING: f64 = 4.5;
pub const DEFAULT_TOP_RATED: i64 = 5;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_CATEGORIES: [&str; 3] = ["Sports Car", "Truck", "Police Car"];

// filters

pub fn all_toys() -> Document {
    doc! {}
}

pub fn by_id(id: ObjectId) -> Document {
    doc! { ID: id }
}

pub fn by_category(category: &str) -> Document {
    doc! { CATEGORY: category }
}

pub fn not_category(category: &str) -> Document {
    doc! { CATEGORY: { "$ne": category } }
}

pub fn by_seller(email: &str) -> Document {
    doc! { SELLER_EMAIL: email }
}

/// A missing bound is left out; with neither bound every toy matches.
pub fn price_range(min: Option<f64>, max: Option<f64>) -> Document {
    let mut range = Document::new();
    if let Some(min) = min {
        range.insert("$gte", min);
    }
    if let Some(max) = max {
        range.insert("$lte", max);
    }

    if range.is_empty() {
        all_toys()
    } else {
        doc! { PRICE: range }
    }
}

pub fn cheap() -> Document {
    doc! { PRICE: { "$lt": CHEAP_PRICE_CEILING } }
}

pub fn premium() -> Document {
    doc! { PRICE: { "$gt": PREMIUM_PRICE_FLOOR } }
}

pub fn not_cheap() -> Document {
    doc! { PRICE: { "$not": { "$lt": CHEAP_PRICE_CEILING } } }
}

pub fn in_categories(categories: &[String]) -> Document {
    doc! { CATEGORY: { "$in": categories_or_default(categories) } }
}

pub fn not_in_categories(categories: &[String]) -> Document {
    doc! { CATEGORY: { "$nin": categories_or_default(categories) } }
}

fn categories_or_default(categories: &[String]) -> Vec<String> {
    if categories.is_empty() {
        DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    } else {
        categories.to_vec()
    }
}

/// Splits a comma separated query value, dropping blanks.
pub fn parse_categories(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| {
        r.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

pub fn with_image() -> Document {
    doc! { IMAGE: { "$exists": true } }
}

pub fn without_description() -> Document {
    doc! { DESCRIPTION: { "$exists": false } }
}

pub fn string_priced() -> Document {
    doc! { PRICE: { "$type": "string" } }
}

/// Case-insensitive substring match on the toy name. The term is matched
/// literally.
pub fn name_search(term: &str) -> Document {
    doc! { NAME: { "$regex": regex::escape(term), "$options": "i" } }
}

pub fn popular_in_stock() -> Document {
    doc! {
        "$and": [
            { RATING: { "$gte": POPULAR_RATING } },
            { QUANTITY: { "$gt": 0 } }
        ]
    }
}

pub fn deals() -> Document {
    doc! {
        "$or": [
            { PRICE: { "$lt": BARGAIN_PRICE_CEILING } },
            { RATING: { "$gte": STANDOUT_RATING } }
        ]
    }
}

pub fn out_of_stock() -> Document {
    doc! {
        "$or": [
            { QUANTITY: { "$lte": 0 } },
            { QUANTITY: { "$exists": false } }
        ]
    }
}

// cursor modifiers

pub fn sorted_by_price(ascending: bool) -> FindSpec {
    let direction = if ascending { 1 } else { -1 };
    FindSpec {
        sort: Some(doc! { PRICE: direction }),
        ..FindSpec::default()
    }
}

pub fn sorted_by_rating() -> FindSpec {
    FindSpec {
        sort: Some(doc! { RATING: -1, NAME: 1 }),
        ..FindSpec::default()
    }
}

pub fn top_rated(limit: Option<i64>) -> FindSpec {
    FindSpec {
        sort: Some(doc! { RATING: -1 }),
        limit: Some(limit.filter(|l| *l > 0).unwrap_or(DEFAULT_TOP_RATED).min(MAX_PAGE_SIZE)),
        ..FindSpec::default()
    }
}

pub fn names_only() -> FindSpec {
    FindSpec {
        projection: Some(doc! { NAME: 1, PRICE: 1, ID: 0 }),
        ..FindSpec::default()
    }
}

pub fn summary() -> FindSpec {
    FindSpec {
        projection: Some(doc! { DESCRIPTION: 0, SELLER_EMAIL: 0 }),
        ..FindSpec::default()
    }
}

/// Pages are 1-based; page 0 is treated as the first page and the page size
/// is capped.
pub fn page(page: Option<u64>, limit: Option<i64>) -> FindSpec {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    FindSpec {
        sort: Some(doc! { ID: 1 }),
        skip: Some((page - 1).saturating_mul(limit as u64)),
        limit: Some(limit),
        ..FindSpec::default()
    }
}

// updates

pub fn set_fields(fields: Document) -> Document {
    doc! { "$set": fields }
}

pub fn set_price(price: Bson) -> Document {
    doc! { "$set": { PRICE: price } }
}

pub fn set_rating(rating: f64) -> Document {
    doc! { "$set": { RATING: rating } }
}

pub fn restock(amount: i32) -> Document {
    doc! { "$inc": { QUANTITY: amount } }
}

pub fn adjust_price(amount: f64) -> Document {
    doc! { "$inc": { PRICE: amount } }
}

pub fn rename_field(from: &str, to: &str) -> Document {
    doc! { "$rename": { from: to } }
}

pub fn unset_description() -> Document {
    doc! { "$unset": { DESCRIPTION: "" } }
}

pub fn push_tag(tag: &str) -> Document {
    doc! { "$push": { TAGS: tag } }
}

pub fn pull_tag(tag: &str) -> Document {
    doc! { "$pull": { TAGS: tag } }
}

// aggregation pipelines

pub fn category_stats() -> Vec<Document> {
    vec![
        doc! { "$group": {
            ID: format!("${}", CATEGORY),
            "count": { "$sum": 1 },
            "avgPrice": { "$avg": format!("${}", PRICE) }
        } },
        doc! { "$sort": { "count": -1, ID: 1 } },
    ]
}

pub fn seller_stats() -> Vec<Document> {
    vec![
        doc! { "$group": {
            ID: format!("${}", SELLER_EMAIL),
            "sellerName": { "$first": format!("${}", SELLER_NAME) },
            "toys": { "$sum": 1 },
            "totalQuantity": { "$sum": format!("${}", QUANTITY) }
        } },
        doc! { "$sort": { "totalQuantity": -1, ID: 1 } },
    ]
}

pub fn price_stats() -> Vec<Document> {
    vec![
        doc! { "$match": { PRICE: { "$type": "number" } } },
        doc! { "$group": {
            ID: Bson::Null,
            "toys": { "$sum": 1 },
            "minPrice": { "$min": format!("${}", PRICE) },
            "maxPrice": { "$max": format!("${}", PRICE) },
            "avgPrice": { "$avg": format!("${}", PRICE) }
        } },
        doc! { "$project": { ID: 0 } },
    ]
}
