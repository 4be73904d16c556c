// BSON query builder — converts core adapter types into MongoDB documents.

use devrelay_core::db::adapter::{FindManyQuery, Operator, SortDirection, WhereClause};
use mongodb::bson::{doc, Bson, Document};

/// Convert WHERE clauses (ANDed) to a MongoDB filter document.
pub fn build_filter(clauses: &[WhereClause]) -> Document {
    let mut filter = Document::new();
    for clause in clauses {
        let field = map_field(&clause.field);
        let value = json_to_bson(&clause.value);
        let condition = match clause.operator {
            Operator::Eq => value,
            Operator::Ne => Bson::Document(doc! { "$ne": value }),
            Operator::In => {
                let arr = match value {
                    Bson::Array(arr) => arr,
                    other => vec![other],
                };
                Bson::Document(doc! { "$in": arr })
            }
        };
        filter.insert(field, condition);
    }
    filter
}

fn map_field(field: &str) -> String {
    if field == "id" {
        "_id".to_string()
    } else {
        field.to_string()
    }
}

/// Convert serde_json::Value to BSON.
pub fn json_to_bson(v: &serde_json::Value) -> Bson {
    match v {
        serde_json::Value::Null => Bson::Null,
        serde_json::Value::Bool(b) => Bson::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else if let Some(f) = n.as_f64() {
                Bson::Double(f)
            } else {
                Bson::String(n.to_string())
            }
        }
        serde_json::Value::String(s) => Bson::String(s.clone()),
        serde_json::Value::Array(arr) => Bson::Array(arr.iter().map(json_to_bson).collect()),
        serde_json::Value::Object(map) => {
            let mut document = Document::new();
            for (k, v) in map {
                document.insert(k.clone(), json_to_bson(v));
            }
            Bson::Document(document)
        }
    }
}

/// Convert BSON to serde_json::Value.
pub fn bson_to_json(b: &Bson) -> serde_json::Value {
    match b {
        Bson::Null => serde_json::Value::Null,
        Bson::Boolean(b) => serde_json::json!(*b),
        Bson::Int32(i) => serde_json::json!(*i),
        Bson::Int64(i) => serde_json::json!(*i),
        Bson::Double(f) => serde_json::json!(*f),
        Bson::String(s) => serde_json::json!(s),
        Bson::ObjectId(oid) => serde_json::json!(oid.to_hex()),
        Bson::Array(arr) => serde_json::Value::Array(arr.iter().map(bson_to_json).collect()),
        Bson::Document(document) => doc_to_json(document),
        Bson::DateTime(dt) => serde_json::json!(dt.try_to_rfc3339_string().unwrap_or_default()),
        _ => serde_json::Value::Null,
    }
}

/// Convert a MongoDB document to JSON, mapping `_id` back to `id`.
pub fn doc_to_json(document: &Document) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (k, v) in document {
        let key = if k == "_id" { "id".to_string() } else { k.clone() };
        map.insert(key, bson_to_json(v));
    }
    serde_json::Value::Object(map)
}

/// Convert a JSON object to an insert document, mapping `id` to `_id`.
pub fn build_insert_doc(data: &serde_json::Value) -> Document {
    let mut document = Document::new();
    if let Some(obj) = data.as_object() {
        for (k, v) in obj {
            let key = if k == "id" { "_id".to_string() } else { k.clone() };
            document.insert(key, json_to_bson(v));
        }
    }
    document
}

/// Convert a JSON object to a `$set` update document.
pub fn build_update_doc(data: &serde_json::Value) -> Document {
    doc! { "$set": build_insert_doc(data) }
}

/// Build an upsert document: `$set` for the patch, `$setOnInsert` for the
/// creation-only defaults. The two field sets must be disjoint.
pub fn build_upsert_doc(data: &serde_json::Value, on_insert: &serde_json::Value) -> Document {
    let mut document = doc! { "$set": build_insert_doc(data) };
    let insert_doc = build_insert_doc(on_insert);
    if !insert_doc.is_empty() {
        document.insert("$setOnInsert", insert_doc);
    }
    document
}

/// Build a sort document from a query.
pub fn build_sort(query: &FindManyQuery) -> Option<Document> {
    query.sort_by.as_ref().map(|sort| {
        let direction = match sort.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        doc! { map_field(&sort.field): direction }
    })
}
