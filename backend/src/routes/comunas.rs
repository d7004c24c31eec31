use axum::Json;
use serde_json::{json, Value};

use crate::models::comuna::COMUNAS;

pub async fn list_comunas() -> Json<Value> {
    Json(json!({ "comunas": COMUNAS }))
}
