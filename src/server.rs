//! REST API for cavdb.
//!
//! Provides JSON endpoints over one shared store instance. The store is
//! loaded from (or created at) a file path when the server starts; mutating
//! requests save the store back to that path after the batch, so each
//! request either fully applies or reports its failure.
//!
//! ## Endpoints
//!
//! - `POST /insert` - Insert vectors (ids are derived from content)
//! - `POST /query` - K-nearest-neighbor queries by exact Euclidean distance
//! - `POST /get` - Retrieve records by id
//! - `GET /count` - Number of distinct records
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use cavdb::server::AppState;
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let state = web::Data::new(AppState::load_or_create("vectors.db", 128).unwrap());
//!     HttpServer::new(move || {
//!         App::new()
//!             .app_data(state.clone())
//!             .configure(cavdb::server::config)
//!     })
//!     .bind("0.0.0.0:7878")?
//!     .run()
//!     .await
//! }
//! ```

use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StoreError;
use crate::VecStore;

/// Shared server state: the store and the path it persists to.
pub struct AppState {
    pub store: VecStore,
    pub path: String,
}

impl AppState {
    /// Loads the store from `path` if the file exists, otherwise creates an
    /// empty store of the given dimension.
    pub fn load_or_create(path: &str, dimension: usize) -> Result<AppState, StoreError> {
        let store = if Path::new(path).exists() {
            VecStore::load(path)?
        } else {
            VecStore::new(dimension)
        };

        Ok(AppState { store, path: path.to_string() })
    }
}

// --- Request structs ---

#[derive(Deserialize)]
struct InsertRequest {
    vectors: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct Query {
    value: Vec<f64>,
    k: i64,
}

#[derive(Deserialize)]
struct QueryRequest {
    queries: Vec<Query>,
}

#[derive(Deserialize)]
struct GetRequest {
    ids: Vec<String>,
}

// --- Response structs ---

#[derive(Serialize)]
struct InsertResponse {
    inserted: usize,
    results: Vec<InsertResult>,
}

#[derive(Serialize)]
struct InsertResult {
    id: Option<String>,
    inserted: bool,
    status: String,
    message: String,
}

#[derive(Serialize)]
struct QueryResponse {
    results: Vec<QueryResultGroup>,
}

#[derive(Serialize)]
struct QueryResultGroup {
    matches: Vec<MatchResult>,
    message: String,
}

#[derive(Serialize)]
struct MatchResult {
    id: String,
    distance: f64,
    values: Vec<f64>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct GetResponse {
    results: Vec<GetResult>,
}

#[derive(Serialize)]
struct GetResult {
    id: String,
    found: bool,
    values: Option<Vec<f64>>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

// --- Handlers ---

async fn insert_handler(
    state: web::Data<AppState>,
    body: web::Json<InsertRequest>,
) -> impl Responder {
    let mut results = Vec::new();
    let mut inserted = 0;

    for vector in &body.vectors {
        match state.store.insert(vector.clone()) {
            Ok((id, created)) => {
                if created {
                    inserted += 1;
                }
                results.push(InsertResult {
                    id: Some(id),
                    inserted: created,
                    status: "ok".to_string(),
                    message: if created { "created" } else { "duplicate content" }.to_string(),
                });
            }
            Err(e) => {
                results.push(InsertResult {
                    id: None,
                    inserted: false,
                    status: "error".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    if let Err(e) = state.store.save(&state.path) {
        log::error!("failed to save store to '{}': {}", state.path, e);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({"error": e.to_string()}));
    }

    HttpResponse::Ok().json(InsertResponse { inserted, results })
}

async fn query_handler(
    state: web::Data<AppState>,
    body: web::Json<QueryRequest>,
) -> impl Responder {
    let mut results = Vec::new();

    for query in &body.queries {
        if query.k < 0 {
            results.push(QueryResultGroup {
                matches: Vec::new(),
                message: StoreError::InvalidArgument(format!(
                    "k must be non-negative, got {}",
                    query.k
                ))
                .to_string(),
            });
            continue;
        }

        match state.store.knn(&query.value, query.k as usize) {
            Ok(ranked) => {
                results.push(QueryResultGroup {
                    matches: ranked
                        .into_iter()
                        .map(|(record, distance)| MatchResult {
                            id: record.id,
                            distance,
                            values: record.vector,
                            created_at: record.created_at,
                        })
                        .collect(),
                    message: "query success".to_string(),
                });
            }
            Err(e) => {
                results.push(QueryResultGroup {
                    matches: Vec::new(),
                    message: e.to_string(),
                });
            }
        }
    }

    HttpResponse::Ok().json(QueryResponse { results })
}

async fn get_handler(state: web::Data<AppState>, body: web::Json<GetRequest>) -> impl Responder {
    let mut results = Vec::new();

    for id in &body.ids {
        match state.store.get(id) {
            Ok(record) => results.push(GetResult {
                id: id.clone(),
                found: true,
                values: Some(record.vector),
                created_at: Some(record.created_at),
            }),
            Err(_) => results.push(GetResult {
                id: id.clone(),
                found: false,
                values: None,
                created_at: None,
            }),
        }
    }

    HttpResponse::Ok().json(GetResponse { results })
}

async fn count_handler(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(CountResponse { count: state.store.count() })
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/insert").route(web::post().to(insert_handler)))
        .service(web::resource("/query").route(web::post().to(query_handler)))
        .service(web::resource("/get").route(web::post().to(get_handler)))
        .service(web::resource("/count").route(web::get().to(count_handler)));
}
