use crate::db::Database;
use crate::error::StoreError;
use crate::models::{NewCustomer, NewItem, NewReview};
use crate::serializer::{EntityRef, Rules, Serializer};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub max_depth: usize,
}

// Optional `?rules=-reviews.item,items` on single-entity GETs
#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    pub rules: Option<String>,
}

impl GraphQuery {
    fn rules(&self) -> Vec<&str> {
        self.rules
            .as_deref()
            .map(|raw| raw.split(',').map(str::trim).collect())
            .unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize)]
pub struct CustomerItemRequest {
    pub item_id: i64,
    pub comment: String,
}

#[derive(Serialize, Deserialize)]
pub struct ReviewUpdate {
    pub comment: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/customers", web::get().to(list_customers))
            .route("/customers", web::post().to(create_customer))
            .route("/customers/{id}", web::get().to(get_customer))
            .route("/customers/{id}", web::put().to(update_customer))
            .route("/customers/{id}", web::delete().to(delete_customer))
            .route("/customers/{id}/items", web::get().to(get_customer_items))
            .route("/customers/{id}/items", web::post().to(add_customer_item))
            .route("/items", web::get().to(list_items))
            .route("/items", web::post().to(create_item))
            .route("/items/{id}", web::get().to(get_item))
            .route("/items/{id}", web::put().to(update_item))
            .route("/items/{id}", web::delete().to(delete_item))
            .route("/reviews", web::get().to(list_reviews))
            .route("/reviews", web::post().to(create_review))
            .route("/reviews/{id}", web::get().to(get_review))
            .route("/reviews/{id}", web::put().to(update_review))
            .route("/reviews/{id}", web::delete().to(delete_review)),
    );
}

fn failure(context: &str, err: StoreError) -> HttpResponse {
    let body = json!({ "error": err.to_string() });
    match err {
        StoreError::NotFound { .. } => {
            debug!("[API] {}: {}", context, err);
            HttpResponse::NotFound().json(body)
        }
        // Rules asked for a deeper tree than the configured limit allows
        StoreError::DepthExceeded { .. } => {
            debug!("[API] {}: {}", context, err);
            HttpResponse::BadRequest().json(body)
        }
        _ if err.is_constraint_violation() => {
            debug!("[API] {}: {}", context, err);
            HttpResponse::BadRequest().json(body)
        }
        _ => {
            error!("[API] {}: {:?}", context, err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

async fn render_graph(state: &AppState, root: EntityRef, query: &GraphQuery) -> HttpResponse {
    let rules = Rules::parse(query.rules());
    // Derived fields can reach past the root's neighbourhood
    let loaded = if rules.opts_in() {
        state.db.snapshot().await
    } else {
        state.db.snapshot_around(root).await
    };
    let snapshot = match loaded {
        Ok(snapshot) => snapshot,
        Err(err) => return failure("Failed to load snapshot", err),
    };
    match Serializer::new(&snapshot, state.max_depth).to_value(root, &rules) {
        Ok(value) => HttpResponse::Ok().json(value),
        Err(err) => failure("Failed to serialize graph", err),
    }
}

pub async fn list_customers(state: web::Data<AppState>) -> HttpResponse {
    match state.db.list_customers().await {
        Ok(customers) => HttpResponse::Ok().json(customers),
        Err(err) => failure("Failed to fetch customers", err),
    }
}

pub async fn create_customer(
    state: web::Data<AppState>,
    payload: web::Json<NewCustomer>,
) -> HttpResponse {
    match state.db.insert_customer(&payload).await {
        Ok(customer) => HttpResponse::Created().json(customer),
        Err(err) => failure("Failed to create customer", err),
    }
}

pub async fn get_customer(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    query: web::Query<GraphQuery>,
) -> HttpResponse {
    render_graph(&state, EntityRef::Customer(id.into_inner()), &query).await
}

pub async fn update_customer(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    payload: web::Json<NewCustomer>,
) -> HttpResponse {
    match state.db.update_customer(id.into_inner(), &payload).await {
        Ok(customer) => HttpResponse::Ok().json(customer),
        Err(err) => failure("Failed to update customer", err),
    }
}

pub async fn delete_customer(state: web::Data<AppState>, id: web::Path<i64>) -> HttpResponse {
    match state.db.delete_customer(id.into_inner()).await {
        Ok(_) => HttpResponse::Ok().body("Customer deleted"),
        Err(err) => failure("Failed to delete customer", err),
    }
}

pub async fn get_customer_items(state: web::Data<AppState>, id: web::Path<i64>) -> HttpResponse {
    match state.db.customer_items(id.into_inner()).await {
        Ok(items) => HttpResponse::Ok().json(items),
        Err(err) => failure("Failed to fetch customer items", err),
    }
}

pub async fn add_customer_item(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    payload: web::Json<CustomerItemRequest>,
) -> HttpResponse {
    match state
        .db
        .add_customer_item(id.into_inner(), payload.item_id, &payload.comment)
        .await
    {
        Ok(review) => HttpResponse::Created().json(review),
        Err(err) => failure("Failed to add item to customer", err),
    }
}

pub async fn list_items(state: web::Data<AppState>) -> HttpResponse {
    match state.db.list_items().await {
        Ok(items) => HttpResponse::Ok().json(items),
        Err(err) => failure("Failed to fetch items", err),
    }
}

pub async fn create_item(state: web::Data<AppState>, payload: web::Json<NewItem>) -> HttpResponse {
    match state.db.insert_item(&payload).await {
        Ok(item) => HttpResponse::Created().json(item),
        Err(err) => failure("Failed to create item", err),
    }
}

pub async fn get_item(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    query: web::Query<GraphQuery>,
) -> HttpResponse {
    render_graph(&state, EntityRef::Item(id.into_inner()), &query).await
}

pub async fn update_item(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    payload: web::Json<NewItem>,
) -> HttpResponse {
    match state.db.update_item(id.into_inner(), &payload).await {
        Ok(item) => HttpResponse::Ok().json(item),
        Err(err) => failure("Failed to update item", err),
    }
}

pub async fn delete_item(state: web::Data<AppState>, id: web::Path<i64>) -> HttpResponse {
    match state.db.delete_item(id.into_inner()).await {
        Ok(_) => HttpResponse::Ok().body("Item deleted"),
        Err(err) => failure("Failed to delete item", err),
    }
}

pub async fn list_reviews(state: web::Data<AppState>) -> HttpResponse {
    match state.db.list_reviews().await {
        Ok(reviews) => HttpResponse::Ok().json(reviews),
        Err(err) => failure("Failed to fetch reviews", err),
    }
}

pub async fn create_review(
    state: web::Data<AppState>,
    payload: web::Json<NewReview>,
) -> HttpResponse {
    match state.db.insert_review(&payload).await {
        Ok(review) => HttpResponse::Created().json(review),
        Err(err) => failure("Failed to create review", err),
    }
}

pub async fn get_review(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    query: web::Query<GraphQuery>,
) -> HttpResponse {
    render_graph(&state, EntityRef::Review(id.into_inner()), &query).await
}

pub async fn update_review(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    payload: web::Json<ReviewUpdate>,
) -> HttpResponse {
    match state.db.update_review(id.into_inner(), &payload.comment).await {
        Ok(review) => HttpResponse::Ok().json(review),
        Err(err) => failure("Failed to update review", err),
    }
}

pub async fn delete_review(state: web::Data<AppState>, id: web::Path<i64>) -> HttpResponse {
    match state.db.delete_review(id.into_inner()).await {
        Ok(_) => HttpResponse::Ok().body("Review deleted"),
        Err(err) => failure("Failed to delete review", err),
    }
}
