#![cfg(feature = "server")]

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use storereviews::api::{self, AppState};
use storereviews::config::DEFAULT_MAX_DEPTH;
use storereviews::db::Database;

async fn test_state() -> AppState {
    let db = Database::open_in_memory().unwrap();
    db.create_schema().await.unwrap();
    AppState {
        db,
        max_depth: DEFAULT_MAX_DEPTH,
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(api::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_customer_graph_round_trip() {
    let state = test_state().await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/customers")
        .set_json(json!({"name": "Ada"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let customer: Value = test::read_body_json(resp).await;
    let customer_id = customer["id"].as_i64().unwrap();

    let mut item_ids = Vec::new();
    for (name, price) in [("Lamp", 12.5), ("Desk", 120.0)] {
        let req = test::TestRequest::post()
            .uri("/api/items")
            .set_json(json!({"name": name, "price": price}))
            .to_request();
        let item: Value = test::call_and_read_body_json(&app, req).await;
        item_ids.push(item["id"].as_i64().unwrap());
    }

    for (item_id, comment) in item_ids.iter().zip(["Bright", "Sturdy"]) {
        let req = test::TestRequest::post()
            .uri("/api/reviews")
            .set_json(json!({
                "comment": comment,
                "customer_id": customer_id,
                "item_id": item_id
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri(&format!("/api/customers/{}", customer_id))
        .to_request();
    let graph: Value = test::call_and_read_body_json(&app, req).await;
    let reviews = graph["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 2);
    for review in reviews {
        assert!(review.get("customer").is_none());
        assert!(review["item"].get("reviews").is_none());
    }

    let req = test::TestRequest::get()
        .uri(&format!("/api/customers/{}/items", customer_id))
        .to_request();
    let items: Value = test::call_and_read_body_json(&app, req).await;
    let names: Vec<&str> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Lamp", "Desk"]);
}

#[actix_web::test]
async fn test_graph_rules_from_query() {
    let state = test_state().await;
    let customer = state
        .db
        .insert_customer(&storereviews::models::NewCustomer { name: "Ada".into() })
        .await
        .unwrap();
    let item = state
        .db
        .insert_item(&storereviews::models::NewItem {
            name: "Lamp".into(),
            price: 12.5,
        })
        .await
        .unwrap();
    state
        .db
        .add_customer_item(customer.id, item.id, "Bright")
        .await
        .unwrap();
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/customers/{}?rules=-reviews.item,items,-items.reviews",
            customer.id
        ))
        .to_request();
    let graph: Value = test::call_and_read_body_json(&app, req).await;
    assert!(graph["reviews"][0].get("item").is_none());
    assert_eq!(graph["items"], json!([{"id": item.id, "name": "Lamp", "price": 12.5}]));
}

#[actix_web::test]
async fn test_review_with_missing_customer_is_rejected() {
    let state = test_state().await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .set_json(json!({"comment": "Orphan", "customer_id": 1, "item_id": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("FOREIGN KEY"));

    // A null comment never reaches the database
    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .set_json(json!({"comment": null, "customer_id": 1, "item_id": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_client_error());
}

#[actix_web::test]
async fn test_missing_rows_are_not_found() {
    let state = test_state().await;
    let app = app!(state);

    for uri in ["/api/customers/9", "/api/items/9", "/api/reviews/9"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
    }

    let req = test::TestRequest::delete().uri("/api/items/9").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_update_and_delete_review() {
    let state = test_state().await;
    let customer = state
        .db
        .insert_customer(&storereviews::models::NewCustomer { name: "Ada".into() })
        .await
        .unwrap();
    let item = state
        .db
        .insert_item(&storereviews::models::NewItem {
            name: "Lamp".into(),
            price: 12.5,
        })
        .await
        .unwrap();
    let review = state
        .db
        .add_customer_item(customer.id, item.id, "Bright")
        .await
        .unwrap();
    let app = app!(state);

    let req = test::TestRequest::put()
        .uri(&format!("/api/reviews/{}", review.id))
        .set_json(json!({"comment": "Very bright"}))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["comment"], "Very bright");

    let req = test::TestRequest::get()
        .uri(&format!("/api/reviews/{}", review.id))
        .to_request();
    let graph: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(graph["customer"], json!({"id": customer.id, "name": "Ada"}));
    assert!(graph["item"].get("reviews").is_none());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/reviews/{}", review.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/api/reviews").to_request();
    let reviews: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reviews, json!([]));
}

#[actix_web::test]
async fn test_add_item_through_customer() {
    let state = test_state().await;
    let customer = state
        .db
        .insert_customer(&storereviews::models::NewCustomer { name: "Ada".into() })
        .await
        .unwrap();
    let item = state
        .db
        .insert_item(&storereviews::models::NewItem {
            name: "Lamp".into(),
            price: 12.5,
        })
        .await
        .unwrap();
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri(&format!("/api/customers/{}/items", customer.id))
        .set_json(json!({"item_id": item.id, "comment": "Bright"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let review: Value = test::read_body_json(resp).await;
    assert_eq!(review["customer_id"], json!(customer.id));
    assert_eq!(review["item_id"], json!(item.id));

    let req = test::TestRequest::get()
        .uri(&format!("/api/customers/{}/items", customer.id))
        .to_request();
    let items: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(items, json!([{"id": item.id, "name": "Lamp", "price": 12.5}]));

    // Unknown item trips the foreign key
    let req = test::TestRequest::post()
        .uri(&format!("/api/customers/{}/items", customer.id))
        .set_json(json!({"item_id": item.id + 50, "comment": "Ghost"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_update_customer_and_item() {
    let state = test_state().await;
    let customer = state
        .db
        .insert_customer(&storereviews::models::NewCustomer { name: "Ada".into() })
        .await
        .unwrap();
    let item = state
        .db
        .insert_item(&storereviews::models::NewItem {
            name: "Lamp".into(),
            price: 12.5,
        })
        .await
        .unwrap();
    let app = app!(state);

    let req = test::TestRequest::put()
        .uri(&format!("/api/customers/{}", customer.id))
        .set_json(json!({"name": "Ada L."}))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated, json!({"id": customer.id, "name": "Ada L."}));

    let req = test::TestRequest::put()
        .uri(&format!("/api/items/{}", item.id))
        .set_json(json!({"name": "Desk Lamp", "price": 20.0}))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated, json!({"id": item.id, "name": "Desk Lamp", "price": 20.0}));

    let req = test::TestRequest::put()
        .uri("/api/items/999")
        .set_json(json!({"name": "Ghost", "price": 1.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_delete_customer_removes_reviews() {
    let state = test_state().await;
    let customer = state
        .db
        .insert_customer(&storereviews::models::NewCustomer { name: "Ada".into() })
        .await
        .unwrap();
    let item = state
        .db
        .insert_item(&storereviews::models::NewItem {
            name: "Lamp".into(),
            price: 12.5,
        })
        .await
        .unwrap();
    let review = state
        .db
        .add_customer_item(customer.id, item.id, "Bright")
        .await
        .unwrap();
    let app = app!(state);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/customers/{}", customer.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/reviews/{}", review.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/api/reviews").to_request();
    let reviews: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reviews, json!([]));

    // The item itself survives
    let req = test::TestRequest::get()
        .uri(&format!("/api/items/{}", item.id))
        .to_request();
    let graph: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(graph["reviews"], json!([]));
}

#[actix_web::test]
async fn test_rules_deeper_than_limit_are_rejected() {
    let mut state = test_state().await;
    state.max_depth = storereviews::config::MIN_MAX_DEPTH;
    let customer = state
        .db
        .insert_customer(&storereviews::models::NewCustomer { name: "Ada".into() })
        .await
        .unwrap();
    let item = state
        .db
        .insert_item(&storereviews::models::NewItem {
            name: "Lamp".into(),
            price: 12.5,
        })
        .await
        .unwrap();
    state
        .db
        .add_customer_item(customer.id, item.id, "Bright")
        .await
        .unwrap();
    let app = app!(state);

    // Default shape fits the smallest allowed limit
    let req = test::TestRequest::get()
        .uri(&format!("/api/customers/{}", customer.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // items -> reviews -> customer needs one more level
    let req = test::TestRequest::get()
        .uri(&format!("/api/customers/{}?rules=items", customer.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
