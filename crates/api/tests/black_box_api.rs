use std::net::SocketAddr;

use quitute_api::config::AppConfig;
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod (in-memory backends, seeded catalog), ephemeral port.
        let config = AppConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..AppConfig::default()
        };
        let app = quitute_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind(config.bind_addr)
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn interests_settled(
    client: &reqwest::Client,
    srv: &TestServer,
    item_id: i64,
) -> Vec<Value> {
    // The worker dispatches off the request path; poll until every record is marked.
    for _ in 0..100 {
        let res = client
            .get(srv.url(&format!("/items/{item_id}/interests")))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let records: Vec<Value> = res.json().await.unwrap();
        if !records.is_empty() && records.iter().all(|r| r["notified"] == json!(true)) {
            return records;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    panic!("interest records were not notified within timeout");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restock_notifies_waiting_customers_then_sale_empties_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Item 7 starts seeded at zero; two customers ask for it.
    for email in ["ana@padaria.test", "bruno@padaria.test"] {
        let (status, body) = post_json(
            &client,
            srv.url("/availability"),
            json!({ "item_id": 7, "email": email }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], false);
        assert_eq!(body["interest_registered"], true);
    }

    let (status, summary) = post_json(
        &client,
        srv.url("/restock"),
        json!([{ "item_id": 7, "name": "coxinha", "quantity": 4 }]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["updated"], 1);
    assert_eq!(summary["notified_items"], json!([7]));

    let item: Value = client
        .get(srv.url("/items/7"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["stock_quantity"], 4);
    assert_eq!(item["available"], true);

    let records = interests_settled(&client, &srv, 7).await;
    assert_eq!(records.len(), 2);

    // Re-running the dispatcher sends nothing new.
    let (status, report) = post_json(&client, srv.url("/notifications/7"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["emails_sent"], 0);
    assert_eq!(report["already_notified_skipped"], 2);

    let (status, sale) = post_json(
        &client,
        srv.url("/sales"),
        json!({ "item_id": 7, "quantity": 4, "email": "carla@padaria.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sale["sold_quantity"], 4);
    assert_eq!(sale["remaining_stock"], 0);
    assert_eq!(sale["available"], false);

    let reservations: Vec<Value> = client
        .get(srv.url("/items/7/reservations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0]["quantity"], 4);
    assert_eq!(reservations[0]["customer_email"], "carla@padaria.test");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversell_is_a_conflict_reporting_current_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, _) = post_json(
        &client,
        srv.url("/restock"),
        json!([{ "item_id": 3, "name": "croissant", "quantity": 2 }]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(
        &client,
        srv.url("/sales"),
        json!({ "item_id": 3, "quantity": 5, "email": "davi@padaria.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["stock_quantity"], 2);

    // Sold-out item reports zero.
    let (status, body) = post_json(
        &client,
        srv.url("/sales"),
        json!({ "item_id": 4, "email": "davi@padaria.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "out_of_stock");
    assert_eq!(body["stock_quantity"], 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_input_is_rejected_before_any_write() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        srv.url("/sales"),
        json!({ "item_id": 1, "quantity": 0, "email": "eva@padaria.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = post_json(
        &client,
        srv.url("/availability"),
        json!({ "item_id": 1, "email": "not-an-email" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // One bad line rejects the whole restock.
    let (status, _) = post_json(
        &client,
        srv.url("/restock"),
        json!([
            { "item_id": 1, "name": "pão francês", "quantity": 10 },
            { "item_id": 2, "name": "baguete", "quantity": -1 },
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let item: Value = client
        .get(srv.url("/items/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["stock_quantity"], 0);

    let res = client
        .post(srv.url("/sales"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_item_is_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        srv.url("/availability"),
        json!({ "item_id": 999, "email": "fabio@padaria.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let res = client.get(srv.url("/items/999")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_availability_checks_keep_one_interest_record() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let (status, _) = post_json(
            &client,
            srv.url("/availability"),
            json!({ "item_id": 9, "email": "gabi@padaria.test" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let records: Vec<Value> = client
        .get(srv.url("/items/9/interests"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["notified"], false);
    assert_eq!(records[0]["desired_quantity"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn standard_delivery_stocks_the_whole_catalog() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/restock/delivery"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: Value = res.json().await.unwrap();
    // Seeded at zero, so every catalog item transitions.
    assert_eq!(summary["updated"], 20);
    assert_eq!(summary["inserted"], 0);

    let items: Vec<Value> = client
        .get(srv.url("/items"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(items.len(), 20);
    assert!(items.iter().all(|i| i["available"] == json!(true)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_item_id_in_path_is_a_json_validation_error() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for path in ["/items/abc", "/items/abc/reservations", "/items/0/interests"] {
        let res = client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation_error", "{path}");
    }

    let (status, body) = post_json(&client, srv.url("/notifications/abc"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
