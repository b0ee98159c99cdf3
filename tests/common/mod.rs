use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use refsys::repositories::memory::MemoryStore;
use refsys::services::{http, spawn_services};
use refsys::settings::{Events, Postgres, Rewards, Security, Server, Settings};
use rust_decimal::Decimal;
use serde_json::{json, Value};

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
}

pub fn test_settings() -> Settings {
    Settings {
        server: Server {
            listen: "127.0.0.1:0".to_string(),
        },
        postgres: Postgres {
            url: "postgres://invalid".to_string(),
            max_connections: 1,
        },
        rewards: Rewards {
            min_amount_for_referral: Decimal::from(200),
        },
        // Lowest cost bcrypt accepts, keeps registration fast.
        security: Security { bcrypt_cost: 4 },
        events: Events { queue_size: 64 },
    }
}

/// Services backed by a fresh in-memory store, mounted on a test server.
pub fn create_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let channels = spawn_services(store.clone(), &test_settings());
    let server = TestServer::new(http::router(channels)).expect("Failed to start test server");

    TestApp { server, store }
}

impl TestApp {
    /// Registers a user and returns the response body.
    pub async fn register(&self, username: &str, referrer: Option<&str>) -> Value {
        let response = self
            .server
            .post("/register")
            .json(&json!({
                "username": username,
                "password": "SecurePass123!",
                "referrer": referrer,
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    pub async fn fund(&self, user: &Value, amount: Decimal) {
        let id = user["id"].as_i64().expect("user id");
        self.store
            .credit_opening_balance(id, amount)
            .await
            .expect("Failed to fund account");
    }

    pub async fn transfer(&self, sender: &Value, recipient: &Value, amount: &str) -> Value {
        let response = self
            .server
            .post("/transaction")
            .json(&json!({
                "sender_id": sender["id"].to_string(),
                "recipient_id": recipient["id"].to_string(),
                "amount": amount,
                "description": "test",
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    /// Polls the payout listing until it has `count` entries. Payouts are
    /// recorded in the background, after the triggering request returned.
    #[allow(dead_code)]
    pub async fn wait_for_payouts(&self, user: &Value, count: usize) -> Vec<Value> {
        let path = format!("/users/{}/payouts", user["id"]);

        for _ in 0..100 {
            let payouts: Vec<Value> = self.server.get(&path).await.json();
            if payouts.len() >= count {
                return payouts;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        panic!("timed out waiting for {count} payouts on {path}");
    }
}
