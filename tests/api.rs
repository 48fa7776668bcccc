mod common;

use common::TestServer;
use reqwest::Client;
use serde_json::{Value, json};

async fn create_user_and_login(server: &TestServer, client: &Client, username: &str) -> String {
    let resp = client
        .post(format!("{}/api/v1/admin/users", server.base_url))
        .bearer_auth(&server.admin_token)
        .json(&json!({"username": username, "password": "hunter2secret"}))
        .send()
        .await
        .expect("create user");
    assert_eq!(resp.status(), 201);

    let resp: Value = client
        .post(format!("{}/api/v1/auth/login", server.base_url))
        .json(&json!({"username": username, "password": "hunter2secret"}))
        .send()
        .await
        .expect("login")
        .json()
        .await
        .expect("parse login response");
    resp["data"]["token"].as_str().expect("token").to_string()
}

async fn create_site(server: &TestServer, client: &Client, token: &str, code: &str) -> i64 {
    let resp: Value = client
        .post(format!("{}/api/v1/sites", server.base_url))
        .bearer_auth(token)
        .json(&json!({"site_code": code, "site_name": format!("Site {code}")}))
        .send()
        .await
        .expect("create site")
        .json()
        .await
        .expect("parse site response");
    resp["data"]["id"].as_i64().expect("site id")
}

async fn create_kit_type(server: &TestServer, client: &Client, token: &str, name: &str) -> i64 {
    let resp: Value = client
        .post(format!("{}/api/v1/kit-types", server.base_url))
        .bearer_auth(token)
        .json(&json!({"name": name, "default_expiry_days": 365}))
        .send()
        .await
        .expect("create kit type")
        .json()
        .await
        .expect("parse kit type response");
    resp["data"]["id"].as_i64().expect("kit type id")
}

async fn create_labkit(
    server: &TestServer,
    client: &Client,
    token: &str,
    barcode: &str,
    kit_type_id: i64,
    site_id: Option<i64>,
) -> i64 {
    let resp: Value = client
        .post(format!("{}/api/v1/labkits", server.base_url))
        .bearer_auth(token)
        .json(&json!({"barcode": barcode, "kit_type_id": kit_type_id, "site_id": site_id}))
        .send()
        .await
        .expect("create labkit")
        .json()
        .await
        .expect("parse labkit response");
    resp["data"]["id"].as_i64().expect("labkit id")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start().await;
    let client = Client::new();

    let resp = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .expect("health request");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "OK");
}

#[tokio::test]
async fn test_requires_authentication() {
    let server = TestServer::start().await;
    let client = Client::new();

    let resp = client
        .get(format!("{}/api/v1/sites", server.base_url))
        .send()
        .await
        .expect("unauthenticated request");
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().contains_key("www-authenticate"));

    let resp = client
        .get(format!("{}/api/v1/sites", server.base_url))
        .bearer_auth("labtrack_12345678_123456789012345678901234")
        .send()
        .await
        .expect("bad token request");
    assert_eq!(resp.status(), 401);

    // Admin endpoints reject non-admin tokens
    let user_token = create_user_and_login(&server, &client, "nina").await;
    let resp = client
        .post(format!("{}/api/v1/admin/users", server.base_url))
        .bearer_auth(&user_token)
        .json(&json!({"username": "other", "password": "hunter2secret"}))
        .send()
        .await
        .expect("non-admin request");
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let server = TestServer::start().await;
    let client = Client::new();
    create_user_and_login(&server, &client, "nina").await;

    let resp = client
        .post(format!("{}/api/v1/auth/login", server.base_url))
        .json(&json!({"username": "nina", "password": "wrong"}))
        .send()
        .await
        .expect("login");
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("{}/api/v1/auth/login", server.base_url))
        .json(&json!({"username": "nobody", "password": "hunter2secret"}))
        .send()
        .await
        .expect("login");
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = create_user_and_login(&server, &client, "nina").await;

    let resp = client
        .post(format!("{}/api/v1/auth/logout", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("logout");
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/v1/sites", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("request after logout");
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_labkit_lifecycle() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = create_user_and_login(&server, &client, "nina").await;

    let site_id = create_site(&server, &client, &token, "OSL01").await;
    let type_id = create_kit_type(&server, &client, &token, "Screening kit").await;
    let kit_id = create_labkit(&server, &client, &token, "KIT-0001", type_id, Some(site_id)).await;

    // New kits always start planned
    let resp: Value = client
        .get(format!("{}/api/v1/labkits/{}", server.base_url, kit_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get labkit")
        .json()
        .await
        .expect("parse labkit");
    assert_eq!(resp["data"]["status"], "planned");
    assert_eq!(resp["data"]["kit_type_name"], "Screening kit");

    for status in ["packed", "ready_to_ship", "shipped"] {
        let resp: Value = client
            .post(format!("{}/api/v1/labkits/status", server.base_url))
            .bearer_auth(&token)
            .json(&json!({"barcode": "KIT-0001", "new_status": status}))
            .send()
            .await
            .expect("change status")
            .json()
            .await
            .expect("parse transition");
        assert_eq!(resp["data"]["new_status"], *status);
        assert_eq!(resp["data"]["event_logged"], true);
    }

    // History forms an unbroken chain from the initial status
    let resp: Value = client
        .get(format!(
            "{}/api/v1/labkits/barcode/KIT-0001/history",
            server.base_url
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("history")
        .json()
        .await
        .expect("parse history");
    let history = resp["data"].as_array().expect("history array");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0]["old_status"], "planned");
    assert_eq!(history[2]["new_status"], "shipped");

    // Transitions for unknown barcodes are a clean 404
    let resp = client
        .post(format!("{}/api/v1/labkits/status", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"barcode": "NO-SUCH-KIT", "new_status": "shipped"}))
        .send()
        .await
        .expect("change status");
    assert_eq!(resp.status(), 404);

    // The audit trail attributes status changes to the logged-in user
    let resp: Value = client
        .get(format!(
            "{}/api/v1/audit?entity_type=Labkit",
            server.base_url
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("audit")
        .json()
        .await
        .expect("parse audit");
    let entries = resp["data"].as_array().expect("audit array");
    let change = entries
        .iter()
        .find(|e| e["action"] == "STATUS_CHANGE")
        .expect("status change entry");
    assert_eq!(change["user"], "nina");
    assert_eq!(change["entity_id"], kit_id);

    // Label payload is barcode|url
    let resp: Value = client
        .get(format!(
            "{}/api/v1/labkits/{}/label",
            server.base_url, kit_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("label")
        .json()
        .await
        .expect("parse label");
    let payload = resp["data"]["payload"].as_str().expect("payload");
    assert!(payload.starts_with("KIT-0001|"));

    // Deleting the kit removes it but keeps the audit trail
    let resp = client
        .delete(format!("{}/api/v1/labkits/{}", server.base_url, kit_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("delete labkit");
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/v1/labkits/{}", server.base_url, kit_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get deleted labkit");
    assert_eq!(resp.status(), 404);

    let resp: Value = client
        .get(format!("{}/api/v1/audit", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("audit after delete")
        .json()
        .await
        .expect("parse audit");
    let entries = resp["data"].as_array().expect("audit array");
    assert!(entries.iter().any(|e| e["action"] == "DELETE"));
    assert!(entries.iter().any(|e| e["action"] == "STATUS_CHANGE"));
}

#[tokio::test]
async fn test_shipment_assignment_and_cascade() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = create_user_and_login(&server, &client, "nina").await;

    let site_id = create_site(&server, &client, &token, "OSL01").await;
    let type_id = create_kit_type(&server, &client, &token, "Screening kit").await;
    let kit1 = create_labkit(&server, &client, &token, "K1", type_id, None).await;
    let kit2 = create_labkit(&server, &client, &token, "K2", type_id, None).await;
    let kit3 = create_labkit(&server, &client, &token, "K3", type_id, None).await;

    let resp: Value = client
        .post(format!("{}/api/v1/shipments", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"site_id": site_id, "carrier": "DHL"}))
        .send()
        .await
        .expect("create shipment")
        .json()
        .await
        .expect("parse shipment");
    assert_eq!(resp["data"]["status"], "planned");
    let shipment_id = resp["data"]["id"].as_i64().expect("shipment id");

    let resp: Value = client
        .put(format!(
            "{}/api/v1/shipments/{}/labkits",
            server.base_url, shipment_id
        ))
        .bearer_auth(&token)
        .json(&json!({"labkit_ids": [kit1, kit2]}))
        .send()
        .await
        .expect("assign labkits")
        .json()
        .await
        .expect("parse assignment");
    assert_eq!(resp["data"]["added"].as_array().unwrap().len(), 2);
    assert!(resp["data"]["removed"].as_array().unwrap().is_empty());

    // Reassignment only touches the difference
    let resp: Value = client
        .put(format!(
            "{}/api/v1/shipments/{}/labkits",
            server.base_url, shipment_id
        ))
        .bearer_auth(&token)
        .json(&json!({"labkit_ids": [kit2, kit3]}))
        .send()
        .await
        .expect("reassign labkits")
        .json()
        .await
        .expect("parse reassignment");
    assert_eq!(resp["data"]["added"], json!([kit3]));
    assert_eq!(resp["data"]["removed"], json!([kit1]));

    // Marking the shipment shipped moves the assigned kits along
    let resp = client
        .put(format!(
            "{}/api/v1/shipments/{}",
            server.base_url, shipment_id
        ))
        .bearer_auth(&token)
        .json(&json!({"site_id": site_id, "carrier": "DHL", "status": "shipped"}))
        .send()
        .await
        .expect("mark shipped");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("parse shipped");
    assert!(body["data"]["shipped_at"].is_string());

    for kit in ["K2", "K3"] {
        let resp: Value = client
            .get(format!(
                "{}/api/v1/labkits/barcode/{}",
                server.base_url, kit
            ))
            .bearer_auth(&token)
            .send()
            .await
            .expect("get kit")
            .json()
            .await
            .expect("parse kit");
        assert_eq!(resp["data"]["status"], "shipped");
    }

    // The unassigned kit is untouched
    let resp: Value = client
        .get(format!("{}/api/v1/labkits/barcode/K1", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get kit")
        .json()
        .await
        .expect("parse kit");
    assert_eq!(resp["data"]["status"], "planned");
}

#[tokio::test]
async fn test_inventory_and_exports() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = create_user_and_login(&server, &client, "nina").await;

    let site_id = create_site(&server, &client, &token, "OSL01").await;
    let type_id = create_kit_type(&server, &client, &token, "Screening kit").await;
    create_labkit(&server, &client, &token, "AT-SITE", type_id, Some(site_id)).await;
    create_labkit(&server, &client, &token, "DEPOT", type_id, None).await;

    for barcode in ["AT-SITE", "DEPOT"] {
        let status = if barcode == "DEPOT" {
            "ready_to_ship"
        } else {
            "at_site"
        };
        client
            .post(format!("{}/api/v1/labkits/status", server.base_url))
            .bearer_auth(&token)
            .json(&json!({"barcode": barcode, "new_status": status}))
            .send()
            .await
            .expect("change status");
    }

    let resp: Value = client
        .get(format!("{}/api/v1/inventory", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("inventory")
        .json()
        .await
        .expect("parse inventory");
    let rows = resp["data"].as_array().expect("inventory rows");
    assert_eq!(rows.len(), 2);

    // "none" selects kits held at the central depot
    let resp: Value = client
        .get(format!("{}/api/v1/inventory?site_id=none", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("depot inventory")
        .json()
        .await
        .expect("parse depot inventory");
    let rows = resp["data"].as_array().expect("inventory rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["site_name"], "Central depot");
    assert_eq!(rows[0]["available_count"], 1);

    let resp = client
        .get(format!("{}/api/v1/inventory?site_id=bogus", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("bad inventory filter");
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{}/api/v1/export/labkits.csv", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("labkits csv");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/csv")
    );
    let body = resp.text().await.expect("csv body");
    assert!(body.starts_with("id,barcode,kit_type,site,status"));
    assert!(body.contains("AT-SITE"));

    let resp = client
        .get(format!("{}/api/v1/export/audit.csv", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("audit csv");
    let body = resp.text().await.expect("csv body");
    assert!(body.starts_with("timestamp,user,entity_type"));
    assert!(body.contains("STATUS_CHANGE"));

    let resp = client
        .get(format!("{}/api/v1/export/shipments.csv", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("shipments csv");
    let body = resp.text().await.expect("csv body");
    assert!(body.starts_with("id,site,shipped_at"));
}

#[tokio::test]
async fn test_conflicts_and_validation() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = create_user_and_login(&server, &client, "nina").await;

    create_site(&server, &client, &token, "OSL01").await;
    let resp = client
        .post(format!("{}/api/v1/sites", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"site_code": "OSL01", "site_name": "Duplicate"}))
        .send()
        .await
        .expect("duplicate site");
    assert_eq!(resp.status(), 409);

    let type_id = create_kit_type(&server, &client, &token, "Screening kit").await;
    create_labkit(&server, &client, &token, "KIT-0001", type_id, None).await;
    let resp = client
        .post(format!("{}/api/v1/labkits", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"barcode": "KIT-0001", "kit_type_id": type_id}))
        .send()
        .await
        .expect("duplicate barcode");
    assert_eq!(resp.status(), 409);

    let resp = client
        .post(format!("{}/api/v1/labkits", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"barcode": "has spaces", "kit_type_id": type_id}))
        .send()
        .await
        .expect("bad barcode");
    assert_eq!(resp.status(), 400);

    // Weight outside the kit type's tolerated range is rejected
    let resp: Value = client
        .post(format!("{}/api/v1/kit-types", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"name": "Weighed kit", "standard_weight": 250.0, "weight_variance": 5.0}))
        .send()
        .await
        .expect("create weighed type")
        .json()
        .await
        .expect("parse weighed type");
    let weighed_id = resp["data"]["id"].as_i64().expect("kit type id");

    let resp = client
        .post(format!("{}/api/v1/labkits", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"barcode": "HEAVY", "kit_type_id": weighed_id, "measured_weight": 260.0}))
        .send()
        .await
        .expect("overweight kit");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_create_with_status_records_transition() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = create_user_and_login(&server, &client, "nina").await;

    let type_id = create_kit_type(&server, &client, &token, "Screening kit").await;
    let resp: Value = client
        .post(format!("{}/api/v1/labkits", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"barcode": "KIT-0002", "kit_type_id": type_id, "status": "packed"}))
        .send()
        .await
        .expect("create packed labkit")
        .json()
        .await
        .expect("parse labkit");
    assert_eq!(resp["data"]["status"], "packed");

    // The requested status lands as a recorded planned -> packed transition
    let resp: Value = client
        .get(format!(
            "{}/api/v1/labkits/barcode/KIT-0002/history",
            server.base_url
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("history")
        .json()
        .await
        .expect("parse history");
    let history = resp["data"].as_array().expect("history array");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["old_status"], "planned");
    assert_eq!(history[0]["new_status"], "packed");
}

#[tokio::test]
async fn test_expiry_report_buckets() {
    let server = TestServer::start().await;
    let client = Client::new();
    let token = create_user_and_login(&server, &client, "nina").await;
    let type_id = create_kit_type(&server, &client, &token, "Screening kit").await;

    let today = chrono::Utc::now().date_naive();
    let kits = [
        ("EXP-PAST", Some(today - chrono::Days::new(1))),
        ("EXP-TODAY", Some(today)),
        ("EXP-EDGE", Some(today + chrono::Days::new(60))),
        ("EXP-FAR", Some(today + chrono::Days::new(61))),
        ("EXP-NONE", None),
    ];
    for (barcode, expiry) in &kits {
        let resp = client
            .post(format!("{}/api/v1/labkits", server.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "barcode": barcode,
                "kit_type_id": type_id,
                "expiry_date": expiry.map(|d| d.to_string()),
            }))
            .send()
            .await
            .expect("create labkit");
        assert_eq!(resp.status(), 201, "create {barcode}");
    }

    let resp: Value = client
        .get(format!("{}/api/v1/labkits/expiring", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("expiry report")
        .json()
        .await
        .expect("parse report");

    let barcodes = |bucket: &str| -> Vec<String> {
        resp["data"][bucket]
            .as_array()
            .expect("bucket array")
            .iter()
            .map(|k| k["barcode"].as_str().expect("barcode").to_string())
            .collect()
    };

    // Yesterday is expired; today and the 60-day edge are expiring soon;
    // beyond the horizon and undated kits appear in neither bucket.
    assert_eq!(barcodes("expired"), ["EXP-PAST"]);
    assert_eq!(barcodes("expiring_soon"), ["EXP-TODAY", "EXP-EDGE"]);
    for bucket in ["expired", "expiring_soon"] {
        let names = barcodes(bucket);
        assert!(!names.contains(&"EXP-FAR".to_string()));
        assert!(!names.contains(&"EXP-NONE".to_string()));
    }
}
