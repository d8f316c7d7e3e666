mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, PASSWORD};
use serde_json::{json, Value};

async fn create_subadmin(app: &TestApp, admin: &str, username: &str) -> Value {
    let (status, body) = app
        .json(
            Method::POST,
            "/api/subadmins",
            Some(admin),
            Some(json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": PASSWORD,
                "role": "admin",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    assert_eq!(body["message"], "Sub-admin created successfully");
    body["data"]["subAdmin"].clone()
}

#[tokio::test]
async fn subadmin_token_is_forbidden_from_admin_routes() {
    let app = TestApp::new().await;
    let token = app.token_for("deckhand", "subadmin").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/subadmins",
            Some(&token),
            Some(json!({
                "username": "stowaway",
                "email": "stowaway@example.com",
                "password": PASSWORD,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied. Insufficient permissions.");

    let (status, _) = app.get("/api/users/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_require_a_token() {
    let app = TestApp::new().await;

    let (status, _) = app.get("/api/subadmins", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn created_accounts_are_always_subadmins() {
    let app = TestApp::new().await;
    let admin = app.token_for("skipper", "admin").await;

    let user = create_subadmin(&app, &admin, "deckhand").await;
    assert_eq!(user["role"], "subadmin");

    let token = app.login("deckhand").await;
    let (status, _) = app.get("/api/subadmins", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_and_lookup_only_show_subadmins() {
    let app = TestApp::new().await;
    let admin = app.token_for("skipper", "admin").await;
    let admin_id = {
        let (_, body) = app.get("/api/users/profile", Some(&admin)).await;
        body["data"]["user"]["id"].as_str().unwrap().to_string()
    };
    create_subadmin(&app, &admin, "deckhand").await;
    create_subadmin(&app, &admin, "bosun").await;

    let (status, body) = app.get("/api/subadmins", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["data"]["subAdmins"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["bosun", "deckhand"]);
    assert_eq!(body["data"]["pagination"]["totalCount"], 2);

    let (_, body) = app.get("/api/subadmins?search=BOS", Some(&admin)).await;
    assert_eq!(body["data"]["subAdmins"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .get(&format!("/api/subadmins/{admin_id}"), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Sub-admin not found");
}

#[tokio::test]
async fn deactivation_revokes_live_tokens() {
    let app = TestApp::new().await;
    let admin = app.token_for("skipper", "admin").await;
    let user = create_subadmin(&app, &admin, "deckhand").await;
    let token = app.login("deckhand").await;

    let (status, _) = app.get("/api/users/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/subadmins/{}", user["id"].as_str().unwrap());
    let (status, body) = app
        .json(Method::PUT, &uri, Some(&admin), Some(json!({ "isActive": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subAdmin"]["isActive"], false);

    let (status, body) = app.get("/api/users/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Account is deactivated.");

    // Nor can they log in again.
    let (status, _) = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "deckhand@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn update_rejects_identities_held_by_others() {
    let app = TestApp::new().await;
    let admin = app.token_for("skipper", "admin").await;
    let user = create_subadmin(&app, &admin, "deckhand").await;
    create_subadmin(&app, &admin, "bosun").await;
    let uri = format!("/api/subadmins/{}", user["id"].as_str().unwrap());

    let (status, body) = app
        .json(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "email": "bosun@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already exists");

    let (status, body) = app
        .json(Method::PUT, &uri, Some(&admin), Some(json!({ "username": "bosun" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username already exists");

    // Keeping one's own values is not a clash.
    let (status, body) = app
        .json(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "username": "deckhand", "email": "first-mate@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subAdmin"]["email"], "first-mate@example.com");
}

#[tokio::test]
async fn delete_only_touches_subadmins() {
    let app = TestApp::new().await;
    let admin = app.token_for("skipper", "admin").await;
    let user = create_subadmin(&app, &admin, "deckhand").await;
    let uri = format!("/api/subadmins/{}", user["id"].as_str().unwrap());

    let (status, body) = app.json(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Sub-admin deleted successfully");

    let (status, _) = app.json(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn subadmin_search_folds_case_beyond_ascii() {
    let app = TestApp::new().await;
    let admin = app.token_for("skipper", "admin").await;
    let user = create_subadmin(&app, &admin, "deckhand").await;
    create_subadmin(&app, &admin, "bosun").await;

    let uri = format!("/api/subadmins/{}", user["id"].as_str().unwrap());
    let (status, _) = app
        .json(Method::PUT, &uri, Some(&admin), Some(json!({ "username": "Øyvind" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/subadmins?search=%C3%B8yv", Some(&admin)).await;
    let found = body["data"]["subAdmins"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["username"], "Øyvind");

    // The email keeps matching after the rename.
    let (_, body) = app.get("/api/subadmins?search=DECKHAND", Some(&admin)).await;
    assert_eq!(body["data"]["subAdmins"].as_array().unwrap().len(), 1);
}
