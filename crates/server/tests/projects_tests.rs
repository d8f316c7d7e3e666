mod common;

use axum::http::{Method, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use common::{multipart_request, project_json, FilePart, TestApp};
use serde_json::{json, Value};

async fn create(app: &TestApp, token: &str, body: Value) -> Value {
    let (status, body) = app
        .json(Method::POST, "/api/projects", Some(token), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["data"]["project"].clone()
}

async fn project_count(app: &TestApp) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects")
        .fetch_one(&app.state.db.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn create_populates_creator_and_defaults_status() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;

    let project = create(&app, &token, project_json("Hull survey")).await;

    assert_eq!(project["name"], "Hull survey");
    assert_eq!(project["status"], "active");
    assert_eq!(project["image"], Value::Null);
    assert_eq!(project["createdBy"]["username"], "skipper");
    assert_eq!(project["createdBy"]["role"], "admin");
    assert!(project["createdBy"].get("passwordHash").is_none());
}

#[tokio::test]
async fn listing_and_reading_are_public() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "subadmin").await;
    let project = create(&app, &token, project_json("Hull survey")).await;
    let uri = format!("/api/projects/{}", project["id"].as_str().unwrap());

    let (status, first) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = app.get(&uri, None).await;
    assert_eq!(first, second);

    let (status, body) = app.get("/api/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["projects"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["data"]["pagination"],
        json!({ "currentPage": 1, "totalPages": 1, "totalCount": 1 })
    );
}

#[tokio::test]
async fn writes_require_authentication() {
    let app = TestApp::new().await;

    let (status, _) = app
        .json(Method::POST, "/api/projects", None, Some(project_json("Hull survey")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::DELETE, "/api/projects/missing", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn end_date_must_follow_start_date() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;

    let mut body = project_json("Backwards");
    body["endDate"] = json!("2024-03-01");
    let (status, response) = app
        .json(Method::POST, "/api/projects", Some(&token), Some(body))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["errors"][0]["field"], "endDate");
    assert_eq!(response["errors"][0]["message"], "End date must be after start date");
    assert_eq!(project_count(&app).await, 0);
}

#[tokio::test]
async fn update_checks_dates_against_stored_values() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;
    let project = create(&app, &token, project_json("Hull survey")).await;
    let uri = format!("/api/projects/{}", project["id"].as_str().unwrap());

    let (status, _) = app
        .json(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "endDate": "2024-02-01" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .json(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "status": "on-hold", "client": "Harbour Board" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Project updated successfully");
    assert_eq!(body["data"]["project"]["status"], "on-hold");
    assert_eq!(body["data"]["project"]["client"], "Harbour Board");
    assert_eq!(body["data"]["project"]["name"], "Hull survey");
}

#[tokio::test]
async fn missing_projects_are_not_found() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;

    let (status, body) = app.get("/api/projects/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Project not found");

    let (status, _) = app
        .json(
            Method::PUT,
            "/api/projects/nope",
            Some(&token),
            Some(json!({ "name": "x" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(Method::DELETE, "/api/projects/nope", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_status_and_search() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;
    create(&app, &token, project_json("Hull survey")).await;
    let mut done = project_json("Propeller polish");
    done["status"] = json!("completed");
    create(&app, &token, done).await;

    let (_, body) = app.get("/api/projects?status=completed", None).await;
    let projects = body["data"]["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "Propeller polish");

    let (_, body) = app.get("/api/projects?search=POLISH", None).await;
    let projects = body["data"]["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "Propeller polish");

    let (_, body) = app.get("/api/projects?search=100%25", None).await;
    assert!(body["data"]["projects"].as_array().unwrap().is_empty());

    let (_, body) = app.get("/api/projects?limit=1&page=2", None).await;
    assert_eq!(body["data"]["projects"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["pagination"]["totalPages"], 2);
}

#[tokio::test]
async fn search_folds_case_beyond_ascii() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;
    let mut fjord = project_json("Fjord ferry refit");
    fjord["client"] = json!("ÅLESUND Marine");
    create(&app, &token, fjord).await;
    create(&app, &token, project_json("Hull survey")).await;

    for term in ["%C3%A5lesund", "%C3%85LESUND", "%C3%A5LeSuNd%20marine"] {
        let (status, body) = app.get(&format!("/api/projects?search={term}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let projects = body["data"]["projects"].as_array().unwrap();
        assert_eq!(projects.len(), 1, "{term}");
        assert_eq!(projects[0]["client"], "ÅLESUND Marine");
    }
}

#[tokio::test]
async fn renamed_project_is_found_by_its_new_name() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;
    let project = create(&app, &token, project_json("Keel inspection")).await;
    let uri = format!("/api/projects/{}", project["id"].as_str().unwrap());

    let (status, _) = app
        .json(Method::PUT, &uri, Some(&token), Some(json!({ "name": "Ørsta slipway" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/projects?search=%C3%B8rsta", None).await;
    assert_eq!(body["data"]["projects"].as_array().unwrap().len(), 1);
    // Unchanged fields stay searchable.
    let (_, body) = app.get("/api/projects?search=antifouling", None).await;
    assert_eq!(body["data"]["projects"].as_array().unwrap().len(), 1);
    let (_, body) = app.get("/api/projects?search=keel", None).await;
    assert!(body["data"]["projects"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_the_project() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;
    let project = create(&app, &token, project_json("Hull survey")).await;
    let uri = format!("/api/projects/{}", project["id"].as_str().unwrap());

    let (status, body) = app.json(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Project deleted successfully");
    assert_eq!(project_count(&app).await, 0);
}

#[tokio::test]
async fn uploaded_image_round_trips_as_data_uri() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
    jpeg.extend((0..2048u32).map(|i| (i % 251) as u8));
    jpeg.extend([0xFF, 0xD9]);

    let request = multipart_request(
        Method::POST,
        "/api/projects",
        &token,
        &[
            ("name", "Dry dock refit"),
            ("description", "Blasting and coating"),
            ("client", "North Sea Shipping"),
            ("startDate", "2024-03-01"),
            ("endDate", "2024-05-01"),
        ],
        Some(FilePart {
            name: "image",
            file_name: "hull.jpg",
            content_type: "image/jpeg",
            bytes: &jpeg,
        }),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let uri = format!(
        "/api/projects/{}",
        body["data"]["project"]["id"].as_str().unwrap()
    );
    let (_, body) = app.get(&uri, None).await;
    let image = body["data"]["project"]["image"].as_str().unwrap();
    let encoded = image.strip_prefix("data:image/jpeg;base64,").unwrap();
    assert_eq!(STANDARD.decode(encoded).unwrap(), jpeg);

    // Nothing stays behind in the holding directory.
    let mut entries = tokio::fs::read_dir(app.state.uploads.base_path()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;

    let request = multipart_request(
        Method::POST,
        "/api/projects",
        &token,
        &[
            ("name", "Dry dock refit"),
            ("description", "Blasting and coating"),
            ("client", "North Sea Shipping"),
            ("startDate", "2024-03-01"),
            ("endDate", "2024-05-01"),
        ],
        Some(FilePart {
            name: "image",
            file_name: "notes.txt",
            content_type: "text/plain",
            bytes: b"not a picture",
        }),
    );
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only image files are allowed");
    assert_eq!(project_count(&app).await, 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected_and_cleaned_up() {
    let app = TestApp::new().await;
    let token = app.token_for("skipper", "admin").await;

    let image = vec![0xAB; 5 * 1024 * 1024 + 1];
    let request = multipart_request(
        Method::POST,
        "/api/projects",
        &token,
        &[
            ("name", "Dry dock refit"),
            ("description", "Blasting and coating"),
            ("client", "North Sea Shipping"),
            ("startDate", "2024-03-01"),
            ("endDate", "2024-05-01"),
        ],
        Some(FilePart {
            name: "image",
            file_name: "huge.png",
            content_type: "image/png",
            bytes: &image,
        }),
    );
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "File too large. Maximum size is 5MB");
    assert_eq!(project_count(&app).await, 0);

    match tokio::fs::read_dir(app.state.uploads.base_path()).await {
        Ok(mut entries) => assert!(entries.next_entry().await.unwrap().is_none()),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
    }
}
