mod common;

use axum::http::StatusCode;
use common::TestApp;

#[tokio::test]
async fn test_home_and_listing_render() {
    let app = TestApp::new();
    let (admin, _) = app.admin().await;
    let restaurant_id = app.create_restaurant(&admin, "Casa Verde").await;

    let home = app.get("/", None).await;
    assert_eq!(home.status, StatusCode::OK);
    assert!(home.text().contains("Forkful"));
    assert!(home.text().contains("Casa Verde"));

    let listing = app.get("/restaurants?cuisine=Italian", None).await;
    assert_eq!(listing.status, StatusCode::OK);
    assert!(listing.text().contains("Casa Verde"));

    let detail = app.get(&format!("/restaurants/{}", restaurant_id), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert!(detail.text().contains("Log in</a> to write a review"));
}

#[tokio::test]
async fn test_missing_restaurant_renders_error_page() {
    let app = TestApp::new();
    let response = app.get("/restaurants/nope", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.text().contains("404"));
}

#[tokio::test]
async fn test_protected_pages_redirect_to_login() {
    let app = TestApp::new();
    for path in ["/profile", "/owner", "/admin"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{}", path);
        assert_eq!(response.location.as_deref(), Some("/login"), "{}", path);
    }
}

#[tokio::test]
async fn test_admin_pages_forbidden_for_regular_users() {
    let app = TestApp::new();
    let (diner, _) = app.register("Diner", "diner@example.com").await;
    let response = app.get("/admin/users", Some(&diner)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_form_sets_cookie_and_redirects() {
    let app = TestApp::new();
    app.register("Diner", "diner@example.com").await;

    let bad = app
        .form("/login", None, "email=diner%40example.com&password=wrong-password")
        .await;
    assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(bad.text().contains("do not match"));

    let good = app
        .form("/login", None, "email=diner%40example.com&password=correct-horse")
        .await;
    assert!(good.status.is_redirection());
    assert_eq!(good.location.as_deref(), Some("/"));
    let cookie = good.cookie.expect("Session cookie");

    let profile = app.get("/profile", Some(&cookie)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert!(profile.text().contains("diner@example.com"));
}

#[tokio::test]
async fn test_owner_registration_lands_on_claim_page() {
    let app = TestApp::new();
    let response = app
        .form(
            "/register",
            None,
            "name=Olive&email=olive%40example.com&password=correct-horse\
             &password_confirmation=correct-horse&account_type=restaurant_owner",
        )
        .await;
    assert!(response.status.is_redirection(), "{}", response.text());
    assert_eq!(response.location.as_deref(), Some("/owner"));
    let cookie = response.cookie.expect("Session cookie");

    let owner = app.get("/owner", Some(&cookie)).await;
    assert_eq!(owner.location.as_deref(), Some("/owner/claim"));
}

#[tokio::test]
async fn test_review_form_submission_redirects_with_notice() {
    let app = TestApp::new();
    let (admin, _) = app.admin().await;
    let restaurant_id = app.create_restaurant(&admin, "Sushi Corner").await;
    let (diner, _) = app.register("Diner", "diner@example.com").await;

    let response = app
        .form(
            &format!("/restaurants/{}/reviews", restaurant_id),
            Some(&diner),
            "food_rating=5&service_rating=5&ambiance_rating=4&value_rating=4\
             &title=Great+fish&content=Fresh+and+generous+portions.&visit_date=&recommend=yes",
        )
        .await;
    assert!(response.status.is_redirection(), "{}", response.text());
    let location = response.location.expect("Redirect target");
    assert!(location.contains("notice=review_submitted"));

    let page = app.get(&location, Some(&diner)).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.text().contains("Your review (pending)"));
}

#[tokio::test]
async fn test_admin_settings_form_renames_site() {
    let app = TestApp::new();
    let (admin, _) = app.admin().await;

    let response = app
        .form(
            "/admin/settings",
            Some(&admin),
            "site_name=Plate+Notes&site_description=Eat+well&contact_email=team%40example.com\
             &allow_registration=true&restaurants_per_page=12&reviews_per_page=10",
        )
        .await;
    assert!(response.status.is_redirection(), "{}", response.text());

    let home = app.get("/", None).await;
    assert!(home.text().contains("Plate Notes"));
}

#[tokio::test]
async fn test_admin_edit_form_prefills_coordinates() {
    let app = TestApp::new();
    let (admin, _) = app.admin().await;
    let created = app
        .json(
            "POST",
            "/api/admin/restaurants",
            Some(&admin),
            Some(serde_json::json!({
                "name": "Mar Alto",
                "cuisine": "Seafood",
                "latitude": 38.7223,
                "features": ["Terrace"],
            })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.text());
    let id = created.json()["data"]["id"].as_str().unwrap().to_string();

    let page = app.get(&format!("/admin/restaurants/{}/edit", id), Some(&admin)).await;
    assert_eq!(page.status, StatusCode::OK);
    let html = page.text();
    assert!(html.contains("value=\"38.7223\""), "{}", html);
    assert!(html.contains("name=\"longitude\" value=\"\""));
    assert!(html.contains("Mar Alto"));
}
