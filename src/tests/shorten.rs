use axum::http::StatusCode;

use crate::config::Config;
use crate::tests::helper;

#[tokio::test]
async fn test_shorten_plain() {
    let (mut app, _dir) = helper::setup_test_app().await;

    let response = helper::shorten_plain(&mut app, None, "https://example.com/a").await;
    assert_eq!(StatusCode::CREATED, response.status_code);

    let short_url = response.text();
    assert!(short_url.starts_with("http://localhost:8080/"));
    let shortcut = helper::shortcut_of(&short_url);
    assert_eq!(8, shortcut.len());

    // same URL again
    let response = helper::shorten_plain(&mut app, None, "https://example.com/a").await;
    assert_eq!(StatusCode::CONFLICT, response.status_code);
    assert_eq!(short_url, response.text());

    let response = helper::root(&mut app, &shortcut).await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, response.status_code);
    assert_eq!(Some("https://example.com/a".to_string()), response.location);
}

#[tokio::test]
async fn test_shorten_json() {
    let (mut app, _dir) = helper::setup_test_app().await;

    let response = helper::shorten(&mut app, None, "https://example.com/a").await;
    assert_eq!(StatusCode::CREATED, response.status_code);
    let short_url = helper::get_result(&response.body);

    let response = helper::shorten(&mut app, None, "https://example.com/a").await;
    assert_eq!(StatusCode::CONFLICT, response.status_code);
    assert_eq!(short_url, helper::get_result(&response.body));

    let response = helper::shorten(&mut app, None, "https://example.com/b").await;
    assert_eq!(StatusCode::CREATED, response.status_code);
    assert_ne!(short_url, helper::get_result(&response.body));
}

#[tokio::test]
async fn test_shorten_invalid_url() {
    let (mut app, _dir) = helper::setup_test_app().await;

    let response = helper::shorten(&mut app, None, "not valid link").await;
    assert_eq!(StatusCode::BAD_REQUEST, response.status_code);
    let error = helper::get_error(&response.body);
    assert_eq!("Invalid URL", error.error);
    assert_eq!(Some("not valid link".to_string()), error.description);

    let response = helper::shorten_plain(&mut app, None, "example.com/a").await;
    assert_eq!(StatusCode::BAD_REQUEST, response.status_code);
}

#[tokio::test]
async fn test_shorten_owner_cookie() {
    let (mut app, _dir) = helper::setup_test_app().await;

    let response = helper::shorten(&mut app, None, "https://example.com/a").await;
    let owner = response.owner.unwrap();

    // a known owner does not get a new cookie
    let response = helper::shorten(&mut app, Some(&owner), "https://example.com/b").await;
    assert_eq!(StatusCode::CREATED, response.status_code);
    assert_eq!(None, response.owner);

    // an invalid token is replaced
    let response = helper::shorten(&mut app, Some("invalid"), "https://example.com/c").await;
    assert_eq!(StatusCode::CREATED, response.status_code);
    assert!(response.owner.is_some());
}

#[tokio::test]
async fn test_shorten_with_base_url() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config {
        base_url: Some("https://sho.rt/".to_string()),
        ..helper::test_config(&dir)
    };
    let mut app = helper::setup_test_app_with_config(config).await;

    let response = helper::shorten(&mut app, None, "https://example.com/a").await;
    assert_eq!(StatusCode::CREATED, response.status_code);

    let short_url = helper::get_result(&response.body);
    assert!(short_url.starts_with("https://sho.rt/"));
    assert_eq!(8, helper::shortcut_of(&short_url).len());
}

#[tokio::test]
async fn test_shorten_with_shortcut_length() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config {
        shortcut_length: 12,
        ..helper::test_config(&dir)
    };
    let mut app = helper::setup_test_app_with_config(config).await;

    let response = helper::shorten(&mut app, None, "https://example.com/a").await;
    let short_url = helper::get_result(&response.body);

    assert_eq!(12, helper::shortcut_of(&short_url).len());
}
