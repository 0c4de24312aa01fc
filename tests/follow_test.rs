mod common;

use common::send;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn follow_lifecycle() {
    let app = common::spawn_app().await;
    let fan = app.user("fan").await;
    let star = app.user("star").await;

    let (status, body) = send(
        fan.client
            .post(app.api("follows", "follow"))
            .json(&json!({ "user_id": fan.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Bạn không thể tự theo dõi chính mình");

    let (status, _) = send(
        fan.client
            .post(app.api("follows", "follow"))
            .json(&json!({ "user_id": star.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        fan.client
            .post(app.api("follows", "follow"))
            .json(&json!({ "following_id": star.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Bạn đã theo dõi người dùng này");

    let url = format!("{}&user_id={}", app.api("follows", "check"), star.id);
    let (status, body) = send(fan.client.get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_following"], true);

    let url = format!("{}&user_id={}", app.api("follows", "followers"), star.id);
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["username"], fan.username.as_str());

    let (_, body) = send(fan.client.get(app.api("follows", "following"))).await;
    assert_eq!(body["data"]["items"][0]["id"], star.id);

    let url = format!("{}&user_id={}", app.api("follows", "unfollow"), star.id);
    let (status, _) = send(fan.client.delete(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(fan.client.delete(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let url = format!("{}&user_id={}", app.api("follows", "check"), star.id);
    let (_, body) = send(fan.client.get(&url)).await;
    assert_eq!(body["data"]["is_following"], false);
}

#[tokio::test]
async fn follow_requires_login_and_existing_user() {
    let app = common::spawn_app().await;
    let fan = app.user("lonely").await;

    let (status, _) = send(
        app.client()
            .post(app.api("follows", "follow"))
            .json(&json!({ "user_id": fan.id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        fan.client
            .post(app.api("follows", "follow"))
            .json(&json!({ "user_id": 999_999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app.client().get(app.api("follows", "followers"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
