mod common;

use common::send;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn category_names_are_unique_per_parent() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let name = common::unique("Điện thoại");

    let (status, body) = send(
        admin
            .client
            .post(app.api("categories", "create"))
            .json(&json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let root_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        admin
            .client
            .post(app.api("categories", "create"))
            .json(&json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Danh mục đã tồn tại");

    // The same name under a different parent is fine.
    let (status, body) = send(
        admin
            .client
            .post(app.api("categories", "create"))
            .json(&json!({ "name": name, "parent_id": root_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let child_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        admin
            .client
            .post(app.api("categories", "create"))
            .json(&json!({ "name": common::unique("Cháu"), "parent_id": child_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Danh mục chỉ hỗ trợ tối đa hai cấp");

    let url = format!("{}&id={}", app.api("categories", "get"), root_id);
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["children"][0]["id"], child_id);

    let (status, body) = send(app.client().get(app.api("categories", "tree"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|node| node["id"] == root_id && node["children"][0]["id"] == child_id));
}

#[tokio::test]
async fn category_writes_need_admin() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let user = app.user("curious").await;
    let category_id = app.category(&admin).await;

    let (status, _) = send(
        user.client
            .post(app.api("categories", "create"))
            .json(&json!({ "name": common::unique("Lậu") })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(admin.client.put(app.api("categories", "update")).json(&json!({
        "id": category_id,
        "parent_id": "root",
        "description": "Mô tả mới",
    })))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["description"], "Mô tả mới");

    let (status, _) = send(admin.client.put(app.api("categories", "update")).json(&json!({
        "id": category_id,
        "parent_id": "abc",
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let url = format!("{}&id={}", app.api("categories", "delete"), category_id);
    let (status, _) = send(admin.client.delete(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(admin.client.delete(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(app.client().get(app.api("categories", "list"))).await;
    assert!(!body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["id"] == category_id));
}

#[tokio::test]
async fn product_lifecycle() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let seller = app.user("merchant").await;
    let stranger = app.user("window").await;

    let (status, body) = send(seller.client.post(app.api("products", "create")).json(&json!({
        "name": "Tai nghe",
        "description": "Chống ồn",
        "price": "-1",
        "category_id": category_id,
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let product_id = app.product(&seller, category_id).await;

    let url = format!("{}&id={}", app.api("products", "get"), product_id);
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["view_count"], 1);
    assert_eq!(body["data"]["creator"]["id"], seller.id);

    let (status, _) = send(stranger.client.put(app.api("products", "update")).json(&json!({
        "id": product_id,
        "name": "Của tôi",
    })))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(seller.client.put(app.api("products", "update")).json(&json!({
        "product_id": product_id,
        "specs": { "color": "đen" },
    })))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["specs"]["color"], "đen");

    let url = format!("{}&creator_id={}", app.api("products", "list_by_user"), seller.id);
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"]["total"], 1);

    let url = format!("{}&id={}", app.api("products", "delete"), product_id);
    let (status, _) = send(seller.client.delete(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(seller.client.delete(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let url = format!("{}&id={}", app.api("products", "get"), product_id);
    let (status, _) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_hard_delete_removes_reviews() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let seller = app.user("store").await;
    let buyer = app.user("shopper").await;
    let product_id = app.product(&seller, category_id).await;

    let (status, _) = send(buyer.client.post(app.api("reviews", "create")).json(&json!({
        "product_id": product_id,
        "rating": 5,
        "comment": "Tuyệt",
    })))
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let url = format!("{}&id={}", app.api("products_admin", "delete"), product_id);
    let (status, _) = send(seller.client.delete(&url)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(admin.client.delete(&url)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["removed_reviews"], 1);

    assert_eq!(
        app.scalar(
            "SELECT COUNT(*) FROM reviews WHERE product_id = $1",
            vec![product_id.into()]
        )
        .await,
        0
    );

    let (status, _) = send(admin.client.delete(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
