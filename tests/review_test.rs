mod common;

use common::send;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn rating_must_be_in_range() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let seller = app.user("seller").await;
    let buyer = app.user("critic").await;
    let product_id = app.product(&seller, category_id).await;

    for rating in [0, 6] {
        let (status, body) = send(buyer.client.post(app.api("reviews", "create")).json(&json!({
            "product_id": product_id,
            "rating": rating,
            "comment": "Ngoài thang điểm",
        })))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "rating {rating}");
        assert_eq!(body["message"], "Điểm đánh giá phải từ 1 đến 5");
    }

    let (status, _) = send(buyer.client.post(app.api("reviews", "create")).json(&json!({
        "product_id": product_id,
        "rating": "năm",
        "comment": "Không phải số",
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn one_active_review_per_product() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let seller = app.user("shop").await;
    let buyer = app.user("buyer").await;
    let product_id = app.product(&seller, category_id).await;

    let (status, body) = send(buyer.client.post(app.api("reviews", "create")).json(&json!({
        "product_id": product_id,
        "rating": 4,
        "content": "<i>Tốt</i>",
    })))
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["comment"], "Tốt");
    let review_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(buyer.client.post(app.api("reviews", "create")).json(&json!({
        "product_id": product_id,
        "rating": 5,
        "comment": "Lần hai",
    })))
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Bạn đã đánh giá sản phẩm này rồi");

    // Deleting frees the slot for a new review.
    let url = format!("{}&id={}", app.api("reviews", "delete"), review_id);
    let (status, _) = send(buyer.client.delete(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(buyer.client.delete(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(buyer.client.post(app.api("reviews", "create")).json(&json!({
        "product_id": product_id,
        "rating": 5,
        "comment": "Viết lại",
    })))
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn helpful_votes_stats_and_featured() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let seller = app.user("maker").await;
    let product_id = app.product(&seller, category_id).await;

    let mut review_ids = Vec::new();
    for (prefix, rating) in [("first", 5), ("second", 3)] {
        let reviewer = app.user(prefix).await;
        let (status, body) = send(reviewer.client.post(app.api("reviews", "create")).json(
            &json!({
                "product_id": product_id,
                "rating": rating,
                "comment": format!("Đánh giá {rating} sao"),
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        review_ids.push(body["data"]["id"].as_i64().unwrap());
    }

    // Anonymous visitors may vote.
    let (status, body) = send(
        app.client()
            .post(app.api("reviews", "mark_helpful"))
            .json(&json!({ "review_id": review_ids[1] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["helpful_count"], 1);

    let url = format!("{}&product_id={}", app.api("reviews", "get_stats"), product_id);
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_reviews"], 2);
    assert_eq!(body["data"]["average_rating"], 4.0);
    let distribution = body["data"]["distribution"].as_array().unwrap();
    assert_eq!(distribution.len(), 5);
    assert_eq!(distribution[0]["rating"], 5);
    assert_eq!(distribution[0]["count"], 1);

    let url = format!("{}&limit=100", app.api("reviews", "list_featured"));
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let for_product: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["product_id"] == product_id)
        .collect();
    assert_eq!(for_product.len(), 1);
    assert_eq!(for_product[0]["id"], review_ids[1]);

    let url = format!("{}&product_id={}&rating=5", app.api("reviews", "list"), product_id);
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"]["total"], 1);

    let url = format!("{}&product_id=999999", app.api("reviews", "get_stats"));
    let (status, _) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_author_edits_review() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let seller = app.user("vendor").await;
    let author = app.user("reviewer").await;
    let stranger = app.user("meddler").await;
    let product_id = app.product(&seller, category_id).await;

    let (_, body) = send(author.client.post(app.api("reviews", "create")).json(&json!({
        "product_id": product_id,
        "rating": 2,
        "comment": "Tạm được",
    })))
    .await;
    let review_id = body["data"]["id"].as_i64().unwrap();

    let (status, _) = send(stranger.client.put(app.api("reviews", "update")).json(&json!({
        "id": review_id,
        "rating": 1,
    })))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(author.client.put(app.api("reviews", "update")).json(&json!({
        "id": review_id,
        "rating": 3,
    })))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["rating"], 3);
    assert_eq!(body["data"]["comment"], "Tạm được");

    let (status, body) = send(admin.client.post(app.api("reviews_admin", "update_status")).json(
        &json!({ "review_id": review_id, "status": "inactive" }),
    ))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let url = format!("{}&id={}", app.api("reviews", "get"), review_id);
    let (status, _) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
