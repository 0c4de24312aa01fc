mod common;

use common::send;
use reqwest::StatusCode;
use serde_json::json;

// Alone in its binary: the fallback depends on no post having views yet.
#[tokio::test]
async fn hot_topics_fall_back_then_rank() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("trending").await;
    let quiet = app.post(&author, category_id, "Yên tĩnh").await;
    let busy = app.post(&author, category_id, "Sôi nổi").await;

    let (status, body) = send(app.client().get(app.api("posts", "list_hot"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Chưa có chủ đề nổi bật, hiển thị bài viết mới nhất"
    );
    assert_eq!(body["data"][0]["id"], busy);

    let talked = app.post(&author, category_id, "Bàn tán").await;

    let get = format!("{}&id={}", app.api("posts", "get"), busy);
    for _ in 0..3 {
        send(app.client().get(&get)).await;
    }
    let get = format!("{}&id={}", app.api("posts", "get"), quiet);
    send(app.client().get(&get)).await;
    let get = format!("{}&id={}", app.api("posts", "get"), talked);
    send(app.client().get(&get)).await;
    for n in 0..5 {
        let (status, _) = send(author.client.post(app.api("comments", "create")).json(&json!({
            "post_id": talked,
            "content": format!("Ý kiến {n}"),
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // 0.7 * 1 + 0.3 * 5 outranks 0.7 * 3.
    let url = format!("{}&limit=50", app.api("posts", "list_hot"));
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["message"], "Lấy chủ đề nổi bật thành công");
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["id"], talked);
    assert_eq!(items[1]["id"], busy);
    assert_eq!(items[2]["id"], quiet);
    assert_eq!(items[0]["comment_count"], 5);

    let url = format!("{}&limit=2", app.api("posts", "list_hot"));
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}
