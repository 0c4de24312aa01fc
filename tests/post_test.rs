mod common;

use common::send;
use reqwest::{multipart, StatusCode};
use serde_json::json;

#[tokio::test]
async fn create_returns_id_and_get_counts_views() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("writer").await;

    let (status, body) = send(author.client.post(app.api("posts", "create")).json(&json!({
        "title": "Bài viết đầu tiên",
        "content": "Xin chào **mọi người**",
        "category_id": category_id,
        "post_type": "question",
        "tags": ["rust", "axum"],
    })))
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let post_id = body["data"]["post_id"].as_i64().unwrap();
    assert_eq!(body["data"]["post"]["view_count"], 0);
    assert_eq!(body["data"]["post"]["post_type"], "question");
    assert_eq!(body["data"]["post"]["tags"], json!(["rust", "axum"]));
    assert!(body["data"]["post"]["content_html"]
        .as_str()
        .unwrap()
        .contains("<strong>mọi người</strong>"));

    let url = format!("{}&id={}", app.api("posts", "get"), post_id);
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["view_count"], 1);
    assert_eq!(body["data"]["author"]["username"], author.username.as_str());
}

#[tokio::test]
async fn create_validation() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("validator").await;

    let (status, _) = send(app.client().post(app.api("posts", "create")).json(&json!({
        "title": "Ẩn danh",
        "content": "x",
        "category_id": category_id,
    })))
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(author.client.post(app.api("posts", "create")).json(&json!({
        "title": "t".repeat(101),
        "content": "x",
        "category_id": category_id,
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(author.client.post(app.api("posts", "create")).json(&json!({
        "title": "Loại sai",
        "content": "x",
        "category_id": category_id,
        "post_type": "poll",
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(author.client.post(app.api("posts", "create")).json(&json!({
        "title": "Quá nhiều thẻ",
        "content": "x",
        "category_id": category_id,
        "tags": ["a", "b", "c", "d", "e", "f"],
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(author.client.post(app.api("posts", "create")).json(&json!({
        "title": "Danh mục không tồn tại",
        "content": "x",
        "category_id": 999_999,
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multipart_create_stores_media() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("photographer").await;

    let png: Vec<u8> = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    let form = multipart::Form::new()
        .text("title", "Ảnh chụp")
        .text("content", "Xem ảnh")
        .text("category_id", category_id.to_string())
        .part(
            "media",
            multipart::Part::bytes(png)
                .file_name("a.png")
                .mime_str("image/png")
                .unwrap(),
        );

    let (status, body) = send(author.client.post(app.api("posts", "create")).multipart(form)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let media = body["data"]["post"]["media"].as_array().unwrap();
    assert_eq!(media.len(), 1);
    assert!(media[0].as_str().unwrap().starts_with("/uploads/posts/"));

    let form = multipart::Form::new()
        .text("title", "Không phải ảnh")
        .text("content", "x")
        .text("category_id", category_id.to_string())
        .part("media", multipart::Part::bytes(b"%PDF-1.7".to_vec()).file_name("a.pdf"));
    let (status, _) = send(author.client.post(app.api("posts", "create")).multipart(form)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_owner_or_admin_can_edit() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let owner = app.user("owner").await;
    let stranger = app.user("stranger").await;
    let post_id = app.post(&owner, category_id, "Của tôi").await;

    let (status, _) = send(stranger.client.put(app.api("posts", "update")).json(&json!({
        "id": post_id,
        "title": "Của bạn",
    })))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(owner.client.put(app.api("posts", "update")).json(&json!({
        "id": post_id,
        "title": "Đã sửa",
        "tags": [],
    })))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["title"], "Đã sửa");
    assert_eq!(body["data"]["tags"], json!([]));

    let (status, _) = send(admin.client.put(app.api("posts", "update")).json(&json!({
        "id": post_id,
        "content": "Quản trị viên sửa",
    })))
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn soft_delete_twice_is_not_found() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let owner = app.user("deleter").await;
    let post_id = app.post(&owner, category_id, "Sắp xóa").await;
    let url = format!("{}&id={}", app.api("posts", "delete"), post_id);

    let (status, _) = send(owner.client.post(&url)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(owner.client.delete(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(owner.client.delete(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let get = format!("{}&id={}", app.api("posts", "get"), post_id);
    let (status, _) = send(app.client().get(&get)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let status_in_db = app
        .scalar(
            "SELECT COUNT(*) FROM posts WHERE id = $1 AND status = 'deleted'",
            vec![post_id.into()],
        )
        .await;
    assert_eq!(status_in_db, 1);
}

#[tokio::test]
async fn pagination_math() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("pager").await;
    for i in 0..3 {
        app.post(&author, category_id, &format!("Trang {i}")).await;
    }

    let url = format!(
        "{}&user_id={}&page=2&limit=2",
        app.api("posts", "list"),
        author.id
    );
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["page"], 2);
    assert_eq!(body["data"]["limit"], 2);
    assert_eq!(body["data"]["total_pages"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    // Oldest first puts the first post on page one.
    let url = format!(
        "{}&user_id={}&limit=1&sort=oldest",
        app.api("posts", "list"),
        author.id
    );
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"]["items"][0]["title"], "Trang 0");

    // Garbage paging falls back to defaults.
    let url = format!(
        "{}&user_id={}&page=abc&limit=-4",
        app.api("posts", "list"),
        author.id
    );
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["limit"], 10);
}

#[tokio::test]
async fn caller_sets_page_size() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("bulk").await;
    for i in 0..12 {
        app.post(&author, category_id, &format!("{} {i}", author.username))
            .await;
    }

    let url = format!(
        "{}&user_id={}&limit=50",
        app.api("posts", "list"),
        author.id
    );
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["limit"], 50);
    assert_eq!(body["data"]["total"], 12);
    assert_eq!(body["data"]["total_pages"], 1);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 12);

    let url = format!(
        "{}&q={}&limit=5",
        app.api("posts", "search"),
        author.username
    );
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"]["limit"], 5);
    assert_eq!(body["data"]["total_pages"], 3);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 5);

    let url = format!(
        "{}&category_id={}&limit=20",
        app.api("posts", "get_by_category"),
        category_id
    );
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 12);

    let url = format!(
        "{}&user_id={}&limit=11",
        app.api("posts", "list_by_user"),
        author.id
    );
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 11);

    let url = format!("{}&limit=3", app.api("posts", "get_recent"));
    let (_, body) = send(app.client().get(&url)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let url = format!(
        "{}&user_id={}&limit=7",
        app.api("posts_admin", "list"),
        author.id
    );
    let (_, body) = send(admin.client.get(&url)).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 7);

    // Far past the end is an empty page, not an error.
    let url = format!(
        "{}&user_id={}&page=10000000000&limit=10000000000",
        app.api("posts", "list"),
        author.id
    );
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["total"], 12);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_and_category_listing() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("searcher").await;
    let needle = common::unique("kimcuong");
    app.post(&author, category_id, &format!("Về {needle}")).await;

    let url = format!("{}&q={}", app.api("posts", "search"), needle);
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, _) = send(app.client().get(app.api("posts", "search"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let url = format!("{}&category_id={}", app.api("posts", "get_by_category"), category_id);
    let (status, body) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let url = format!("{}&category_id=999999", app.api("posts", "get_by_category"));
    let (status, _) = send(app.client().get(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_bulk_update_and_hard_delete() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("bulk").await;
    let a = app.post(&author, category_id, "A").await;
    let b = app.post(&author, category_id, "B").await;

    let (status, _) = send(author.client.post(app.api("posts_admin", "bulk_update")).json(
        &json!({ "ids": [a, b], "action": "hide" }),
    ))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(admin.client.post(app.api("posts_admin", "bulk_update")).json(
        &json!({ "ids": [a, b], "action": "hide" }),
    ))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["affected"], 2);

    let (status, _) = send(admin.client.post(app.api("posts_admin", "bulk_update")).json(
        &json!({ "ids": [a], "action": "explode" }),
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(admin.client.post(app.api("posts_admin", "update_status")).json(
        &json!({ "id": a, "status": "deleted" }),
    ))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, _) = send(admin.client.post(app.api("posts_admin", "update_status")).json(
        &json!({ "id": a, "status": "active" }),
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let url = format!("{}&id={}", app.api("posts_admin", "delete"), b);
    let (status, _) = send(admin.client.delete(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(admin.client.delete(&url)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_delete_rolls_back_on_failure() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let author = app.user("rollback").await;
    let a = app.post(&author, category_id, "Xóa được").await;
    let b = app.post(&author, category_id, "Bị chặn").await;

    let (status, _) = send(author.client.post(app.api("comments", "create")).json(&json!({
        "post_id": b,
        "content": "undeletable",
    })))
    .await;
    assert_eq!(status, StatusCode::CREATED);

    app.exec(
        "CREATE OR REPLACE FUNCTION block_marked_comment_delete() RETURNS trigger AS $$ \
         BEGIN \
           IF OLD.content = 'undeletable' THEN RAISE EXCEPTION 'blocked'; END IF; \
           RETURN OLD; \
         END $$ LANGUAGE plpgsql",
        vec![],
    )
    .await;
    app.exec(
        "DROP TRIGGER IF EXISTS block_marked_comment_delete ON comments",
        vec![],
    )
    .await;
    app.exec(
        "CREATE TRIGGER block_marked_comment_delete BEFORE DELETE ON comments \
         FOR EACH ROW EXECUTE FUNCTION block_marked_comment_delete()",
        vec![],
    )
    .await;

    let (status, body) = send(admin.client.post(app.api("posts_admin", "bulk_update")).json(
        &json!({ "ids": [a, b], "action": "delete" }),
    ))
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);

    let remaining = app
        .scalar(
            "SELECT COUNT(*) FROM posts WHERE id IN ($1, $2)",
            vec![a.into(), b.into()],
        )
        .await;
    assert_eq!(remaining, 2);

    app.exec(
        "DROP TRIGGER IF EXISTS block_marked_comment_delete ON comments",
        vec![],
    )
    .await;
}
