mod common;

use common::send;
use reqwest::StatusCode;

#[tokio::test]
async fn health_check_reports_database() {
    let app = common::spawn_app().await;
    let (status, body) = send(app.client().get(format!("{}/", app.addr))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "agora");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn dashboard_counts_and_series() {
    let app = common::spawn_app().await;
    let admin = app.admin().await;
    let category_id = app.category(&admin).await;
    let writer = app.user("columnist").await;
    app.post(&writer, category_id, "Thống kê").await;

    let (status, body) = send(admin.client.get(app.api("dashboard", "stats"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["data"]["total_users"].as_i64().unwrap() >= 2);
    assert!(body["data"]["active_posts"].as_i64().unwrap() >= 1);

    let url = format!("{}&days=3", app.api("dashboard", "activity_chart"));
    let (status, body) = send(admin.client.get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    let points = body["data"].as_array().unwrap();
    assert_eq!(points.len(), 3);
    assert!(points[2]["posts"].as_i64().unwrap() >= 1);

    let url = format!("{}&days=0", app.api("dashboard", "user_growth"));
    let (_, body) = send(admin.client.get(&url)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let url = format!("{}&limit=50", app.api("dashboard", "recent_activity"));
    let (status, body) = send(admin.client.get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["kind"] == "post" && item["user_id"] == writer.id));

    let url = format!("{}&limit=1", app.api("dashboard", "top_categories"));
    let (_, body) = send(admin.client.get(&url)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(admin.client.get(app.api("dashboard", "system_info"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["database_version"]
        .as_str()
        .unwrap()
        .contains("PostgreSQL"));

    let (status, _) = send(admin.client.get(app.api("dashboard", "reports"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(writer.client.get(app.api("dashboard", "reports"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
