use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use heritage_media_optimizer::server::{create_routes, AppState};
use heritage_media_optimizer::{Config, UploadCategory};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "media-optimizer-test-boundary";

fn app(root: &Path) -> Router {
    let config = Config {
        uploads_root: root.to_path_buf(),
        categories: vec![
            UploadCategory::new("events", true),
            UploadCategory::new("figures", true),
        ],
        workers: 2,
        ..Default::default()
    };
    create_routes(AppState::new(config))
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

fn multipart_body(filename: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn optimize_endpoint_reports_every_category() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("events")).unwrap();
    std::fs::write(root.join("events/a.png"), png_bytes(64, 48)).unwrap();

    let response = app(root)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/images/optimize")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["summary"]["totalProcessed"], 1);
    assert_eq!(json["summary"]["totalFailed"], 0);
    assert_eq!(json["details"][0]["directory"], "events");
    assert_eq!(json["details"][0]["processed"], 1);
    assert_eq!(json["details"][1]["directory"], "figures");
    assert_eq!(json["details"][1]["skipped"], true);

    assert!(root.join("events/a.webp").exists());
    assert!(!root.join("events/a.png").exists());
}

#[tokio::test]
async fn stats_endpoint_counts_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("events/2024")).unwrap();
    std::fs::write(root.join("events/a.jpg"), vec![0u8; 2048]).unwrap();
    std::fs::write(root.join("events/2024/b.pdf"), vec![0u8; 1024]).unwrap();

    let response = app(root)
        .oneshot(
            Request::builder()
                .uri("/admin/images/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["summary"]["totalDirectories"], 1);
    assert_eq!(json["summary"]["totalFiles"], 2);
    assert_eq!(json["summary"]["totalBytes"], 3072);
    assert_eq!(json["summary"]["totalSizeHuman"], "3 KB");
    assert_eq!(json["details"][1]["exists"], false);

    // stats never modify the tree
    assert!(root.join("events/a.jpg").exists());
}

#[tokio::test]
async fn upload_endpoint_optimizes_saved_images() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    let response = app(root)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/uploads/figures")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body("portrait.png", "image/png", &png_bytes(40, 40))))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);

    let file = &json["files"][0];
    assert_eq!(file["filename"], "portrait.webp");
    assert_eq!(file["url"], "/uploads/figures/portrait.webp");
    assert_eq!(file["imageInfo"]["filename"], "portrait.webp");

    let optimized = root.join("figures/portrait.webp");
    assert!(optimized.exists());
    assert!(!root.join("figures/portrait.png").exists());
    assert_eq!(file["size"], std::fs::metadata(&optimized).unwrap().len());
}

#[tokio::test]
async fn upload_endpoint_keeps_non_images() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    let response = app(root)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/uploads/events")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body("program.pdf", "application/pdf", b"%PDF-1.4")))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["files"][0]["filename"], "program.pdf");
    assert!(json["files"][0]["imageInfo"].is_null());
    assert_eq!(std::fs::read(root.join("events/program.pdf")).unwrap(), b"%PDF-1.4");
}

#[tokio::test]
async fn upload_to_unknown_category_is_not_found() {
    let temp_dir = TempDir::new().unwrap();

    let response = app(temp_dir.path())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/uploads/secrets")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body("a.png", "image/png", &png_bytes(8, 8))))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(!temp_dir.path().join("secrets").exists());
}

async fn post_upload(app: Router, category: &str, body: Vec<u8>) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(format!("/admin/uploads/{}", category))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn repeated_upload_name_keeps_both_images() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    let first = post_upload(app(root), "figures", multipart_body("portrait.png", "image/png", &png_bytes(40, 40))).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = json_body(first).await;
    let first_bytes = std::fs::read(root.join("figures/portrait.webp")).unwrap();

    let second = post_upload(app(root), "figures", multipart_body("portrait.png", "image/png", &png_bytes(64, 32))).await;
    assert_eq!(second.status(), StatusCode::CREATED);
    let second = json_body(second).await;

    assert_eq!(first["files"][0]["filename"], "portrait.webp");
    assert_eq!(second["files"][0]["filename"], "portrait-1.webp");
    assert_eq!(second["files"][0]["url"], "/uploads/figures/portrait-1.webp");
    assert_eq!(std::fs::read(root.join("figures/portrait.webp")).unwrap(), first_bytes);
    assert_eq!(
        image::image_dimensions(root.join("figures/portrait-1.webp")).unwrap(),
        (64, 32)
    );
}

#[tokio::test]
async fn malformed_upload_leaves_no_files_behind() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"files\"; filename=\"a.pdf\"\r\n");
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n%PDF-1.4\r\n");
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"files\"; filename=\"b.png\"\r\n");
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\ntruncated without a closing boundary");

    let response = post_upload(app(root), "events", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    let leftovers = std::fs::read_dir(root.join("events")).unwrap().count();
    assert_eq!(leftovers, 0);
}
