// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Upload page tests for GET / and POST /
//!
//! These tests verify that the page handler:
//! - Serves the multipart upload form
//! - Lists one caption per image in upload order
//! - Renders an empty list (never an HTTP error) when captioning fails
//! - Agrees with the JSON endpoint for the same images

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use caption_server::api::{
    caption::CaptionResponse,
    http_server::{create_router, AppState, ServerSettings},
};
use tower::ServiceExt;

use crate::common::{expected_caption, failing_generator, png_bytes, stub_generator, BRIGHT, DARK};

const BOUNDARY: &str = "caption-test-boundary";

enum Part<'a> {
    File(&'a [u8]),
    /// File input submitted with nothing selected
    NoFile,
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"images\"; filename=\"img{}.png\"\r\n\
                         Content-Type: image/png\r\n\r\n",
                        i
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::NoFile => {
                body.extend_from_slice(
                    b"Content-Disposition: form-data; name=\"images\"; filename=\"\"\r\n\
                      Content-Type: application/octet-stream\r\n\r\n",
                );
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn post_form(app: Router, parts: &[Part<'_>]) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn list_item(caption: &str) -> String {
    format!("<li>{}</li>", ammonia::clean_text(caption))
}

fn stub_app() -> Router {
    create_router(AppState::new(stub_generator(), ServerSettings::default()))
}

#[cfg(test)]
mod upload_page_tests {
    use super::*;

    /// Test 1: GET / serves the upload form without captions
    #[tokio::test]
    async fn test_index_serves_form() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = stub_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains(r#"enctype="multipart/form-data""#));
        assert!(html.contains(r#"type="file" name="images""#));
        assert!(html.contains("multiple"));
        assert!(!html.contains("<li>"));
    }

    /// Test 2: Two uploads give two captions in upload order
    #[tokio::test]
    async fn test_upload_two_images() {
        let dark = png_bytes(10);
        let bright = png_bytes(245);
        let (status, html) = post_form(stub_app(), &[Part::File(&dark), Part::File(&bright)]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(html.matches("<li>").count(), 2);

        let first = html.find(&list_item(&expected_caption(DARK, 0))).unwrap();
        let second = html.find(&list_item(&expected_caption(BRIGHT, 0))).unwrap();
        assert!(first < second);
    }

    /// Test 3: Candidates field expands captions per image
    #[tokio::test]
    async fn test_upload_with_candidates() {
        let dark = png_bytes(10);
        let bright = png_bytes(245);
        let (status, html) = post_form(
            stub_app(),
            &[
                Part::File(&dark),
                Part::File(&bright),
                Part::Text("candidates", "2"),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(html.matches("<li>").count(), 4);
        assert!(html.contains(&list_item(&expected_caption(DARK, 1))));
        assert!(html.contains(&list_item(&expected_caption(BRIGHT, 1))));
    }

    /// Test 4: Submitting with no file chosen renders an empty list
    #[tokio::test]
    async fn test_no_file_chosen() {
        let settings = ServerSettings {
            show_errors: true,
            ..Default::default()
        };
        let app = create_router(AppState::new(stub_generator(), settings));
        let (status, html) = post_form(app, &[Part::NoFile]).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("<li>"));
        // Nothing was uploaded, so nothing failed
        assert!(!html.contains(r#"class="notice""#));
    }

    /// Test 5: A zero-byte file among valid ones fails the whole batch
    #[tokio::test]
    async fn test_zero_byte_named_file_fails_batch() {
        let settings = ServerSettings {
            show_errors: true,
            ..Default::default()
        };
        let app = create_router(AppState::new(stub_generator(), settings));
        let good = png_bytes(10);
        let (status, html) = post_form(app, &[Part::File(&good), Part::File(b"")]).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("<li>"));
        assert!(html.contains(r#"class="notice""#));
    }

    /// Test 6: No file chosen alongside a real upload is ignored
    #[tokio::test]
    async fn test_no_file_chosen_beside_upload() {
        let good = png_bytes(240);
        let (status, html) = post_form(stub_app(), &[Part::NoFile, Part::File(&good)]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(html.matches("<li>").count(), 1);
        assert!(html.contains(&list_item(&expected_caption(BRIGHT, 0))));
    }

    /// Test 7: Corrupt upload renders the page with no captions
    #[tokio::test]
    async fn test_corrupt_upload_silent() {
        let good = png_bytes(10);
        let (status, html) =
            post_form(stub_app(), &[Part::File(&good), Part::File(b"garbage bytes")]).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("<li>"));
        assert!(!html.contains(r#"class="notice""#));
    }

    /// Test 8: show_errors adds a notice on failure
    #[tokio::test]
    async fn test_failure_notice_when_enabled() {
        let settings = ServerSettings {
            show_errors: true,
            ..Default::default()
        };
        let app = create_router(AppState::new(failing_generator(), settings));
        let image = png_bytes(10);
        let (status, html) = post_form(app, &[Part::File(&image)]).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("<li>"));
        assert!(html.contains(r#"class="notice""#));
    }

    /// Test 9: Out-of-range candidates render an empty list
    #[tokio::test]
    async fn test_invalid_candidates_silent() {
        let image = png_bytes(10);
        let (status, html) =
            post_form(stub_app(), &[Part::File(&image), Part::Text("candidates", "9")]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("<li>"));
    }

    /// Test 10: Page captions match the JSON endpoint for the same images
    #[tokio::test]
    async fn test_page_matches_json_endpoint() {
        let images = [png_bytes(3), png_bytes(200), png_bytes(90)];

        let (_, html) = post_form(
            stub_app(),
            &[
                Part::File(&images[0]),
                Part::File(&images[1]),
                Part::File(&images[2]),
            ],
        )
        .await;

        let payload = serde_json::json!({
            "images": images.iter().map(|b| STANDARD.encode(b)).collect::<Vec<_>>(),
        });
        let request = Request::builder()
            .method("POST")
            .uri("/v1/captions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = stub_app().oneshot(request).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: CaptionResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json.captions.len(), 3);
        let mut last = 0;
        for caption in &json.captions {
            let pos = html[last..].find(&list_item(caption)).unwrap() + last;
            last = pos + 1;
        }
    }
}
