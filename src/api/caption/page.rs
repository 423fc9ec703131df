// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload page rendering

use super::request::{CANDIDATES_FIELD, IMAGES_FIELD};

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Image Captioner</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 720px; margin: 40px auto; padding: 0 20px; color: #333; }
        form { border: 2px dashed #667eea; border-radius: 12px; padding: 24px; background: #f8f9ff; }
        .captions li { margin: 6px 0; }
        .notice { color: #b00020; }
    </style>
</head>
<body>
    <h1>Image Captioner</h1>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";

/// Render the upload form followed by any captions
///
/// Caption and notice text is HTML-escaped.
pub fn render_page(captions: &[String], notice: Option<&str>, max_candidates: usize) -> String {
    let mut html = String::with_capacity(PAGE_HEAD.len() + 512);
    html.push_str(PAGE_HEAD);

    html.push_str(&format!(
        r#"    <form method="post" action="/" enctype="multipart/form-data">
        <input type="file" name="{images}" accept="image/*" multiple>
        <label>Captions per image
            <input type="number" name="{candidates}" value="1" min="1" max="{max}">
        </label>
        <button type="submit">Caption</button>
    </form>
"#,
        images = IMAGES_FIELD,
        candidates = CANDIDATES_FIELD,
        max = max_candidates
    ));

    if let Some(notice) = notice {
        html.push_str(&format!(
            "    <p class=\"notice\">{}</p>\n",
            ammonia::clean_text(notice)
        ));
    }

    if !captions.is_empty() {
        html.push_str("    <ul class=\"captions\">\n");
        for caption in captions {
            html.push_str(&format!("        <li>{}</li>\n", ammonia::clean_text(caption)));
        }
        html.push_str("    </ul>\n");
    }

    html.push_str(PAGE_TAIL);
    html
}
