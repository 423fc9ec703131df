// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the caption server

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-vit-gpt2-captions-2025-10-15";

/// Semantic version number
pub const VERSION_NUMBER: &str = "0.1.0";

/// Build date
pub const BUILD_DATE: &str = "2025-10-15";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "multipart-upload",
    "json-captions",
    "beam-search",
    "multiple-candidates",
    "explicit-device",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Caption Server {} ({})", VERSION_NUMBER, BUILD_DATE)
}
