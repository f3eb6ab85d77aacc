//! Wire types for the student portal's JSON API.
//!
//! Field names follow the portal's own (Vietnamese) JSON keys so payloads
//! deserialize directly and re-serialize unchanged in our API responses.

use serde::{Deserialize, Serialize};

/// One section (lớp học phần) of a course as listed by the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSection {
    pub id: String,
    #[serde(rename = "maLop", default)]
    pub class_code: String,
    #[serde(rename = "tenMonHoc", default)]
    pub course_name: String,
    /// Whether the portal currently accepts registrations for this section.
    #[serde(rename = "choDangKy")]
    pub open_for_registration: bool,
    /// Fill percentage reported by the portal.
    #[serde(rename = "phanTramDangKy", default)]
    pub percent_registered: f64,
    #[serde(rename = "thoiKhoaBieu", default)]
    pub schedule_text: Option<String>,
    #[serde(rename = "soLuongDaDangKy", default)]
    pub seats_taken: Option<i64>,
    #[serde(rename = "soLuongToiDa", default)]
    pub seats_total: Option<i64>,
}

/// A class the student is already registered for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClass {
    #[serde(rename = "idDangKy")]
    pub registration_id: String,
    #[serde(rename = "maLop", default)]
    pub class_code: String,
    #[serde(rename = "tenMonHoc", default)]
    pub course_name: String,
    #[serde(rename = "thoiKhoaBieu", default)]
    pub schedule_text: Option<String>,
}

/// Result of a registration or cancellation attempt. The portal signals
/// refusal (full section, deadline passed, duplicate) as `success = false`
/// with a human-readable message rather than an HTTP error.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub success: bool,
    pub message: String,
}

/// Result of a successful portal login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: String,
    pub student_code: String,
}

#[derive(Debug, Serialize)]
pub(super) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "accessToken", default)]
    pub access_token: Option<String>,
    #[serde(rename = "maSinhVien", default)]
    pub student_code: Option<String>,
}

/// The portal wraps most payloads in a `{success, message, data}` envelope.
#[derive(Debug, Deserialize)]
pub(super) struct PortalEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}
