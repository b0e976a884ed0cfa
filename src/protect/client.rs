//! Protect HTTP client

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{CameraSource, CaptureError, DiscoveryError, SnapshotClient};
use crate::config::defaults::MIN_SNAPSHOT_BYTES;
use crate::config::ProtectConfig;
use crate::types::{Camera, CameraId, Quality};

const USER_AGENT: &str = concat!("camlapse/", env!("CARGO_PKG_VERSION"));

/// Camera entry in `GET /cameras`. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCamera {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    feature_flags: ApiFeatureFlags,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFeatureFlags {
    #[serde(default)]
    support_full_hd_snapshot: bool,
}

impl From<ApiCamera> for Camera {
    fn from(c: ApiCamera) -> Self {
        let name = if c.name.is_empty() { c.id.clone() } else { c.name };
        Camera {
            id: CameraId::new(name),
            api_id: c.id,
            connected: c.state == "CONNECTED",
            supports_full_hd: c.feature_flags.support_full_hd_snapshot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// reqwest client bound to one console.
#[derive(Debug, Clone)]
pub struct ProtectClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ProtectClient {
    pub fn new(config: &ProtectConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .pool_max_idle_per_host(20)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_request_error(e: &reqwest::Error) -> CaptureError {
    if e.is_timeout() {
        CaptureError::Timeout
    } else {
        CaptureError::Connection(e.to_string())
    }
}

#[async_trait]
impl SnapshotClient for ProtectClient {
    async fn capture(&self, camera: &Camera, quality: Quality) -> Result<Vec<u8>, CaptureError> {
        let mut req = self
            .http
            .get(format!("{}/cameras/{}/snapshot", self.base_url, camera.api_id))
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "image/*");
        if quality == Quality::High {
            req = req.query(&[("highQuality", "true")]);
        }

        let resp = req.send().await.map_err(|e| map_request_error(&e))?;
        let status = resp.status();

        if !status.is_success() {
            if quality == Quality::High
                && matches!(
                    status,
                    reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::UNPROCESSABLE_ENTITY
                )
            {
                return Err(CaptureError::UnsupportedQuality(quality));
            }
            let message = resp
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(CaptureError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(CaptureError::InvalidImage(format!(
                "content type '{content_type}'"
            )));
        }

        let bytes = resp.bytes().await.map_err(|e| map_request_error(&e))?;
        if bytes.len() < MIN_SNAPSHOT_BYTES {
            return Err(CaptureError::InvalidImage(format!(
                "{} bytes",
                bytes.len()
            )));
        }

        debug!(camera = %camera.id, %quality, bytes = bytes.len(), "Snapshot received");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl CameraSource for ProtectClient {
    async fn discover(&self) -> Result<Vec<Camera>, DiscoveryError> {
        let resp = self
            .http
            .get(format!("{}/cameras", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(DiscoveryError::Status(resp.status()));
        }

        let body = resp.text().await?;
        parse_camera_list(&body)
    }
}

fn parse_camera_list(body: &str) -> Result<Vec<Camera>, DiscoveryError> {
    let cameras: Vec<ApiCamera> =
        serde_json::from_str(body).map_err(|e| DiscoveryError::Payload(e.to_string()))?;
    Ok(cameras.into_iter().map(Camera::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camera_list() {
        let body = r#"[
            {"id": "65a1", "name": "Front Door", "state": "CONNECTED",
             "featureFlags": {"supportFullHdSnapshot": true}, "type": "UVC G4 Pro"},
            {"id": "65a2", "name": "Garage", "state": "DISCONNECTED"}
        ]"#;
        let cams = parse_camera_list(body).unwrap();
        assert_eq!(cams.len(), 2);
        assert_eq!(cams[0].id, CameraId::new("Front Door"));
        assert_eq!(cams[0].api_id, "65a1");
        assert!(cams[0].connected);
        assert!(cams[0].supports_full_hd);
        assert!(!cams[1].connected);
        assert!(!cams[1].supports_full_hd);
    }

    #[test]
    fn test_bad_payload() {
        assert!(matches!(
            parse_camera_list("{\"error\": 1}"),
            Err(DiscoveryError::Payload(_))
        ));
    }

    #[test]
    fn test_client_builds() {
        let client = ProtectClient::new(&ProtectConfig::default()).unwrap();
        assert!(client.base_url().starts_with("https://unifi.local:443/"));
    }
}
