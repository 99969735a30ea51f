use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;

use crate::error::AppError;

/// Client for the external image host. Uploads go out as an unsigned
/// form post carrying the image as a base64 data URI; the host answers
/// with the public HTTPS URL of the stored asset.
pub struct ImageHost {
    client: reqwest::Client,
    base_url: String,
    upload_preset: String,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl ImageHost {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        upload_preset: String,
        folder: String,
    ) -> Self {
        Self { client, base_url, upload_preset, folder }
    }

    pub async fn upload(&self, bytes: &[u8], public_id: &str) -> Result<String, AppError> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::Upload("image host is not configured".to_string()));
        }

        let url = format!("{}/image/upload", self.base_url.trim_end_matches('/'));
        let data_uri = format!("data:image/jpeg;base64,{}", BASE64.encode(bytes));

        let resp = self
            .client
            .post(url)
            .form(&[
                ("file", data_uri.as_str()),
                ("upload_preset", self.upload_preset.as_str()),
                ("folder", self.folder.as_str()),
                ("public_id", public_id),
                ("overwrite", "true"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::Upload(format!("image host returned {}", resp.status())));
        }

        let body: UploadResponse =
            resp.json().await.map_err(|e| AppError::Upload(e.to_string()))?;

        tracing::debug!(public_id = %public_id, url = %body.secure_url, "image uploaded");
        Ok(body.secure_url)
    }
}

/// Decodes an inline image payload, tolerating an optional data-URI prefix.
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, AppError> {
    let raw = payload.split_once(";base64,").map(|(_, data)| data).unwrap_or(payload);
    BASE64
        .decode(raw.trim())
        .map_err(|_| AppError::Validation("image payload is not valid base64".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_base64() {
        assert_eq!(decode_base64_image("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn strips_data_uri_prefix() {
        assert_eq!(decode_base64_image("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(matches!(
            decode_base64_image("!!not base64!!"),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_host_surfaces_upload_error() {
        let host = ImageHost::new(
            reqwest::Client::new(),
            String::new(),
            String::new(),
            "covers".to_string(),
        );
        assert!(matches!(host.upload(b"bytes", "cover-1").await, Err(AppError::Upload(_))));
    }
}
