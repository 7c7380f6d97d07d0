//! Backblaze B2 storage backend.
//!
//! Talks to the B2 native API. The account is authorized once at construction
//! (`b2_authorize_account`); each upload then acquires a one-shot upload URL
//! (`b2_get_upload_url`) and POSTs the bytes to it. Deletion resolves the
//! file id via `b2_list_file_names` before calling `b2_delete_file_version`.
//!
//! Public object URLs are `{endpoint}/{bucket_name}/{key}`.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{ObjectStorage, PutObject, Result, StorageError, StoredObject};
use crate::config::B2Config;

const AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

#[derive(Debug)]
pub struct B2Storage {
    http: reqwest::Client,
    config: B2Config,
    /// Account-scoped API base URL and token from `b2_authorize_account`.
    api_url: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    api_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileVersion {
    file_id: String,
    file_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesResponse {
    files: Vec<FileVersion>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    code: Option<String>,
}

async fn error_from_response(response: reqwest::Response) -> StorageError {
    let status = response.status();
    let payload: ErrorResponse = response.json().await.unwrap_or_default();
    let message = payload
        .message
        .or(payload.code)
        .unwrap_or_else(|| "unknown storage error".to_string());
    StorageError::Provider {
        status: status.as_u16(),
        message,
    }
}

impl B2Storage {
    /// Authorize the account and return a ready-to-use backend.
    pub async fn connect(config: B2Config) -> Result<Self> {
        Self::connect_with_authorize_url(config, AUTHORIZE_URL).await
    }

    async fn connect_with_authorize_url(config: B2Config, authorize_url: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let response = http
            .get(authorize_url)
            .basic_auth(&config.key_id, Some(&config.application_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let auth: AuthorizeResponse = response.json().await?;
        tracing::info!("Backblaze B2 authorized successfully");

        Ok(Self {
            http,
            config,
            api_url: auth.api_url,
            auth_token: auth.authorization_token,
        })
    }

    fn api_endpoint(&self, operation: &str) -> String {
        format!("{}/b2api/v2/{}", self.api_url, operation)
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint.as_str().trim_end_matches('/'),
            self.config.bucket_name,
            key
        )
    }

    /// Resolve the most recent file version for a key, if any.
    async fn find_file_version(&self, key: &str) -> Result<Option<FileVersion>> {
        let response = self
            .http
            .post(self.api_endpoint("b2_list_file_names"))
            .header("Authorization", &self.auth_token)
            .json(&json!({
                "bucketId": self.config.bucket_id,
                "startFileName": key,
                "maxFileCount": 1,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let listing: ListFileNamesResponse = response.json().await?;
        Ok(listing.files.into_iter().find(|f| f.file_name == key))
    }
}

#[async_trait::async_trait]
impl ObjectStorage for B2Storage {
    #[instrument(skip_all, fields(key = %object.key, size = object.data.len()))]
    async fn put(&self, object: PutObject) -> Result<StoredObject> {
        // One-shot upload URL with its own auth token.
        let response = self
            .http
            .post(self.api_endpoint("b2_get_upload_url"))
            .header("Authorization", &self.auth_token)
            .json(&json!({ "bucketId": self.config.bucket_id }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let upload: UploadUrlResponse = response.json().await?;

        let response = self
            .http
            .post(&upload.upload_url)
            .header("Authorization", &upload.authorization_token)
            .header("X-Bz-File-Name", urlencoding::encode(&object.key).as_ref())
            .header("X-Bz-Content-Sha1", "do_not_verify")
            .header("Content-Type", &object.content_type)
            .header("Content-Length", object.data.len())
            .body(object.data.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(StoredObject {
            url: self.public_url(&object.key),
        })
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> Result<()> {
        let version = self
            .find_file_version(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let response = self
            .http
            .post(self.api_endpoint("b2_delete_file_version"))
            .header("Authorization", &self.auth_token)
            .json(&json!({
                "fileId": version.file_id,
                "fileName": version.file_name,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = error_from_response(response).await;
            if let StorageError::Provider { status, .. } = err
                && status == StatusCode::NOT_FOUND.as_u16()
            {
                return Err(StorageError::NotFound(key.to_string()));
            }
            return Err(err);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.find_file_version(key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> B2Config {
        B2Config {
            key_id: "key-id".to_string(),
            application_key: "app-key".to_string(),
            bucket_id: "bucket-id".to_string(),
            bucket_name: "snapvault-images".to_string(),
            endpoint: Url::parse("https://f000.backblazeb2.com/file").unwrap(),
        }
    }

    async fn mock_authorize(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/b2api/v2/b2_authorize_account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "apiUrl": server.uri(),
                "authorizationToken": "account-token",
                "downloadUrl": server.uri(),
            })))
            .mount(server)
            .await;
    }

    async fn storage(server: &MockServer) -> B2Storage {
        B2Storage::connect_with_authorize_url(
            config(),
            &format!("{}/b2api/v2/b2_authorize_account", server.uri()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_uploads_and_builds_public_url() {
        let server = MockServer::start().await;
        mock_authorize(&server).await;

        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_get_upload_url"))
            .and(header("Authorization", "account-token"))
            .and(body_partial_json(serde_json::json!({ "bucketId": "bucket-id" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uploadUrl": format!("{}/upload-endpoint", server.uri()),
                "authorizationToken": "upload-token",
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload-endpoint"))
            .and(header("Authorization", "upload-token"))
            .and(header("X-Bz-File-Name", "user_1_42.png"))
            .and(header("Content-Type", "image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fileId": "file-1",
                "fileName": "user_1_42.png",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stored = storage(&server)
            .await
            .put(PutObject {
                key: "user_1_42.png".to_string(),
                content_type: "image/png".to_string(),
                data: bytes::Bytes::from_static(b"0123456789"),
            })
            .await
            .unwrap();

        assert_eq!(
            stored.url,
            "https://f000.backblazeb2.com/file/snapvault-images/user_1_42.png"
        );
    }

    #[tokio::test]
    async fn test_delete_resolves_file_id_first() {
        let server = MockServer::start().await;
        mock_authorize(&server).await;

        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_list_file_names"))
            .and(body_partial_json(
                serde_json::json!({ "startFileName": "user_1_42.png", "maxFileCount": 1 }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "fileId": "file-1", "fileName": "user_1_42.png" }],
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_delete_file_version"))
            .and(body_partial_json(
                serde_json::json!({ "fileId": "file-1", "fileName": "user_1_42.png" }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fileId": "file-1", "fileName": "user_1_42.png",
            })))
            .expect(1)
            .mount(&server)
            .await;

        storage(&server).await.delete("user_1_42.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_not_found() {
        let server = MockServer::start().await;
        mock_authorize(&server).await;

        // Listing returns a different (lexicographically later) file.
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_list_file_names"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "fileId": "file-2", "fileName": "user_9_99.png" }],
            })))
            .mount(&server)
            .await;

        let err = storage(&server).await.delete("user_1_42.png").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_authorization_surfaces_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b2api/v2/b2_authorize_account"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "code": "unauthorized",
                "message": "Invalid application key",
                "status": 401,
            })))
            .mount(&server)
            .await;

        let err = B2Storage::connect_with_authorize_url(
            config(),
            &format!("{}/b2api/v2/b2_authorize_account", server.uri()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StorageError::Provider { status: 401, .. }));
    }
}
