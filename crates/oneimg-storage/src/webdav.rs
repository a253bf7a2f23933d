use crate::error::{StorageError, StorageResult};
use crate::keys;
use bytes::Bytes;
use oneimg_core::WebDavConfig;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "OneIMG/3.0";

/// Collapse duplicate slashes and strip the leading one.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone)]
pub struct WebDavStorage {
    base_url: String,
    user: String,
    password: String,
    client: Client,
}

impl WebDavStorage {
    pub fn new(config: &WebDavConfig) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create WebDAV client: {}", e)))?;

        Ok(WebDavStorage {
            base_url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            client,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, normalize_path(path))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url_for(path));
        if !self.user.is_empty() && !self.password.is_empty() {
            builder.basic_auth(&self.user, Some(&self.password))
        } else {
            builder
        }
    }

    fn method(name: &'static str) -> StorageResult<Method> {
        Method::from_bytes(name.as_bytes())
            .map_err(|e| StorageError::BackendError(format!("Invalid method {}: {}", name, e)))
    }

    /// PROPFIND Depth 0 on a collection.
    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        let response = self
            .request(Self::method("PROPFIND")?, path)
            .header("Depth", "0")
            .send()
            .await
            .map_err(|e| StorageError::BackendError(format!("WebDAV PROPFIND failed: {}", e)))?;

        match response.status() {
            StatusCode::MULTI_STATUS => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::AuthFailed(
                format!("WebDAV PROPFIND {} returned {}", path, response.status()),
            )),
            status => Err(StorageError::BackendError(format!(
                "WebDAV PROPFIND {} returned {}",
                path, status
            ))),
        }
    }

    async fn make_collection(&self, path: &str) -> StorageResult<()> {
        let response = self
            .request(Self::method("MKCOL")?, path)
            .send()
            .await
            .map_err(|e| StorageError::BackendError(format!("WebDAV MKCOL failed: {}", e)))?;

        match response.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT | StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            status => Err(StorageError::UploadFailed(format!(
                "WebDAV MKCOL {} returned {}",
                path, status
            ))),
        }
    }

    /// Create every missing collection along `dir`, outermost first.
    pub async fn ensure_dirs(&self, dir: &str) -> StorageResult<()> {
        let mut current = String::new();
        for segment in normalize_path(dir).split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);

            if !self.exists(&current).await? {
                self.make_collection(&current).await?;
            }
        }
        Ok(())
    }

    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if data.is_empty() {
            return Err(StorageError::UploadFailed(format!(
                "Refusing to upload empty body to {}",
                key
            )));
        }
        let key = normalize_path(key);
        if let Some(dir) = keys::parent_dir(&key) {
            self.ensure_dirs(dir).await?;
        }

        let size = data.len();
        let start = std::time::Instant::now();

        let response = self
            .request(Method::PUT, &key)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("WebDAV PUT failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                key = %key,
                status = status.as_u16(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "WebDAV upload failed"
            );
            return Err(StorageError::UploadFailed(format!(
                "WebDAV PUT {} returned {}",
                key, status
            )));
        }

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "WebDAV upload successful"
        );
        Ok(())
    }

    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let response = self
            .request(Method::GET, key)
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("WebDAV GET failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| StorageError::DownloadFailed(e.to_string())),
            status => Err(StorageError::DownloadFailed(format!(
                "WebDAV GET {} returned {}",
                key, status
            ))),
        }
    }

    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        let response = self
            .request(Method::DELETE, key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(format!("WebDAV DELETE failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status => Err(StorageError::DeleteFailed(format!(
                "WebDAV DELETE {} returned {}",
                key, status
            ))),
        }
    }

    /// Thumbnail first, result ignored; the outcome reflects the primary only.
    pub async fn delete_object(&self, primary_key: &str, thumbnail_key: Option<&str>) -> bool {
        if let Some(thumb) = thumbnail_key {
            if let Err(e) = self.remove(thumb).await {
                tracing::debug!(key = %thumb, error = %e, "WebDAV thumbnail delete failed");
            }
        }

        match self.remove(primary_key).await {
            Ok(()) => {
                tracing::info!(key = %primary_key, "WebDAV delete successful");
                true
            }
            Err(e) => {
                tracing::warn!(key = %primary_key, error = %e, "WebDAV delete failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn storage(url: String, user: &str, password: &str) -> WebDavStorage {
        WebDavStorage::new(&WebDavConfig {
            url,
            user: user.to_string(),
            password: password.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/uploads//2024/03/"), "uploads/2024/03");
        assert_eq!(normalize_path("a.png"), "a.png");
    }

    #[tokio::test]
    async fn test_put_creates_missing_collections() {
        let mut server = Server::new_async().await;
        let root = server
            .mock("PROPFIND", "/dav/uploads")
            .match_header("depth", "0")
            .with_status(207)
            .create_async()
            .await;
        let year_probe = server
            .mock("PROPFIND", "/dav/uploads/2024")
            .with_status(404)
            .create_async()
            .await;
        let year_mkcol = server
            .mock("MKCOL", "/dav/uploads/2024")
            .with_status(201)
            .create_async()
            .await;
        let month_probe = server
            .mock("PROPFIND", "/dav/uploads/2024/03")
            .with_status(404)
            .create_async()
            .await;
        let month_mkcol = server
            .mock("MKCOL", "/dav/uploads/2024/03")
            .with_status(405)
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/dav/uploads/2024/03/a.png")
            .match_header("content-length", "3")
            .match_header("content-type", "image/png")
            .with_status(201)
            .create_async()
            .await;

        let dav = storage(format!("{}/dav/", server.url()), "", "");
        dav.put("uploads/2024/03/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();

        root.assert_async().await;
        year_probe.assert_async().await;
        year_mkcol.assert_async().await;
        month_probe.assert_async().await;
        month_mkcol.assert_async().await;
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth_only_with_both_credentials() {
        let mut server = Server::new_async().await;
        let authed = server
            .mock("PROPFIND", "/uploads")
            .match_header("authorization", "Basic dTpw")
            .with_status(207)
            .create_async()
            .await;

        let dav = storage(server.url(), "u", "p");
        assert!(dav.exists("uploads").await.unwrap());
        authed.assert_async().await;

        let anonymous = server
            .mock("PROPFIND", "/other")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(404)
            .create_async()
            .await;
        let dav = storage(server.url(), "u", "");
        assert!(!dav.exists("other").await.unwrap());
        anonymous.assert_async().await;
    }

    #[tokio::test]
    async fn test_propfind_auth_and_unexpected_status() {
        let mut server = Server::new_async().await;
        server
            .mock("PROPFIND", "/locked")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("PROPFIND", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let dav = storage(server.url(), "", "");
        assert!(matches!(dav.exists("locked").await, Err(StorageError::AuthFailed(_))));
        assert!(matches!(dav.exists("broken").await, Err(StorageError::BackendError(_))));
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let dav = storage("http://127.0.0.1:1".to_string(), "", "");
        let result = dav.put("uploads/a.png", Bytes::new(), "image/png").await;
        assert!(matches!(result, Err(StorageError::UploadFailed(_))));
    }

    #[tokio::test]
    async fn test_delete_reflects_primary_only() {
        let mut server = Server::new_async().await;
        let thumb = server
            .mock("DELETE", "/uploads/2024/03/thumbnails/a.png")
            .with_status(500)
            .create_async()
            .await;
        let primary = server
            .mock("DELETE", "/uploads/2024/03/a.png")
            .with_status(204)
            .create_async()
            .await;

        let dav = storage(server.url(), "", "");
        assert!(
            dav.delete_object("uploads/2024/03/a.png", Some("uploads/2024/03/thumbnails/a.png"))
                .await
        );
        thumb.assert_async().await;
        primary.assert_async().await;

        server
            .mock("DELETE", "/uploads/2024/03/b.png")
            .with_status(403)
            .create_async()
            .await;
        assert!(!dav.delete_object("uploads/2024/03/b.png", None).await);
    }
}
