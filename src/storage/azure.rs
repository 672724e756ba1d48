//! Azure Blob Storage backend.
//!
//! Talks to a single Azure container through the Blob REST API using
//! `reqwest`.  Requests are authorized with Shared Key signatures derived
//! from the storage account key; read grants handed to clients are
//! Service SAS tokens signed with the same key.
//!
//! Credentials come from a standard Azure connection string:
//!   - `DefaultEndpointsProtocol=https;AccountName=..;AccountKey=..;EndpointSuffix=..`
//!   - `AccountName=..;AccountKey=..;BlobEndpoint=https://..`
//!   - `UseDevelopmentStorage=true` (Azurite emulator)

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use reqwest::StatusCode;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{BackendFuture, BlobBackend};

type HmacSha256 = Hmac<Sha256>;

/// Azure REST API version used for all requests.
const AZURE_API_VERSION: &str = "2023-11-03";

/// Signed version stamped into generated SAS tokens.
const SAS_VERSION: &str = "2021-06-08";

/// Account name of the Azurite emulator.
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known, public account key of the Azurite emulator.
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Blob endpoint of the Azurite emulator.
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Percent-encoding set for Azure blob names: encode everything except
/// unreserved characters and '/'.
const AZURE_BLOB_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encoding set for SAS query parameter values.
const SAS_VALUE_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// -- Connection string --------------------------------------------------------

/// Parsed Azure storage connection string.
#[derive(Clone)]
pub struct AzureConnection {
    /// Storage account name.
    pub account: String,
    /// Decoded account key used for Shared Key and SAS signatures.
    key_bytes: Vec<u8>,
    /// Blob service endpoint without a trailing slash.
    pub blob_endpoint: String,
}

impl std::fmt::Debug for AzureConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureConnection")
            .field("account", &self.account)
            .field("blob_endpoint", &self.blob_endpoint)
            .finish_non_exhaustive()
    }
}

impl AzureConnection {
    /// Parse a `key=value;key=value` Azure connection string.
    pub fn parse(connection_string: &str) -> anyhow::Result<Self> {
        let mut account = None;
        let mut account_key = None;
        let mut blob_endpoint = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();

        for part in connection_string.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            // split_once keeps the base64 '=' padding inside the value.
            let Some((key, value)) = part.split_once('=') else {
                anyhow::bail!("Malformed connection string segment: '{}'", part);
            };
            match key {
                "UseDevelopmentStorage" if value.eq_ignore_ascii_case("true") => {
                    return Self::development();
                }
                "AccountName" => account = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => suffix = value.to_string(),
                _ => {}
            }
        }

        let account =
            account.ok_or_else(|| anyhow::anyhow!("Connection string is missing AccountName"))?;
        let account_key = account_key.ok_or_else(|| {
            anyhow::anyhow!("Connection string is missing AccountKey (required to sign SAS URLs)")
        })?;
        let key_bytes = BASE64_STANDARD
            .decode(&account_key)
            .map_err(|e| anyhow::anyhow!("Invalid AccountKey in connection string: {}", e))?;
        let blob_endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account, suffix));

        Ok(Self {
            account,
            key_bytes,
            blob_endpoint,
        })
    }

    /// Connection to the local Azurite emulator.
    fn development() -> anyhow::Result<Self> {
        Ok(Self {
            account: DEV_ACCOUNT_NAME.to_string(),
            key_bytes: BASE64_STANDARD.decode(DEV_ACCOUNT_KEY)?,
            blob_endpoint: DEV_BLOB_ENDPOINT.to_string(),
        })
    }
}

// -- Backend ------------------------------------------------------------------

/// Blob backend bound to one Azure container.
pub struct AzureBlobBackend {
    /// HTTP client for Azure Blob REST API calls.
    client: reqwest::Client,
    /// The Azure container name.
    container: String,
    /// Parsed account credentials and endpoint.
    connection: AzureConnection,
    /// Path component of the endpoint (non-empty for path-style endpoints
    /// such as Azurite), prepended to canonicalized resources.
    endpoint_path: String,
}

impl AzureBlobBackend {
    /// Create a backend for `container` using the given connection.
    pub fn new(
        connection: AzureConnection,
        container: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let endpoint = reqwest::Url::parse(&connection.blob_endpoint).map_err(|e| {
            anyhow::anyhow!("Invalid blob endpoint '{}': {}", connection.blob_endpoint, e)
        })?;
        let endpoint_path = endpoint.path().trim_end_matches('/').to_string();

        info!(
            "Azure blob backend configured: account={} container={} endpoint={}",
            connection.account, container, connection.blob_endpoint
        );

        Ok(Self {
            client,
            container,
            connection,
            endpoint_path,
        })
    }

    /// Shorthand for parsing a connection string and building the backend.
    pub fn from_connection_string(
        connection_string: &str,
        container: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Self::new(AzureConnection::parse(connection_string)?, container, timeout)
    }

    /// URL of the container itself.
    fn container_url(&self) -> String {
        format!("{}/{}", self.connection.blob_endpoint, self.container)
    }

    /// Compute the base64 MD5 digest sent as `Content-MD5`.
    fn content_md5(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        BASE64_STANDARD.encode(hasher.finalize())
    }

    /// Get the current UTC date in RFC 1123 format for Azure headers.
    fn rfc1123_date() -> String {
        httpdate::fmt_http_date(std::time::SystemTime::now())
    }

    /// HMAC-SHA256 `payload` with the account key, base64 encoded.
    fn hmac_base64(&self, payload: &str) -> anyhow::Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.connection.key_bytes)
            .map_err(|e| anyhow::anyhow!("HMAC key error: {}", e))?;
        mac.update(payload.as_bytes());
        Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Build the Shared Key string-to-sign.
    ///
    /// `resource` is the container-relative path (`container` or
    /// `container/blob`), un-encoded.
    ///
    /// ```text
    /// VERB\n Content-Encoding\n Content-Language\n Content-Length\n
    /// Content-MD5\n Content-Type\n Date\n If-Modified-Since\n If-Match\n
    /// If-None-Match\n If-Unmodified-Since\n Range\n
    /// CanonicalizedHeaders\n CanonicalizedResource
    /// ```
    #[allow(clippy::too_many_arguments)]
    fn string_to_sign(
        &self,
        method: &str,
        resource: &str,
        content_length: Option<usize>,
        content_md5: &str,
        content_type: &str,
        date: &str,
        extra_headers: &[(String, String)],
        query_params: &[(String, String)],
    ) -> String {
        // Content-Length: empty for 0 or if not provided (GET/DELETE/HEAD).
        let content_length_str = match content_length {
            Some(0) | None => String::new(),
            Some(len) => len.to_string(),
        };

        let mut ms_headers: Vec<(String, String)> = vec![
            ("x-ms-date".to_string(), date.to_string()),
            ("x-ms-version".to_string(), AZURE_API_VERSION.to_string()),
        ];
        for (k, v) in extra_headers {
            let lk = k.to_lowercase();
            if lk.starts_with("x-ms-") && lk != "x-ms-date" && lk != "x-ms-version" {
                ms_headers.push((lk, v.clone()));
            }
        }
        ms_headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonicalized_headers = ms_headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let mut canonicalized_resource = format!(
            "/{}{}/{}",
            self.connection.account, self.endpoint_path, resource
        );
        let mut sorted_params = query_params.to_vec();
        sorted_params.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in &sorted_params {
            canonicalized_resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
        }

        format!(
            "{}\n\n\n{}\n{}\n{}\n\n\n\n\n\n\n{}\n{}",
            method,
            content_length_str,
            content_md5,
            content_type,
            canonicalized_headers,
            canonicalized_resource
        )
    }

    /// Sign a request and return the `Authorization` header value:
    /// `SharedKey {account}:{signature}`.
    #[allow(clippy::too_many_arguments)]
    fn sign_request(
        &self,
        method: &str,
        resource: &str,
        content_length: Option<usize>,
        content_md5: &str,
        content_type: &str,
        date: &str,
        extra_headers: &[(String, String)],
        query_params: &[(String, String)],
    ) -> anyhow::Result<String> {
        let string_to_sign = self.string_to_sign(
            method,
            resource,
            content_length,
            content_md5,
            content_type,
            date,
            extra_headers,
            query_params,
        );
        let signature = self.hmac_base64(&string_to_sign)?;
        Ok(format!("SharedKey {}:{}", self.connection.account, signature))
    }

    /// Build a Service SAS query string granting read access to `name`
    /// until `expiry`.
    fn sas_token(&self, name: &str, expiry: DateTime<Utc>) -> anyhow::Result<String> {
        let signed_permissions = "r";
        let signed_resource = "b";
        let signed_expiry = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
        let signed_protocol = if self.connection.blob_endpoint.starts_with("https://") {
            "https"
        } else {
            "https,http"
        };

        let canonicalized_resource = format!(
            "/blob/{}/{}/{}",
            self.connection.account, self.container, name
        );

        // Field order for signed versions 2020-12-06 and later:
        // sp, st, se, resource, si, sip, spr, sv, sr, snapshot time,
        // encryption scope, rscc, rscd, rsce, rscl, rsct.
        let string_to_sign = format!(
            "{}\n\n{}\n{}\n\n\n{}\n{}\n{}\n\n\n\n\n\n\n",
            signed_permissions,
            signed_expiry,
            canonicalized_resource,
            signed_protocol,
            SAS_VERSION,
            signed_resource,
        );
        let signature = self.hmac_base64(&string_to_sign)?;

        let encode =
            |v: &str| percent_encoding::utf8_percent_encode(v, &SAS_VALUE_ENCODE_SET).to_string();

        Ok(format!(
            "sv={}&se={}&sr={}&sp={}&spr={}&sig={}",
            SAS_VERSION,
            encode(&signed_expiry),
            signed_resource,
            signed_permissions,
            encode(signed_protocol),
            encode(&signature),
        ))
    }

    /// Check if a status code indicates "not found" (404).
    fn is_not_found(status: StatusCode) -> bool {
        status == StatusCode::NOT_FOUND
    }

    /// Map an Azure HTTP error to an anyhow error with context.
    fn map_azure_error(context: &str, status: StatusCode, body: &str) -> anyhow::Error {
        match parse_azure_error(body) {
            Some((code, message)) => {
                anyhow::anyhow!("Azure {}: HTTP {} {} - {}", context, status, code, message)
            }
            None => anyhow::anyhow!("Azure {}: HTTP {} - {}", context, status, body),
        }
    }

    // -- Azure Blob REST API operations ----------------------------------------

    /// Create the container (Create Container).  Returns `false` when it
    /// already existed.
    async fn azure_create_container(&self) -> anyhow::Result<bool> {
        let url = format!("{}?restype=container", self.container_url());
        let date = Self::rfc1123_date();
        let query_params = vec![("restype".to_string(), "container".to_string())];

        let auth_header = self.sign_request(
            "PUT",
            &self.container,
            Some(0),
            "",
            "",
            &date,
            &[],
            &query_params,
        )?;

        let resp = self
            .client
            .put(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Content-Length", "0")
            .header("Authorization", auth_header)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure create_container request failed: {}", e))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Self::map_azure_error("create_container", status, &body))
            }
        }
    }

    /// Upload a block blob (Put Blob) with its content type.
    async fn azure_upload(&self, name: &str, data: Bytes, content_type: &str) -> anyhow::Result<()> {
        let url = self.blob_url(name);
        let date = Self::rfc1123_date();
        let content_md5 = Self::content_md5(&data);
        let resource = format!("{}/{}", self.container, name);

        let extra_headers = vec![
            ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
            ("x-ms-blob-content-type".to_string(), content_type.to_string()),
        ];

        let auth_header = self.sign_request(
            "PUT",
            &resource,
            Some(data.len()),
            &content_md5,
            content_type,
            &date,
            &extra_headers,
            &[],
        )?;

        let resp = self
            .client
            .put(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-blob-content-type", content_type)
            .header("Content-Type", content_type)
            .header("Content-MD5", &content_md5)
            .header("Authorization", auth_header)
            .body(data)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure upload request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_azure_error("upload", status, &body));
        }

        Ok(())
    }

    /// Delete a blob (Delete Blob).  Idempotent: a 404 is not an error.
    async fn azure_delete(&self, name: &str) -> anyhow::Result<()> {
        let url = self.blob_url(name);
        let date = Self::rfc1123_date();
        let resource = format!("{}/{}", self.container, name);

        let auth_header = self.sign_request("DELETE", &resource, None, "", "", &date, &[], &[])?;

        let resp = self
            .client
            .delete(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Authorization", auth_header)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure delete request failed: {}", e))?;

        if !resp.status().is_success() && !Self::is_not_found(resp.status()) {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_azure_error("delete", status, &body));
        }

        Ok(())
    }

    /// Check if a blob exists via HEAD (Get Blob Properties).
    async fn azure_exists(&self, name: &str) -> anyhow::Result<bool> {
        let url = self.blob_url(name);
        let date = Self::rfc1123_date();
        let resource = format!("{}/{}", self.container, name);

        let auth_header = self.sign_request("HEAD", &resource, None, "", "", &date, &[], &[])?;

        let resp = self
            .client
            .head(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Authorization", auth_header)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure exists check failed: {}", e))?;

        if resp.status().is_success() {
            Ok(true)
        } else if Self::is_not_found(resp.status()) {
            Ok(false)
        } else {
            // HEAD responses carry no body.
            Err(Self::map_azure_error("exists", resp.status(), ""))
        }
    }
}

impl BlobBackend for AzureBlobBackend {
    fn ensure_container(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if self.azure_create_container().await? {
                info!("Azure container created: {}", self.container);
            } else {
                info!("Azure container already exists: {}", self.container);
            }
            Ok(())
        })
    }

    fn put(&self, name: &str, data: Bytes, content_type: &str) -> BackendFuture<'_, ()> {
        let name = name.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            debug!(
                "Azure put: container={} blob={} size={}",
                self.container,
                name,
                data.len()
            );
            self.azure_upload(&name, data, &content_type).await
        })
    }

    fn exists(&self, name: &str) -> BackendFuture<'_, bool> {
        let name = name.to_string();
        Box::pin(async move {
            debug!("Azure exists: container={} blob={}", self.container, name);
            self.azure_exists(&name).await
        })
    }

    fn delete(&self, name: &str) -> BackendFuture<'_, ()> {
        let name = name.to_string();
        Box::pin(async move {
            debug!("Azure delete: container={} blob={}", self.container, name);
            self.azure_delete(&name).await
        })
    }

    fn blob_url(&self, name: &str) -> String {
        let encoded = percent_encoding::utf8_percent_encode(name, &AZURE_BLOB_ENCODE_SET);
        format!("{}/{}", self.container_url(), encoded)
    }

    fn signed_read_url(&self, name: &str, expiry: DateTime<Utc>) -> anyhow::Result<String> {
        let token = self.sas_token(name, expiry)?;
        Ok(format!("{}?{}", self.blob_url(name), token))
    }
}

/// Extract `(Code, Message)` from an Azure XML error body.
fn parse_azure_error(body: &str) -> Option<(String, String)> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut code = None;
    let mut message = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Ok(Event::End(_)) => current_tag.clear(),
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                match current_tag.as_str() {
                    "Code" => code = Some(text),
                    "Message" => message = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    // Azure appends request id and timestamp lines to the message.
    let message = message
        .map(|m| m.lines().next().unwrap_or_default().to_string())
        .unwrap_or_default();
    code.map(|c| (c, message))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str =
        "dGVzdGtleXRlc3RrZXl0ZXN0a2V5dGVzdGtleXRlc3RrZXl0ZXN0a2V5dGVzdGtleXRlc3RrZXk=";

    fn test_backend() -> AzureBlobBackend {
        let conn = format!(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey={};EndpointSuffix=core.windows.net",
            TEST_KEY
        );
        AzureBlobBackend::from_connection_string(&conn, "reviews".into(), Duration::from_secs(5))
            .unwrap()
    }

    fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    #[test]
    fn test_parse_connection_string() {
        let conn = AzureConnection::parse(&format!(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey={};EndpointSuffix=core.windows.net",
            TEST_KEY
        ))
        .unwrap();
        assert_eq!(conn.account, "acct");
        assert_eq!(conn.blob_endpoint, "https://acct.blob.core.windows.net");
        assert_eq!(conn.key_bytes, BASE64_STANDARD.decode(TEST_KEY).unwrap());
    }

    #[test]
    fn test_parse_connection_string_explicit_endpoint() {
        let conn = AzureConnection::parse(&format!(
            "AccountName=acct;AccountKey={};BlobEndpoint=https://blobs.example.com/",
            TEST_KEY
        ))
        .unwrap();
        assert_eq!(conn.blob_endpoint, "https://blobs.example.com");
    }

    #[test]
    fn test_parse_connection_string_development() {
        let conn = AzureConnection::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(conn.account, "devstoreaccount1");
        assert_eq!(conn.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_parse_connection_string_missing_key() {
        let err = AzureConnection::parse("AccountName=acct;EndpointSuffix=core.windows.net")
            .unwrap_err();
        assert!(err.to_string().contains("AccountKey"));
    }

    #[test]
    fn test_parse_connection_string_bad_key() {
        assert!(AzureConnection::parse("AccountName=acct;AccountKey=!!!").is_err());
    }

    #[test]
    fn test_connection_debug_hides_key() {
        let conn = AzureConnection::parse(&format!("AccountName=acct;AccountKey={}", TEST_KEY))
            .unwrap();
        assert!(!format!("{:?}", conn).contains("key_bytes"));
    }

    #[test]
    fn test_blob_url() {
        let backend = test_backend();
        assert_eq!(
            backend.blob_url("abc.jpg"),
            "https://acct.blob.core.windows.net/reviews/abc.jpg"
        );
    }

    #[test]
    fn test_blob_url_encoding() {
        let backend = test_backend();
        assert_eq!(
            backend.blob_url("my file.png"),
            "https://acct.blob.core.windows.net/reviews/my%20file.png"
        );
    }

    #[test]
    fn test_string_to_sign_put_layout() {
        let backend = test_backend();
        let headers = vec![("x-ms-blob-type".to_string(), "BlockBlob".to_string())];
        let sts = backend.string_to_sign(
            "PUT",
            "reviews/abc.jpg",
            Some(11),
            "md5==",
            "image/jpeg",
            "Mon, 01 Jan 2024 00:00:00 GMT",
            &headers,
            &[],
        );
        assert_eq!(
            sts,
            "PUT\n\n\n11\nmd5==\nimage/jpeg\n\n\n\n\n\n\n\
             x-ms-blob-type:BlockBlob\n\
             x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
             x-ms-version:2023-11-03\n\
             /acct/reviews/abc.jpg"
        );
    }

    #[test]
    fn test_string_to_sign_head_has_empty_length() {
        let backend = test_backend();
        let sts = backend.string_to_sign("HEAD", "reviews/a.png", None, "", "", "d", &[], &[]);
        assert!(sts.starts_with("HEAD\n\n\n\n\n\n"));
        assert!(sts.ends_with("/acct/reviews/a.png"));
    }

    #[test]
    fn test_string_to_sign_query_params_sorted() {
        let backend = test_backend();
        let params = vec![
            ("restype".to_string(), "container".to_string()),
            ("comp".to_string(), "list".to_string()),
        ];
        let sts = backend.string_to_sign("GET", "reviews", None, "", "", "d", &[], &params);
        assert!(sts.ends_with("/acct/reviews\ncomp:list\nrestype:container"));
    }

    #[test]
    fn test_string_to_sign_path_style_endpoint() {
        let backend = AzureBlobBackend::from_connection_string(
            "UseDevelopmentStorage=true",
            "reviews".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let sts = backend.string_to_sign("HEAD", "reviews/a.png", None, "", "", "d", &[], &[]);
        assert!(sts.ends_with("/devstoreaccount1/devstoreaccount1/reviews/a.png"));
    }

    #[test]
    fn test_sign_request_format() {
        let backend = test_backend();
        let header = backend
            .sign_request("HEAD", "reviews/a.png", None, "", "", "d", &[], &[])
            .unwrap();
        assert!(header.starts_with("SharedKey acct:"));
    }

    #[test]
    fn test_signed_read_url_params() {
        let backend = test_backend();
        let expiry = Utc::now() + chrono::Duration::hours(24);
        let url = backend.signed_read_url("abc.jpg", expiry).unwrap();

        assert!(url.starts_with("https://acct.blob.core.windows.net/reviews/abc.jpg?"));
        assert_eq!(query_param(&url, "sp"), Some("r"));
        assert_eq!(query_param(&url, "sr"), Some("b"));
        assert_eq!(query_param(&url, "sv"), Some(SAS_VERSION));
        assert_eq!(query_param(&url, "spr"), Some("https"));
        assert!(query_param(&url, "sig").is_some());

        let se = query_param(&url, "se").unwrap();
        let decoded = percent_encoding::percent_decode_str(se).decode_utf8().unwrap();
        let parsed = DateTime::parse_from_rfc3339(&decoded).unwrap();
        assert_eq!(parsed.timestamp(), expiry.timestamp());
    }

    #[test]
    fn test_sas_signature_verifies_with_account_key() {
        let backend = test_backend();
        let expiry = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let url = backend.signed_read_url("abc.jpg", expiry).unwrap();

        let expected_sts = "r\n\n2030-01-01T00:00:00Z\n/blob/acct/reviews/abc.jpg\n\n\nhttps\n2021-06-08\nb\n\n\n\n\n\n\n";
        let mut mac = HmacSha256::new_from_slice(&BASE64_STANDARD.decode(TEST_KEY).unwrap())
            .unwrap();
        mac.update(expected_sts.as_bytes());
        let expected_sig = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        let sig = query_param(&url, "sig").unwrap();
        let decoded = percent_encoding::percent_decode_str(sig).decode_utf8().unwrap();
        assert_eq!(decoded, expected_sig);
    }

    #[test]
    fn test_sas_differs_by_expiry() {
        let backend = test_backend();
        let now = Utc::now();
        let a = backend
            .signed_read_url("abc.jpg", now + chrono::Duration::hours(1))
            .unwrap();
        let b = backend
            .signed_read_url("abc.jpg", now + chrono::Duration::hours(2))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sas_http_endpoint_allows_http() {
        let backend = AzureBlobBackend::from_connection_string(
            "UseDevelopmentStorage=true",
            "reviews".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let url = backend.signed_read_url("a.png", Utc::now()).unwrap();
        assert_eq!(query_param(&url, "spr"), Some("https%2Chttp"));
    }

    #[test]
    fn test_content_md5_empty() {
        assert_eq!(AzureBlobBackend::content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_is_not_found() {
        assert!(AzureBlobBackend::is_not_found(StatusCode::NOT_FOUND));
        assert!(!AzureBlobBackend::is_not_found(StatusCode::OK));
        assert!(!AzureBlobBackend::is_not_found(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_parse_azure_error() {
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>AuthenticationFailed</Code>\
                    <Message>Server failed to authenticate the request.\nRequestId:abc\nTime:2024</Message></Error>";
        let (code, message) = parse_azure_error(body).unwrap();
        assert_eq!(code, "AuthenticationFailed");
        assert_eq!(message, "Server failed to authenticate the request.");
    }

    #[test]
    fn test_parse_azure_error_not_xml() {
        assert!(parse_azure_error("").is_none());
        assert!(parse_azure_error("plain text").is_none());
    }

    #[test]
    fn test_map_azure_error_includes_code() {
        let err = AzureBlobBackend::map_azure_error(
            "upload",
            StatusCode::FORBIDDEN,
            "<Error><Code>AuthorizationFailure</Code><Message>nope</Message></Error>",
        );
        let text = err.to_string();
        assert!(text.contains("upload"));
        assert!(text.contains("AuthorizationFailure"));
        assert!(text.contains("nope"));
    }

    #[test]
    fn test_rfc1123_date_format() {
        let date = AzureBlobBackend::rfc1123_date();
        assert!(date.ends_with(" GMT"));
    }
}
