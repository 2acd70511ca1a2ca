//! S3 object store
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from bulkup-core.

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::ChecksumAlgorithm;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use bulkup_core::{
    Digest, ErrorKind, ObjectStore, PutReceipt, PutRequest, Result, StoreError, StoreSettings,
};

/// Error codes S3 uses when the credentials themselves are bad
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
    "TokenRefreshRequired",
    "MissingSecurityHeader",
];

/// S3 bucket used as an upload target
pub struct S3Store {
    inner: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Create a client for the configured endpoint and bucket
    pub async fn new(settings: &StoreSettings) -> Result<Self> {
        settings.validate()?;

        let credentials = aws_credential_types::Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "bulkup-static-credentials",
        );

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(force_path_style(&settings.bucket_lookup))
            .build();

        tracing::debug!(
            endpoint = %settings.endpoint,
            bucket = %settings.bucket,
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Create the bucket when it does not exist yet
    ///
    /// Returns `true` if the bucket was created.
    pub async fn ensure_bucket(&self) -> std::result::Result<bool, StoreError> {
        match self.inner.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => return Ok(false),
            Err(e) if !is_not_found(&e) => return Err(classify(&e)),
            Err(_) => {}
        }

        tracing::info!(bucket = %self.bucket, "Creating bucket");
        match self.inner.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
            {
                Ok(false)
            }
            Err(e) => Err(classify(&e)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, name: &str) -> std::result::Result<bool, StoreError> {
        match self
            .inner
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(classify(&e)),
        }
    }

    async fn put(&self, request: PutRequest<'_>) -> std::result::Result<PutReceipt, StoreError> {
        let body = ByteStream::read_from()
            .path(request.source)
            .buffer_size(request.chunk_size)
            .length(Length::Exact(request.size))
            .build()
            .await
            .map_err(|e| {
                StoreError::new(
                    ErrorKind::Io,
                    format!("cannot open {}: {e}", request.source.display()),
                )
            })?;

        let content_length = i64::try_from(request.size).map_err(|_| {
            StoreError::new(ErrorKind::InvalidArgument, "file too large for a single PUT")
        })?;

        let mut builder = self
            .inner
            .put_object()
            .bucket(&self.bucket)
            .key(request.name)
            .body(body)
            .content_length(content_length)
            .content_type(request.content_type)
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .set_metadata(Some(request.metadata.clone()));

        if !request.overwrite {
            builder = builder.if_none_match("*");
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;

        let remote_digest = response.checksum_sha256().and_then(decode_checksum);
        if remote_digest.is_none() {
            tracing::debug!(key = request.name, "Store returned no SHA-256 checksum");
        }

        Ok(PutReceipt { remote_digest })
    }
}

fn force_path_style(bucket_lookup: &str) -> bool {
    bucket_lookup == "path" || bucket_lookup == "auto"
}

fn is_not_found<E>(error: &SdkError<E, HttpResponse>) -> bool {
    matches!(error, SdkError::ServiceError(ctx) if ctx.raw().status().as_u16() == 404)
}

/// Map an SDK failure to an engine error kind
fn classify<E>(error: &SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(error).to_string();
    let kind = match error {
        SdkError::TimeoutError(_) => ErrorKind::Timeout,
        SdkError::DispatchFailure(failure) if failure.is_timeout() => ErrorKind::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => ErrorKind::Transient,
        SdkError::ConstructionFailure(_) => ErrorKind::InvalidArgument,
        SdkError::ServiceError(service_err) => {
            let raw = service_err.raw();
            let code = service_err
                .err()
                .code()
                .or_else(|| raw.headers().get("x-amz-error-code"));
            classify_status(raw.status().as_u16(), code)
        }
        _ => ErrorKind::Unknown,
    };
    StoreError::new(kind, message)
}

/// Classify an S3 service error by HTTP status and error code
pub fn classify_status(status: u16, code: Option<&str>) -> ErrorKind {
    if let Some(code) = code {
        if CREDENTIAL_ERROR_CODES.contains(&code) {
            return ErrorKind::Authentication;
        }
        if code == "SlowDown" {
            return ErrorKind::RateLimited;
        }
    }

    match status {
        401 => ErrorKind::Authentication,
        403 => ErrorKind::PermissionDenied,
        400 | 404 | 411 | 413 => ErrorKind::InvalidArgument,
        412 => ErrorKind::AlreadyExists,
        429 => ErrorKind::RateLimited,
        500 | 502 | 503 | 504 => ErrorKind::Transient,
        _ => ErrorKind::Unknown,
    }
}

/// S3 returns checksums base64-encoded; the engine compares hex
fn decode_checksum(encoded: &str) -> Option<Digest> {
    let bytes = STANDARD.decode(encoded).ok()?;
    (bytes.len() == 32).then(|| Digest::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkup_core::Error;

    #[test]
    fn test_credential_codes_are_authentication() {
        assert_eq!(
            classify_status(403, Some("InvalidAccessKeyId")),
            ErrorKind::Authentication
        );
        assert_eq!(
            classify_status(403, Some("SignatureDoesNotMatch")),
            ErrorKind::Authentication
        );
        assert_eq!(classify_status(401, None), ErrorKind::Authentication);
    }

    #[test]
    fn test_access_denied_is_permission() {
        assert_eq!(
            classify_status(403, Some("AccessDenied")),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_throttling() {
        assert_eq!(classify_status(503, Some("SlowDown")), ErrorKind::RateLimited);
        assert_eq!(classify_status(429, None), ErrorKind::RateLimited);
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [500, 502, 503, 504] {
            assert_eq!(classify_status(status, None), ErrorKind::Transient);
            assert!(classify_status(status, None).is_retryable());
        }
    }

    #[test]
    fn test_client_errors() {
        assert_eq!(classify_status(400, Some("InvalidArgument")), ErrorKind::InvalidArgument);
        assert_eq!(classify_status(404, Some("NoSuchBucket")), ErrorKind::InvalidArgument);
        assert_eq!(classify_status(413, None), ErrorKind::InvalidArgument);
        assert_eq!(
            classify_status(412, Some("PreconditionFailed")),
            ErrorKind::AlreadyExists
        );
        assert_eq!(classify_status(418, None), ErrorKind::Unknown);
    }

    #[test]
    fn test_decode_checksum() {
        // SHA-256 of "hello"
        let digest = decode_checksum("LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=").unwrap();
        assert_eq!(
            digest.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_decode_checksum_rejects_composite() {
        assert!(decode_checksum("not base64!").is_none());
        // Multipart checksums carry a part-count suffix
        assert!(decode_checksum("LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=-3").is_none());
        assert!(decode_checksum("aGVsbG8=").is_none());
    }

    #[test]
    fn test_force_path_style() {
        assert!(force_path_style("auto"));
        assert!(force_path_style("path"));
        assert!(!force_path_style("dns"));
    }

    #[tokio::test]
    async fn test_new_rejects_incomplete_settings() {
        let settings = StoreSettings {
            endpoint: "http://localhost:9000".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            S3Store::new(&settings).await,
            Err(Error::Config(_))
        ));
    }
}
