//! HTTP backend: edge functions, REST reads and signed storage transfers
//!
//! One client serves every collaborator trait. Edge functions live under
//! `{base}/functions/v1/<name>`, table reads under `{base}/rest/v1/<table>`
//! and token-based uploads under `{base}/storage/v1/object/upload/sign/...`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::{
    CatalogSource, RawBackgroundColor, RawCatalog, RawFrameColor, RawMockupVariant, RawSize,
};
use super::error::ApiError;
use super::session::{
    FinalizePayload, FinalizeReceipt, SessionRecord, SessionService, StepPatch, StepUpdateRequest,
};
use super::storage::{
    FileTransfer, GrantRequest, GrantRow, GrantTarget, ProgressSink, UploadGrant,
    UploadGrantService,
};
use crate::config::ApiConfig;
use crate::upload::PhotoFile;

const PROVIDER_NAME: &str = "supabase";
const USER_AGENT: &str = concat!("frame-builder/", env!("CARGO_PKG_VERSION"));
/// Bytes handed to the transport per progress report
const TRANSFER_CHUNK: usize = 64 * 1024;

/// Backend client shared by the catalog, session and storage collaborators
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    bucket: String,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    origin_url: &'a str,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct CreateUploadUrlsRequest<'a> {
    session_id: &'a str,
    files: &'a [GrantRequest],
}

#[derive(Deserialize)]
struct CreateUploadUrlsResponse {
    uploads: Vec<GrantRow>,
}

#[derive(Deserialize)]
struct SettingRow {
    value: Option<String>,
}

/// Error body returned by edge functions
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "errorCode")]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    entry_number: Option<u64>,
}

impl HttpBackend {
    /// Create a backend client from API configuration
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        if config.base_url.trim().is_empty() || config.anon_key.trim().is_empty() {
            return Err(ApiError::not_configured(PROVIDER_NAME));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            bucket: config.storage_bucket.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn signed_upload_url(&self, path: &str, token: &str) -> String {
        format!(
            "{}/storage/v1/object/upload/sign/{}/{}?token={}",
            self.base_url, self.bucket, path, token
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.anon_key))
    }

    fn map_send_error(&self, err: &reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::timeout(PROVIDER_NAME, self.request_timeout.as_secs())
        } else {
            ApiError::network(PROVIDER_NAME, err.to_string())
        }
    }

    /// Turn a non-2xx response into a typed error
    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body.error.unwrap_or(text);

        Err(match status {
            401 | 403 => ApiError::Unauthorized {
                provider: PROVIDER_NAME.to_string(),
                status,
            },
            409 => ApiError::Conflict {
                provider: PROVIDER_NAME.to_string(),
                code: body.error_code,
                message,
                entry_number: body.entry_number,
            },
            _ => ApiError::HttpError {
                provider: PROVIDER_NAME.to_string(),
                status,
                code: body.error_code,
                message,
            },
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e.to_string()))
    }

    async fn call_function<B: Serialize + ?Sized>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        debug!(function = name, "calling edge function");
        let response = self
            .authorized(self.client.post(self.function_url(name)))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;
        Self::check_status(response).await
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ApiError> {
        let response = self
            .authorized(self.client.get(self.rest_url(table)))
            .timeout(self.request_timeout)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;
        let response = Self::check_status(response).await?;
        Self::decode(response).await
    }

    async fn select_active<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
        ordered: bool,
    ) -> Result<Vec<T>, ApiError> {
        let mut query = vec![("select", columns), ("active", "eq.true")];
        if ordered {
            query.push(("order", "display_order.asc"));
        }
        self.select(table, &query).await
    }
}

#[async_trait]
impl SessionService for HttpBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_session(&self, origin_url: &str) -> Result<String, ApiError> {
        let response = self
            .call_function("create_session", &CreateSessionRequest { origin_url })
            .await?;
        let body: CreateSessionResponse = Self::decode(response).await?;
        if body.session_id.is_empty() {
            return Err(ApiError::invalid_response(
                PROVIDER_NAME,
                "create_session returned an empty session_id",
            ));
        }
        Ok(body.session_id)
    }

    async fn update_session_step(
        &self,
        session_id: &str,
        patch: &StepPatch,
    ) -> Result<(), ApiError> {
        self.call_function("update_session_step", &StepUpdateRequest { session_id, patch })
            .await?;
        Ok(())
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionRecord, ApiError> {
        let filter = format!("eq.{}", session_id);
        let rows: Vec<SessionRecord> = self
            .select(
                "builder_sessions",
                &[
                    ("select", "session_id,lifecycle_status,entry_number,created_at"),
                    ("session_id", filter.as_str()),
                    ("limit", "1"),
                ],
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            ApiError::invalid_response(PROVIDER_NAME, format!("session {} not found", session_id))
        })
    }

    async fn finalize_session(
        &self,
        payload: &FinalizePayload,
    ) -> Result<FinalizeReceipt, ApiError> {
        let response = self.call_function("finalize_session", payload).await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl UploadGrantService for HttpBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_upload_grants(
        &self,
        session_id: &str,
        files: &[GrantRequest],
    ) -> Result<Vec<UploadGrant>, ApiError> {
        let response = self
            .call_function(
                "create_upload_urls",
                &CreateUploadUrlsRequest { session_id, files },
            )
            .await?;
        let body: CreateUploadUrlsResponse = Self::decode(response).await?;

        if body.uploads.len() != files.len() {
            return Err(ApiError::invalid_response(
                PROVIDER_NAME,
                format!(
                    "requested {} grants, received {}",
                    files.len(),
                    body.uploads.len()
                ),
            ));
        }

        body.uploads
            .into_iter()
            .map(|row| {
                UploadGrant::try_from(row).map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e))
            })
            .collect()
    }
}

#[async_trait]
impl FileTransfer for HttpBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn transfer(
        &self,
        grant: &UploadGrant,
        file: &PhotoFile,
        progress: ProgressSink,
    ) -> Result<(), ApiError> {
        let url = match &grant.target {
            GrantTarget::SignedUrl(url) => url.clone(),
            GrantTarget::Token(token) => self.signed_upload_url(&grant.path, token),
        };

        let total = file.len().max(1);
        let chunks: Vec<Vec<u8>> = file
            .data()
            .chunks(TRANSFER_CHUNK)
            .map(<[u8]>::to_vec)
            .collect();
        let mut sent = 0usize;
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            progress((sent * 100 / total) as u8);
            Ok::<_, std::io::Error>(chunk)
        }));

        debug!(path = %grant.path, bytes = file.len(), "starting transfer");
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, file.content_type())
            .header(CONTENT_LENGTH, file.len())
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for HttpBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch(&self) -> Result<RawCatalog, ApiError> {
        let (sizes, background_colors, frame_colors, mockup_variants) = tokio::try_join!(
            self.select_active::<RawSize>(
                "sizes",
                "size,label,name,price,promo_price,discount,bg_img,display_order",
                true,
            ),
            self.select_active::<RawBackgroundColor>(
                "background_colors",
                "name,hex,display_order",
                true,
            ),
            self.select_active::<RawFrameColor>(
                "frame_colors",
                "id,name,prefix,hex,display_order,display_name_pt",
                true,
            ),
            self.select_active::<RawMockupVariant>(
                "mockup_variants",
                "size,frame_prefix,background_name,image_url",
                false,
            ),
        )?;

        // The support contact has a fallback, so a failed settings read is not fatal
        let support_contact = self
            .select::<SettingRow>(
                "builder_settings",
                &[
                    ("select", "value"),
                    ("key", "eq.support_whatsapp"),
                    ("limit", "1"),
                ],
            )
            .await
            .ok()
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.value)
            .filter(|v| !v.trim().is_empty());

        Ok(RawCatalog {
            sizes,
            frame_colors,
            background_colors,
            mockup_variants,
            support_contact,
        })
    }
}
