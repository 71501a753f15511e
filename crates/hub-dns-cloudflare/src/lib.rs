// # Cloudflare Zone API
//
// Cloudflare API v4 implementation of `hub_core::traits::ZoneApi`.
//
// ## Implementation Status
//
// - ✅ Paginated zone listing, optionally scoped to one account
// - ✅ Record listing by exact name
// - ✅ One `POST /zones/:id/dns_records/batch` per change batch
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 409, 429, 5xx)
// - ✅ Dry-run mode for safe testing
// - ❌ NO retry logic (the caller decides)
// - ❌ NO decision making (owned by `DnsReconciler`)
// - ❌ NO caching of zones or records between calls
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Construction fails fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?page=..&per_page=..[&account.id=..]`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=..`
// - Batch DNS Records: POST `/zones/:zone_id/dns_records/batch`

use async_trait::async_trait;
use hub_core::dns::{ChangeAction, ChangeBatch, DnsRecord, HostedZone, RecordType};
use hub_core::traits::ZoneApi;
use hub_core::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const ZONES_PER_PAGE: u32 = 50;
const RECORDS_PER_PAGE: u32 = 100;

const PROVIDER: &str = "cloudflare";

/// Cloudflare account access for the DNS reconciler
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot: every trait call maps to the API requests
/// listed above and nothing else.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true:
/// - zone and record listings are performed as usual
/// - the batch payload is logged
/// - **nothing** is sent to the batch endpoint
pub struct CloudflareZoneApi {
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Restrict zone listing to this account
    account_id: Option<String>,

    client: reqwest::Client,

    base_url: String,

    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareZoneApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareZoneApi")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareZoneApi {
    /// Create a zone API client
    ///
    /// # Parameters
    ///
    /// - `api_token`: token with Zone:Read and DNS:Edit permissions
    /// - `account_id`: only list zones of this account
    /// - `dry_run`: list as usual, but never send change batches
    ///
    /// # Errors
    ///
    /// `Config` if the token is empty, `Http` if the client cannot be built.
    pub fn new(api_token: impl Into<String>, account_id: Option<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            account_id: account_id.filter(|id| !id.is_empty()),
            client,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            dry_run,
        })
    }

    pub fn new_live(api_token: impl Into<String>, account_id: Option<String>) -> Result<Self> {
        Self::new(api_token, account_id, false)
    }

    pub fn new_dry_run(api_token: impl Into<String>, account_id: Option<String>) -> Result<Self> {
        Self::new(api_token, account_id, true)
    }

    /// Point at a different API root (for proxies or test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// GET `path` with `query` and unwrap the v4 response envelope
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)], context: &str) -> Result<Envelope<T>> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;
        read_envelope(response, context).await
    }
}

#[async_trait]
impl ZoneApi for CloudflareZoneApi {
    async fn list_zones(&self) -> Result<Vec<HostedZone>> {
        let mut zones = Vec::new();
        let mut page = 1;

        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("per_page", ZONES_PER_PAGE.to_string()),
            ];
            if let Some(account) = &self.account_id {
                query.push(("account.id", account.clone()));
            }

            let envelope: Envelope<Vec<ZoneJson>> = self.get("/zones", &query, "Zone listing").await?;
            let total_pages = envelope.result_info.as_ref().map_or(1, |info| info.total_pages);
            zones.extend(
                envelope
                    .result
                    .unwrap_or_default()
                    .into_iter()
                    .map(|z| HostedZone::new(z.id, &z.name)),
            );

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!("Cloudflare account has {} zone(s)", zones.len());
        Ok(zones)
    }

    async fn list_records(&self, zone: &HostedZone, fqdn: &str) -> Result<Vec<DnsRecord>> {
        let name = fqdn.trim_end_matches('.');
        let query = [
            ("name", name.to_string()),
            ("per_page", RECORDS_PER_PAGE.to_string()),
        ];
        let path = format!("/zones/{}/dns_records", zone.id);

        let envelope: Envelope<Vec<RecordJson>> = self.get(&path, &query, "Record listing").await?;
        let records: Vec<DnsRecord> = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .map(RecordJson::into_record)
            .collect();

        tracing::debug!("{} record(s) at {}", records.len(), fqdn);
        Ok(records)
    }

    async fn apply_changes(&self, zone: &HostedZone, batch: &ChangeBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let payload = batch_payload(batch)?;
        let url = format!("{}/zones/{}/dns_records/batch", self.base_url, zone.id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send POST request to {} with payload: {}", url, payload);
            return Ok(());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;
        let _: Envelope<Value> = read_envelope(response, "Record batch").await?;

        tracing::debug!("Applied {} change(s) in zone {}", batch.len(), zone.name);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// v4 response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ZoneJson {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordJson {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    ttl: u32,
}

impl RecordJson {
    fn into_record(self) -> DnsRecord {
        let record_type = RecordType::parse(&self.record_type);
        let value = match record_type {
            RecordType::Cname => fqdn(&self.content),
            _ => self.content,
        };
        DnsRecord::new(fqdn(&self.name), record_type, self.ttl, value).with_id(self.id)
    }
}

fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.').to_ascii_lowercase())
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response, context: &str) -> Result<Envelope<T>> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(status_error(status, context, &error_text));
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;

    if !envelope.success {
        let messages: Vec<String> = envelope
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect();
        return Err(Error::provider(
            PROVIDER,
            format!("{} failed: {}", context, messages.join("; ")),
        ));
    }
    Ok(envelope)
}

/// Map a non-success HTTP status to an error
fn status_error(status: StatusCode, context: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Invalid API token or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::provider(PROVIDER, format!("{}: not found. Status: {}", context, status)),
        409 => Error::provider(
            PROVIDER,
            format!("Conflict: records changed concurrently. Status: {}", status),
        ),
        429 => Error::rate_limited(format!("Rate limit exceeded. Please retry later. Status: {}", status)),
        500..=599 => Error::provider(
            PROVIDER,
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(PROVIDER, format!("{} failed: {} - {}", context, status, body)),
    }
}

/// Batch endpoint body; Cloudflare applies deletes, then puts, then posts
fn batch_payload(batch: &ChangeBatch) -> Result<Value> {
    let mut deletes = Vec::new();
    let mut puts = Vec::new();
    let mut posts = Vec::new();

    for change in batch.changes() {
        let record = &change.record;
        match change.action {
            ChangeAction::Delete => deletes.push(json!({ "id": record_id(record)? })),
            ChangeAction::Upsert => {
                let mut body = record_body(record);
                body["id"] = json!(record_id(record)?);
                puts.push(body);
            }
            ChangeAction::Create => posts.push(record_body(record)),
        }
    }

    Ok(json!({ "deletes": deletes, "puts": puts, "posts": posts }))
}

fn record_id(record: &DnsRecord) -> Result<&str> {
    record
        .id
        .as_deref()
        .ok_or_else(|| Error::invalid_input(format!("{} has no Cloudflare record id", record.name)))
}

fn record_body(record: &DnsRecord) -> Value {
    json!({
        "name": record.name.trim_end_matches('.'),
        "type": record.record_type.as_str(),
        "content": record.value.trim_end_matches('.'),
        "ttl": record.ttl,
        "proxied": false,
    })
}
