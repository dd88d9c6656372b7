//! AWS Bedrock Converse text generator.
//!
//! Uses the non-streaming Converse API on `bedrock-runtime.{region}` with
//! hand-rolled Signature Version 4 signing. The control-plane host
//! `bedrock.{region}` is only used by [`BedrockTextGenerator::check_connectivity`].

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::TextGenerator;
use crate::error::CapabilityError;

type HmacSha256 = Hmac<Sha256>;

/// SigV4 signing name shared by the runtime and control-plane endpoints.
const SIGNING_SERVICE: &str = "bedrock";

/// Static AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &"***")
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.is_some())
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token (temporary credentials); empty clears it.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.session_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }
}

/// Result of a successful connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub region: String,
    pub endpoint: String,
    pub custom_models: usize,
}

pub struct BedrockTextGenerator {
    client: reqwest::Client,
    region: String,
    credentials: AwsCredentials,
    model_id: String,
    max_tokens: u32,
    temperature: Option<f64>,
    runtime_url: String,
    control_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for BedrockTextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockTextGenerator")
            .field("region", &self.region)
            .field("model_id", &self.model_id)
            .field("runtime_url", &self.runtime_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl BedrockTextGenerator {
    /// Create a generator for `region`. Region and both key parts must be
    /// non-empty.
    pub fn new(
        region: impl Into<String>,
        credentials: AwsCredentials,
        timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let region = region.into();
        if region.trim().is_empty() {
            return Err(CapabilityError::Permanent(
                "AWS region must not be empty".to_string(),
            ));
        }
        if credentials.access_key_id.trim().is_empty() {
            return Err(CapabilityError::Permanent(
                "AWS access key ID must not be empty".to_string(),
            ));
        }
        if credentials.secret_access_key.trim().is_empty() {
            return Err(CapabilityError::Permanent(
                "AWS secret access key must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| CapabilityError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            runtime_url: format!("https://bedrock-runtime.{region}.amazonaws.com"),
            control_url: format!("https://bedrock.{region}.amazonaws.com"),
            region,
            credentials,
            model_id: "amazon.nova-lite-v1:0".to_string(),
            max_tokens: 512,
            temperature: None,
            timeout,
        })
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override both endpoints (proxies, local testing).
    pub fn with_endpoints(mut self, runtime_url: &str, control_url: &str) -> Self {
        self.runtime_url = runtime_url.trim_end_matches('/').to_string();
        self.control_url = control_url.trim_end_matches('/').to_string();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Converse request body for a single user prompt.
    fn build_body(&self, prompt: &str) -> Value {
        let mut inference_config = json!({ "maxTokens": self.max_tokens });
        if let Some(temp) = self.temperature {
            inference_config["temperature"] = json!(temp);
        }
        json!({
            "messages": [{
                "role": "user",
                "content": [{ "text": prompt }],
            }],
            "inferenceConfig": inference_config,
        })
    }

    /// Sign a request with AWS Signature Version 4.
    ///
    /// `uri_path` is the path as sent on the wire; it is encoded once more
    /// for the canonical request. `query` must already be in canonical form.
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        uri_path: &str,
        query: &str,
        body: &[u8],
        datetime: &str,
    ) -> Vec<(String, String)> {
        let date = &datetime[..8];
        let payload_hash = hex_sha256(body);

        let mut signed_header_names = vec!["host", "x-amz-content-sha256", "x-amz-date"];
        if self.credentials.session_token.is_some() {
            signed_header_names.push("x-amz-security-token");
        }
        signed_header_names.sort_unstable();

        let mut canonical_headers = String::new();
        for name in &signed_header_names {
            let value = match *name {
                "host" => host,
                "x-amz-content-sha256" => payload_hash.as_str(),
                "x-amz-date" => datetime,
                "x-amz-security-token" => self.credentials.session_token.as_deref().unwrap_or(""),
                _ => "",
            };
            canonical_headers.push_str(&format!("{name}:{value}\n"));
        }
        let signed_headers = signed_header_names.join(";");

        let canonical_request = format!(
            "{method}\n{}\n{query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            canonical_uri(uri_path)
        );

        let credential_scope = format!("{date}/{}/{SIGNING_SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{datetime}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&self.credentials.secret_access_key, date, &self.region);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );

        let mut headers = vec![
            ("host".to_string(), host.to_string()),
            ("x-amz-date".to_string(), datetime.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash),
            ("authorization".to_string(), authorization),
        ];
        if let Some(ref token) = self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers
    }

    /// Send a signed request and return the body of a 2xx response.
    async fn send_signed(
        &self,
        method: reqwest::Method,
        base_url: &str,
        uri_path: &str,
        query: &str,
        body: Vec<u8>,
    ) -> Result<String, CapabilityError> {
        let base = url::Url::parse(base_url)
            .map_err(|e| CapabilityError::Permanent(format!("invalid endpoint {base_url}: {e}")))?;
        let host = match (base.host_str(), base.port()) {
            (Some(h), Some(port)) => format!("{h}:{port}"),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(CapabilityError::Permanent(format!(
                    "endpoint {base_url} has no host"
                )))
            }
        };

        let datetime = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let headers = self.sign_request(method.as_str(), &host, uri_path, query, &body, &datetime);

        let mut url = format!("{base_url}{uri_path}");
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        let mut request = self
            .client
            .request(method, &url)
            .header("content-type", "application/json");
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CapabilityError::from_reqwest(&e, self.timeout))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CapabilityError::from_reqwest(&e, self.timeout))?;
        if !status.is_success() {
            return Err(CapabilityError::from_status(status.as_u16(), &text));
        }
        Ok(text)
    }

    /// List custom models on the control plane to prove that credentials,
    /// region and network path all work.
    pub async fn check_connectivity(&self) -> Result<ConnectivityReport, CapabilityError> {
        let text = self
            .send_signed(
                reqwest::Method::GET,
                &self.control_url,
                "/custom-models",
                "maxResults=100",
                Vec::new(),
            )
            .await?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            CapabilityError::MalformedResponse(format!("invalid ListCustomModels response: {e}"))
        })?;
        let custom_models = value
            .get("modelSummaries")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        Ok(ConnectivityReport {
            region: self.region.clone(),
            endpoint: self.control_url.clone(),
            custom_models,
        })
    }
}

#[async_trait]
impl TextGenerator for BedrockTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, CapabilityError> {
        let body = serde_json::to_vec(&self.build_body(prompt)).map_err(|e| {
            CapabilityError::Permanent(format!("failed to serialize request body: {e}"))
        })?;
        let uri_path = format!(
            "/model/{}/converse",
            percent_encode_path_segment(&self.model_id)
        );
        let text = self
            .send_signed(
                reqwest::Method::POST,
                &self.runtime_url,
                &uri_path,
                "",
                body,
            )
            .await?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            CapabilityError::MalformedResponse(format!("invalid Converse response: {e}"))
        })?;
        let output = extract_text(&value)?;
        debug!(
            model = %self.model_id,
            stop_reason = value.get("stopReason").and_then(|v| v.as_str()).unwrap_or(""),
            output_tokens = value
                .pointer("/usage/outputTokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            "generation received"
        );
        Ok(output)
    }
}

/// Concatenate the text blocks of `output.message.content`.
fn extract_text(response: &Value) -> Result<String, CapabilityError> {
    let blocks = response
        .pointer("/output/message/content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| {
            CapabilityError::MalformedResponse(
                "Converse response has no output.message.content".to_string(),
            )
        })?;
    let text: String = blocks
        .iter()
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(CapabilityError::MalformedResponse(
            "Converse response contained no text".to_string(),
        ));
    }
    Ok(text)
}

// ==================== AWS SigV4 helpers ====================

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
fn derive_signing_key(secret_access_key: &str, date: &str, region: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_access_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SIGNING_SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn percent_encode_path_segment(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char)
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}

/// Canonical URI for SigV4: every segment of the wire path encoded again,
/// so `%3A` becomes `%253A`.
fn canonical_uri(path: &str) -> String {
    path.split('/')
        .map(percent_encode_path_segment)
        .collect::<Vec<_>>()
        .join("/")
}
