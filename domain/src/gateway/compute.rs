//! Thin HTTP proxy to the external compute service that runs tests.
//!
//! Every request carries the configured `X-API-Key`. Bodies and content types pass
//! through untouched in both directions and upstream status codes are relayed as is;
//! only failing to reach the service at all is an error.

use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use log::*;
use reqwest::Method;
use service::config::Config;
use std::time::Duration;

pub const API_KEY_HEADER: &str = "X-API-Key";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The compute service operations exposed through the proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeEndpoint {
    /// Starts a test run for a project.
    ProcessCombined,
    TaskStatus { test_id: String },
    TaskResults { test_id: String },
    AbortTest { test_id: String },
    StopTest,
    CalculateScores,
    Applicability,
}

impl ComputeEndpoint {
    pub fn method(&self) -> Method {
        match self {
            ComputeEndpoint::TaskStatus { .. } | ComputeEndpoint::TaskResults { .. } => {
                Method::GET
            }
            _ => Method::POST,
        }
    }

    pub fn path(&self) -> String {
        match self {
            ComputeEndpoint::ProcessCombined => "/process-combined".to_string(),
            ComputeEndpoint::TaskStatus { test_id } => {
                format!("/task-status/{}", urlencoding::encode(test_id))
            }
            ComputeEndpoint::TaskResults { test_id } => {
                format!("/task-results/{}", urlencoding::encode(test_id))
            }
            ComputeEndpoint::AbortTest { test_id } => {
                format!("/abort-test/{}", urlencoding::encode(test_id))
            }
            ComputeEndpoint::StopTest => "/stop-test/".to_string(),
            ComputeEndpoint::CalculateScores => "/calculate-scores".to_string(),
            ComputeEndpoint::Applicability => "/applicability".to_string(),
        }
    }
}

/// A request body on its way to the compute service.
#[derive(Debug, Clone, Default)]
pub struct ProxyRequest {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Whatever the compute service answered.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

pub struct ComputeClient {
    client: reqwest::Client,
    base_url: String,
}

impl ComputeClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = build_client(config)?;
        Ok(Self {
            client,
            base_url: config.compute_url().to_string(),
        })
    }

    pub async fn forward(
        &self,
        endpoint: &ComputeEndpoint,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, Error> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!("Proxying {} {url}", endpoint.method());

        let mut builder = self.client.request(endpoint.method(), &url);
        if let Some(content_type) = request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!("Compute service unreachable at {url}: {e:?}");
            Error::from(e)
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read compute service response from {url}: {e:?}");
            Error {
                source: Some(Box::new(e)),
                error_kind: DomainErrorKind::External(ExternalErrorKind::Network),
            }
        })?;

        if status >= 500 {
            warn!("Compute service answered {status} for {url}");
        }

        Ok(ProxyResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, Error> {
    let headers = build_auth_headers(config)?;

    Ok(reqwest::Client::builder()
        .use_rustls_tls()
        .connect_timeout(CONNECT_TIMEOUT)
        .default_headers(headers)
        .build()?)
}

fn build_auth_headers(config: &Config) -> Result<reqwest::header::HeaderMap, Error> {
    let api_key = config.compute_api_key().ok_or_else(|| {
        warn!("Failed to get compute API key from config");
        Error::config()
    })?;
    let mut headers = reqwest::header::HeaderMap::new();
    let mut api_key_value = reqwest::header::HeaderValue::from_str(&api_key).map_err(|err| {
        warn!("Failed to create API key header value: {:?}", err);
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
        }
    })?;
    api_key_value.set_sensitive(true);
    headers.insert(API_KEY_HEADER, api_key_value);
    Ok(headers)
}
