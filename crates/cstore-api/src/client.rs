//! `HttpConsentClient`: a `ConsentStore` that forwards every call to a
//! remote consent store API.
//!
//! Uses the blocking reqwest client, so it must not be called from inside an
//! async runtime.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use cstore_contracts::{
    AuthRequest, ConsentError, ConsentHeader, ConsentHeaderInput, ConsentQuery, ConsentRecord,
    ConsentResult, DiagnosticResult,
};
use cstore_core::ConsentStore;

use crate::dto::{
    format_timestamp, ConsentCheckRequest, ConsentCheckResponse, ConsentQueryRequest,
    ConsentQueryResponse, ConsentRecordDto, CreateConsentRequest, ErrorResponse,
};
use crate::error::kind_for;

fn transport(reason: impl Into<String>) -> ConsentError {
    ConsentError::Transport { reason: reason.into() }
}

pub struct HttpConsentClient {
    address: String,
    base: Url,
    http: Client,
}

impl HttpConsentClient {
    /// Build a client for the server at `address` (`host:port`, or a full
    /// `http://` URL).
    pub fn new(address: &str, timeout: Duration) -> ConsentResult<Self> {
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let base = Url::parse(&base).map_err(|e| transport(format!("invalid address '{}': {}", address, e)))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            address: address.to_string(),
            base,
            http,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, segments: &[&str]) -> ConsentResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| transport(format!("address '{}' cannot carry a path", self.address)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send `request`, turning transport failures and error statuses into
    /// `ConsentError`s.
    fn send(&self, request: RequestBuilder) -> ConsentResult<Response> {
        let response = request.send().map_err(|e| {
            error!(address = %self.address, error = %e, "consent store unreachable");
            transport(format!("error while calling consent store at {}: {}", self.address, e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let kind = kind_for(status);
        let body = response.text().unwrap_or_default();
        let error_body = serde_json::from_str::<ErrorResponse>(&body).unwrap_or_else(|_| ErrorResponse {
            message: format!("consent store returned {}, reason: {}", status.as_u16(), body),
            ..ErrorResponse::default()
        });
        debug!(status = status.as_u16(), message = %error_body.message, "consent store returned an error");

        Err(error_body.into_error(kind))
    }

    fn decode<T: DeserializeOwned>(response: Response) -> ConsentResult<T> {
        response
            .json()
            .map_err(|e| transport(format!("could not decode response body: {}", e)))
    }
}

impl ConsentStore for HttpConsentClient {
    /// The API accepts one header per request, so only single-header batches
    /// are supported.
    fn record_consent(&self, headers: &[ConsentHeaderInput]) -> ConsentResult<()> {
        let [header] = headers else {
            return Err(ConsentError::validation(
                "creating multiple consent records currently not supported",
            ));
        };

        let url = self.url(&["consent"])?;
        self.send(self.http.post(url).json(&CreateConsentRequest::from(header)))?;
        Ok(())
    }

    fn consent_auth(&self, request: &AuthRequest) -> ConsentResult<bool> {
        let body = ConsentCheckRequest {
            actor: request.actor.clone(),
            custodian: request.custodian.clone(),
            subject: request.subject.clone(),
            data_class: request.data_class.clone(),
            valid_at: request.checkpoint.map(format_timestamp),
        };

        let url = self.url(&["consent", "check"])?;
        let response: ConsentCheckResponse = Self::decode(self.send(self.http.post(url).json(&body))?)?;
        Ok(response.consent_given)
    }

    fn query_consent(&self, query: &ConsentQuery) -> ConsentResult<Vec<ConsentHeader>> {
        let body = ConsentQueryRequest {
            actor: query.actor.clone(),
            custodian: query.custodian.clone(),
            subject: query.subject.clone(),
            page: None,
            valid_at: query.valid_at.map(format_timestamp),
        };

        let url = self.url(&["consent", "query"])?;
        let response: ConsentQueryResponse = Self::decode(self.send(self.http.post(url).json(&body))?)?;
        response.results.iter().map(|r| r.to_header()).collect()
    }

    fn find_consent_record_by_hash(&self, hash: &str, latest: bool) -> ConsentResult<ConsentRecord> {
        let url = self.url(&["consent", hash])?;
        let request = self.http.get(url).query(&[("latest", latest)]);
        let record: ConsentRecordDto = Self::decode(self.send(request)?)?;
        record.to_record()
    }

    fn delete_consent_record_by_hash(&self, hash: &str) -> ConsentResult<bool> {
        let url = self.url(&["consent", hash])?;
        self.send(self.http.delete(url))?;
        Ok(true)
    }

    /// Probe the server and append the diagnostics it reports for itself.
    fn diagnostics(&self) -> Vec<DiagnosticResult> {
        let remote = self
            .url(&["diagnostics"])
            .and_then(|url| self.send(self.http.get(url)))
            .and_then(Self::decode::<Vec<DiagnosticResult>>);

        match remote {
            Ok(mut remote) => {
                let mut results = vec![DiagnosticResult::new(
                    "API",
                    format!("address: {}, reachable", self.address),
                )];
                results.append(&mut remote);
                results
            }
            Err(e) => vec![DiagnosticResult::new(
                "API",
                format!("address: {}, unreachable: {}", self.address, e),
            )],
        }
    }
}
