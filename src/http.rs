// reqwest implementation of the backend seams

use crate::backend::{ApiError, CardBackend, ClientDirectory, SupplierBooking, TripDirectory};
use crate::config::{CheckoutConfig, ConfigError};
use crate::models::{
    BookingConfirmation, BookingRequest, CardEntryOutcome, CardEntryRequest, CardSummary, Client,
    ErrorBody, NewClient, Page, RevealedCard, Trip,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// Some listings come back paginated, some as a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Paged(page) => page.results,
            Listing::Plain(items) => items,
        }
    }
}

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
    card_entry_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &CheckoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
            card_entry_timeout: config.card_entry_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    // Sends the request and returns the raw body of a 2xx response
    async fn send(&self, builder: RequestBuilder, timeout_ms: u64) -> Result<Bytes, ApiError> {
        let started = Instant::now();
        let response = builder.send().await.map_err(|e| transport_error(e, timeout_ms))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout_ms))?;

        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Backend responded"
        );

        if status.is_success() {
            Ok(body)
        } else {
            Err(error_from_body(status, &body))
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(builder, self.timeout_ms).await?;
        decode(&body)
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// Pagination links carry the API key, so absolute ones must stay on the base origin
pub(crate) fn follow_link(base_url: &str, link: &str) -> Result<String, ApiError> {
    if !(link.starts_with("http://") || link.starts_with("https://")) {
        return Ok(join_url(base_url, link));
    }

    let base = Url::parse(base_url)
        .map_err(|e| ApiError::Other(format!("Invalid base URL {}: {}", base_url, e)))?;
    let next = Url::parse(link)
        .map_err(|e| ApiError::DecodeError(format!("Invalid next link {}: {}", link, e)))?;

    if next.origin() == base.origin() {
        Ok(next.into())
    } else {
        warn!(link, "Refusing next link outside the API origin");
        Err(ApiError::Other(format!(
            "Next link {} is not on {}",
            link,
            base.origin().ascii_serialization()
        )))
    }
}

fn transport_error(error: reqwest::Error, timeout_ms: u64) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout(timeout_ms)
    } else if error.is_decode() {
        ApiError::DecodeError(error.to_string())
    } else {
        ApiError::NetworkError(error.to_string())
    }
}

// Prefers the `detail` field, then the raw text, then the status reason
pub(crate) fn error_from_body(status: StatusCode, body: &[u8]) -> ApiError {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    if status == StatusCode::NOT_FOUND {
        ApiError::NotFound(detail)
    } else {
        ApiError::ApiResponseError {
            status_code: status.as_u16(),
            detail,
        }
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::DecodeError(e.to_string()))
}

#[async_trait]
impl ClientDirectory for HttpBackend {
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, ApiError> {
        let url = self.url(&format!("/api/clients/{}", client_id));
        match self.fetch(self.request(Method::GET, &url)).await {
            Ok(client) => Ok(Some(client)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search_clients(&self, query: &str) -> Result<Vec<Client>, ApiError> {
        let url = self.url("/api/clients");
        let builder = self
            .request(Method::GET, &url)
            .query(&[("search", query)]);
        let listing: Listing<Client> = self.fetch(builder).await?;
        Ok(listing.into_vec())
    }

    async fn create_client(&self, client: NewClient) -> Result<Client, ApiError> {
        let url = self.url("/api/clients");
        self.fetch(self.request(Method::POST, &url).json(&client))
            .await
    }
}

#[async_trait]
impl CardBackend for HttpBackend {
    async fn list_cards(&self, client_id: &str) -> Result<Vec<CardSummary>, ApiError> {
        let url = self.url(&format!("/api/clients/{}/cards", client_id));
        let listing: Listing<CardSummary> = self.fetch(self.request(Method::GET, &url)).await?;
        Ok(listing.into_vec())
    }

    async fn reveal_card(&self, client_id: &str, card_id: &str) -> Result<RevealedCard, ApiError> {
        let url = self.url(&format!("/api/clients/{}/cards/{}/reveal", client_id, card_id));
        self.fetch(self.request(Method::GET, &url)).await
    }

    async fn delete_card(&self, client_id: &str, card_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/clients/{}/cards/{}", client_id, card_id));
        self.send(self.request(Method::DELETE, &url), self.timeout_ms)
            .await
            .map(|_| ())
    }

    async fn create_card(&self, request: CardEntryRequest) -> Result<CardEntryOutcome, ApiError> {
        let url = self.url("/api/selenium/create-card");
        let timeout_ms = self.card_entry_timeout.as_millis() as u64;
        let builder = self
            .request(Method::POST, &url)
            .timeout(self.card_entry_timeout)
            .json(&request);

        let body = self.send(builder, timeout_ms).await.map_err(|e| {
            warn!(error = %e, "Card entry request failed");
            e
        })?;
        decode(&body)
    }
}

#[async_trait]
impl TripDirectory for HttpBackend {
    async fn list_trips(
        &self,
        client_id: &str,
        page_url: Option<&str>,
    ) -> Result<Page<Trip>, ApiError> {
        let builder = match page_url {
            Some(next) => self.request(Method::GET, &follow_link(&self.base_url, next)?),
            None => self
                .request(Method::GET, &self.url("/api/trips"))
                .query(&[("client_id", client_id)]),
        };
        self.fetch(builder).await
    }
}

#[async_trait]
impl SupplierBooking for HttpBackend {
    async fn submit_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, ApiError> {
        let url = self.url("/api/bookings");
        self.fetch(self.request(Method::POST, &url).json(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(StatusCode::BAD_REQUEST, br#"{"detail": "Price change detected, please refresh"}"#, "Price change detected, please refresh"; "json detail")]
    #[test_case(StatusCode::BAD_GATEWAY, b"upstream exploded", "upstream exploded"; "plain text body")]
    #[test_case(StatusCode::SERVICE_UNAVAILABLE, b"", "Service Unavailable"; "empty body")]
    #[test_case(StatusCode::BAD_REQUEST, br#"{"detail": null}"#, r#"{"detail": null}"#; "null detail")]
    fn test_error_detail_extraction(status: StatusCode, body: &[u8], expected: &str) {
        let error = error_from_body(status, body);
        assert_eq!(error.detail(), expected);
        assert_eq!(error.status_code(), Some(status.as_u16()));
    }

    #[test]
    fn test_not_found_maps_to_not_found() {
        let error = error_from_body(StatusCode::NOT_FOUND, br#"{"detail": "Client not found"}"#);
        assert_eq!(error, ApiError::NotFound("Client not found".to_string()));
    }

    #[test]
    fn test_listing_accepts_page_or_array() {
        let paged: Listing<CardSummary> = decode(
            br#"{"count": 1, "next": null, "previous": null, "results": [{"id": 7, "last_4": "4242"}]}"#,
        )
        .unwrap();
        let plain: Listing<CardSummary> = decode(br#"[{"id": "7", "last_4": "4242"}]"#).unwrap();

        assert_eq!(paged.into_vec()[0].id, "7");
        assert_eq!(plain.into_vec()[0].last_4, "4242");
    }

    #[test]
    fn test_malformed_trip_page_is_decode_error() {
        let result: Result<Page<Trip>, ApiError> =
            decode(br#"{"results": [{"id": "T1", "name": "No status"}]}"#);
        assert!(matches!(result, Err(ApiError::DecodeError(_))));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://api.test/", "/api/trips"), "http://api.test/api/trips");
    }

    #[test_case("http://api.test", "/api/trips?page=2", "http://api.test/api/trips?page=2"; "relative link")]
    #[test_case("https://api.test", "https://api.test/api/trips?page=2", "https://api.test/api/trips?page=2"; "same origin")]
    #[test_case("https://api.test:443", "https://api.test/api/trips?page=3", "https://api.test/api/trips?page=3"; "default port")]
    fn test_follow_link_accepts(base: &str, link: &str, expected: &str) {
        assert_eq!(follow_link(base, link).unwrap(), expected);
    }

    #[test_case("https://api.test", "https://attacker.test/api/trips?page=2"; "foreign host")]
    #[test_case("https://api.test", "http://api.test/api/trips?page=2"; "scheme downgrade")]
    #[test_case("https://api.test", "https://api.test:8443/api/trips?page=2"; "other port")]
    #[test_case("https://api.test", "https://api.test.attacker.test/api/trips"; "suffixed host")]
    fn test_follow_link_rejects_other_origins(base: &str, link: &str) {
        assert!(matches!(follow_link(base, link), Err(ApiError::Other(_))));
    }

    #[tokio::test]
    async fn test_foreign_next_link_is_not_requested() {
        let config = CheckoutConfig {
            base_url: "https://api.test".to_string(),
            api_key: "secret".to_string(),
            ..Default::default()
        };
        let backend = HttpBackend::new(&config).unwrap();

        let result = backend
            .list_trips("C1", Some("https://attacker.test/api/trips?page=2"))
            .await;

        assert!(matches!(result, Err(ApiError::Other(_))));
    }

    #[test]
    fn test_backend_rejects_invalid_config() {
        let config = CheckoutConfig {
            base_url: " ".to_string(),
            ..Default::default()
        };
        assert!(HttpBackend::new(&config).is_err());
        assert!(HttpBackend::new(&CheckoutConfig::default()).is_ok());
    }
}
