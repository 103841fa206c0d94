// Service seams for the external collaborators of the checkout flow
// Each collaborator is an async trait so the HTTP backend and the test backend are interchangeable

use crate::models::{
    BookingConfirmation, BookingRequest, CardEntryOutcome, CardEntryRequest, CardSummary, Client,
    NewClient, Page, RevealedCard, Trip,
};
use async_trait::async_trait;
use thiserror::Error;

// Transport-level failures shared by every backend call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {detail}")]
    ApiResponseError { status_code: u16, detail: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    DecodeError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ApiError {
    // Raw detail text as reported by the backend, falling back to the error message
    pub fn detail(&self) -> String {
        match self {
            ApiError::ApiResponseError { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::ApiResponseError { status_code, .. } => Some(*status_code),
            ApiError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

// Maps a user identity to durable client records
#[async_trait]
pub trait ClientDirectory: Send + Sync + 'static {
    // None when the client no longer exists upstream
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, ApiError>;

    async fn search_clients(&self, query: &str) -> Result<Vec<Client>, ApiError>;

    async fn create_client(&self, client: NewClient) -> Result<Client, ApiError>;
}

// Payment-card vault with the tokenize/reveal boundary
#[async_trait]
pub trait CardBackend: Send + Sync + 'static {
    async fn list_cards(&self, client_id: &str) -> Result<Vec<CardSummary>, ApiError>;

    async fn reveal_card(&self, client_id: &str, card_id: &str) -> Result<RevealedCard, ApiError>;

    async fn delete_card(&self, client_id: &str, card_id: &str) -> Result<(), ApiError>;

    // Delegates to the automated card-entry workflow; slow
    async fn create_card(&self, request: CardEntryRequest) -> Result<CardEntryOutcome, ApiError>;
}

#[async_trait]
pub trait TripDirectory: Send + Sync + 'static {
    // `page_url` is the `next` link of a previous page, None for the first page
    async fn list_trips(
        &self,
        client_id: &str,
        page_url: Option<&str>,
    ) -> Result<Page<Trip>, ApiError>;
}

#[async_trait]
pub trait SupplierBooking: Send + Sync + 'static {
    async fn submit_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, ApiError>;
}
