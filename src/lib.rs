// Booking checkout orchestration: turns a selected rate into a confirmed or rejected booking

// Building blocks
pub mod backend;
pub mod config;
pub mod http;
pub mod models;
pub mod reveal_cache;
pub mod session;

// Checkout components
pub mod booking;
pub mod card_entry;
pub mod card_vault;
pub mod checkout;
pub mod client_resolver;
pub mod price_guard;
pub mod trips;

// Re-export key types for convenience
pub use backend::{ApiError, CardBackend, ClientDirectory, SupplierBooking, TripDirectory};
pub use booking::{BookingError, BookingSubmitter, ValidationError};
pub use card_entry::{CardCreationFlow, CardCreationState, CardEntryError, CreationFailure, CreationStep};
pub use card_vault::{derive_billing_address, CardVault, VaultError};
pub use checkout::{CheckoutError, CheckoutOrchestrator, CheckoutSnapshot};
pub use client_resolver::{ClientError, ClientMappingStore, ClientResolver, InMemoryClientMappings};
pub use config::{CheckoutConfig, ConfigError};
pub use http::HttpBackend;
pub use models::{
    BillingAddress, BookingConfirmation, BookingContext, BookingRequest, CardEntryFields,
    CardSummary, Client, RevealedCard, Trip, TripStatus, UserIdentity,
};
pub use price_guard::{FailureClassification, FailureKind, PriceConsistencyGuard, Remedy};
pub use reveal_cache::{RevealCache, RevealCacheStatsReport};
pub use session::SessionContext;
pub use trips::{
    browse, TripDefault, TripError, TripFilter, TripMode, TripRef, TripSearchField, TripSelection,
    TripSelector,
};
