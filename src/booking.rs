// Composes and submits the supplier booking request for one checkout

use crate::backend::SupplierBooking;
use crate::card_vault::{CardVault, VaultError};
use crate::models::{BillingAddress, BookingConfirmation, BookingContext, BookingRequest};
use crate::price_guard::{FailureClassification, PriceConsistencyGuard, Remedy};
use crate::session::SessionContext;
use crate::trips::{ResolvedTrip, TripSelection};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_ROOM_DESCRIPTION: &str = "Standard Room";

const DATE_FORMAT: &str = "%Y-%m-%d";

// Local precondition failures; no network call has been made when one of these is returned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No client has been resolved for this checkout")]
    MissingClient,

    #[error("No payment card selected")]
    MissingCard,

    #[error("Card {0} is not in the client's current card list")]
    CardNotListed(String),

    #[error("Missing cart id; rates must be fetched again")]
    MissingCartId,

    #[error("Missing required booking field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("An existing trip must be selected")]
    TripNotSelected,
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A booking submission is already in progress")]
    SubmissionInProgress,

    #[error("Billing address unavailable for card {card_id}: {source}")]
    BillingUnavailable {
        card_id: String,
        #[source]
        source: VaultError,
    },

    #[error("Booking rejected: {0}")]
    Rejected(FailureClassification),
}

impl BookingError {
    pub fn remedy(&self) -> Option<Remedy> {
        match self {
            BookingError::Rejected(classification) => Some(classification.remedy()),
            BookingError::BillingUnavailable { .. } => Some(Remedy::Retry),
            _ => None,
        }
    }
}

// Numeric fields of the context after validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedContext {
    pub expected_amount: f64,
    pub number_of_adults: u32,
}

pub fn validate_context(context: &BookingContext) -> Result<ValidatedContext, ValidationError> {
    if context.cart_id.trim().is_empty() {
        return Err(ValidationError::MissingCartId);
    }

    let required = [
        ("hotel_id", &context.hotel_id),
        ("hotel_name", &context.hotel_name),
        ("start_date", &context.start_date),
        ("end_date", &context.end_date),
        ("rate_code", &context.rate_code),
        ("rate_id", &context.rate_id),
        ("expected_amount", &context.expected_amount),
        ("expected_currency", &context.expected_currency),
        ("currency", &context.currency),
        ("supplier_program_id", &context.supplier_program_id),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ValidationError::MissingField(*field));
    }

    let start = parse_date("start_date", &context.start_date)?;
    let end = parse_date("end_date", &context.end_date)?;
    if end <= start {
        return Err(ValidationError::InvalidField {
            field: "end_date",
            reason: format!("{} is not after {}", context.end_date, context.start_date),
        });
    }

    let expected_amount = context
        .expected_amount
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite() && *amount >= 0.0)
        .ok_or_else(|| ValidationError::InvalidField {
            field: "expected_amount",
            reason: format!("'{}' is not a non-negative number", context.expected_amount),
        })?;

    let number_of_adults = context
        .adults
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|adults| *adults > 0)
        .ok_or_else(|| ValidationError::InvalidField {
            field: "adults",
            reason: format!("'{}' is not a positive integer", context.adults),
        })?;

    Ok(ValidatedContext {
        expected_amount,
        number_of_adults,
    })
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        ValidationError::InvalidField {
            field,
            reason: format!("'{}' is not YYYY-MM-DD ({})", value, e),
        }
    })
}

pub fn compose_request(
    context: &BookingContext,
    validated: ValidatedContext,
    client_id: &str,
    card_id: &str,
    trip: ResolvedTrip,
    billing_address: BillingAddress,
) -> BookingRequest {
    let room_description = match context.description.trim() {
        "" => DEFAULT_ROOM_DESCRIPTION.to_string(),
        description => description.to_string(),
    };

    BookingRequest {
        booking_code: context.rate_code.clone(),
        cart_id: context.cart_id.clone(),
        children_ages: Vec::new(),
        client_card_id: card_id.to_string(),
        client_id: client_id.to_string(),
        client_loyalty_program_id: None,
        currency: context.currency.clone(),
        deposits: Vec::new(),
        end_date: context.end_date.clone(),
        expected_amount: validated.expected_amount,
        expected_currency: context.expected_currency.clone(),
        number_of_adults: validated.number_of_adults,
        program_id: context.supplier_program_id.clone(),
        rate_code: context.rate_code.clone(),
        rate_id: context.rate_id.clone(),
        room_description,
        start_date: context.start_date.clone(),
        supplier_id: context.supplier_id.clone(),
        supplier_program_id: context.supplier_program_id.clone(),
        trip_id: trip.trip_id,
        trip_name: trip.trip_name,
        use_advisor_contact_info: false,
        billing_address: Some(billing_address),
    }
}

// Clears the in-flight flag when the submission ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BookingSubmitter {
    supplier: Arc<dyn SupplierBooking>,
    vault: Arc<CardVault>,
    session: Arc<SessionContext>,
    in_flight: AtomicBool,
}

impl BookingSubmitter {
    pub fn new(
        supplier: Arc<dyn SupplierBooking>,
        vault: Arc<CardVault>,
        session: Arc<SessionContext>,
    ) -> Self {
        Self {
            supplier,
            vault,
            session,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn submit(
        &self,
        context: &BookingContext,
        client_id: Option<&str>,
        card_id: Option<&str>,
        trip: &TripSelection,
    ) -> Result<BookingConfirmation, BookingError> {
        let _in_flight =
            InFlight::acquire(&self.in_flight).ok_or(BookingError::SubmissionInProgress)?;

        let client_id = client_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ValidationError::MissingClient)?;
        let card_id = card_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ValidationError::MissingCard)?;
        // Reveals are only allowed for cards the vault has listed
        if !self.vault.is_listed(card_id) {
            return Err(ValidationError::CardNotListed(card_id.to_string()).into());
        }
        let validated = validate_context(context)?;
        let resolved_trip = trip.resolve(&self.session.identity().email, &context.hotel_name)?;

        let billing_address = self
            .vault
            .billing_address(client_id, card_id)
            .await
            .map_err(|source| BookingError::BillingUnavailable {
                card_id: card_id.to_string(),
                source,
            })?;

        let request = compose_request(
            context,
            validated,
            client_id,
            card_id,
            resolved_trip,
            billing_address,
        );

        info!(
            hotel_id = %context.hotel_id,
            cart_id = %context.cart_id,
            client_id,
            card_id,
            new_trip = request.trip_id.is_none(),
            "Submitting booking"
        );

        match self.supplier.submit_booking(&request).await {
            Ok(confirmation) => {
                info!(booking_id = %confirmation.id, hotel_id = %context.hotel_id, "Booking confirmed");
                Ok(confirmation)
            }
            Err(error) => {
                let classification = PriceConsistencyGuard::classify(&error);
                warn!(
                    hotel_id = %context.hotel_id,
                    kind = ?classification.kind,
                    error = %error,
                    "Booking rejected"
                );
                debug!(remedy = ?classification.remedy(), "Booking failure classified");
                Err(BookingError::Rejected(classification))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_backend::{card, revealed, MockBackend};
    use crate::backend::ApiError;
    use crate::models::UserIdentity;
    use crate::price_guard::FailureKind;
    use crate::trips::TripRef;
    use test_case::test_case;
    use tokio_test::assert_ok;

    fn hotel_x_context() -> BookingContext {
        BookingContext {
            hotel_id: "H1".to_string(),
            hotel_name: "Hotel X".to_string(),
            start_date: "2025-08-14".to_string(),
            end_date: "2025-08-16".to_string(),
            adults: "2".to_string(),
            rate_code: "R1".to_string(),
            rate_id: "RATE1".to_string(),
            expected_amount: "400".to_string(),
            expected_currency: "USD".to_string(),
            currency: "USD".to_string(),
            cart_id: "CART1".to_string(),
            supplier_id: "H1".to_string(),
            supplier_program_id: "P1".to_string(),
            description: "".to_string(),
        }
    }

    struct Fixture {
        backend: Arc<MockBackend>,
        session: Arc<SessionContext>,
        vault: Arc<CardVault>,
        submitter: BookingSubmitter,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(MockBackend::new());
        backend.add_card("C1", card("CARD1", "4242"), revealed("4242"));
        let session = Arc::new(SessionContext::new(UserIdentity::new(
            "u1",
            "user@example.com",
        )));
        let vault = Arc::new(CardVault::new(backend.clone(), session.clone()));
        let submitter = BookingSubmitter::new(backend.clone(), vault.clone(), session.clone());
        vault.list_cards("C1").await.unwrap();
        Fixture {
            backend,
            session,
            vault,
            submitter,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_new_trip_booking() {
        let f = fixture().await;

        let confirmation = f
            .submitter
            .submit(
                &hotel_x_context(),
                Some("C1"),
                Some("CARD1"),
                &TripSelection::new_trip(""),
            )
            .await
            .unwrap();

        assert!(confirmation.id.starts_with("booking-"));
        assert_eq!(f.backend.reveal_calls.load(Ordering::SeqCst), 1);
        assert!(f.session.reveal_cache().contains("CARD1"));

        let request = f.backend.last_booking().unwrap();
        assert_eq!(request.room_description, "Standard Room");
        assert_eq!(request.trip_id, None);
        assert_eq!(request.trip_name, "user@example.com client's Hotel X Trip");
        assert_eq!(request.booking_code, "R1");
        assert_eq!(request.program_id, "P1");
        assert_eq!(request.expected_amount, 400.0);
        assert_eq!(request.number_of_adults, 2);
        assert_eq!(request.client_card_id, "CARD1");
        assert!(request.children_ages.is_empty());
        assert!(request.deposits.is_empty());
        assert!(!request.use_advisor_contact_info);

        let billing = request.billing_address.unwrap();
        assert_eq!(billing.address_1, "16075 Surprise Ln");
        assert_eq!(billing.address_2, "Apt 1");
        assert_eq!(billing.country_id, 1);
        assert!(!f.submitter.is_submitting());
    }

    #[tokio::test]
    async fn test_missing_card_makes_no_network_call() {
        let f = fixture().await;

        let result = f
            .submitter
            .submit(&hotel_x_context(), Some("C1"), None, &TripSelection::default())
            .await;

        assert!(matches!(
            result,
            Err(BookingError::Validation(ValidationError::MissingCard))
        ));
        assert_eq!(f.backend.booking_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.backend.reveal_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unlisted_card_is_rejected_before_reveal() {
        let f = fixture().await;

        let result = f
            .submitter
            .submit(&hotel_x_context(), Some("C1"), Some("CARD9"), &TripSelection::default())
            .await;

        assert!(matches!(
            result,
            Err(BookingError::Validation(ValidationError::CardNotListed(ref id))) if id == "CARD9"
        ));
        assert_eq!(f.backend.reveal_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.backend.booking_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_client_and_cart_are_validation_failures() {
        let f = fixture().await;

        let no_client = f
            .submitter
            .submit(&hotel_x_context(), None, Some("CARD1"), &TripSelection::default())
            .await;
        assert!(matches!(
            no_client,
            Err(BookingError::Validation(ValidationError::MissingClient))
        ));

        let mut context = hotel_x_context();
        context.cart_id.clear();
        let no_cart = f
            .submitter
            .submit(&context, Some("C1"), Some("CARD1"), &TripSelection::default())
            .await;
        assert!(matches!(
            no_cart,
            Err(BookingError::Validation(ValidationError::MissingCartId))
        ));
        assert_eq!(f.backend.booking_calls.load(Ordering::SeqCst), 0);
    }

    #[test_case("start_date", "2025/08/14"; "slashed start date")]
    #[test_case("end_date", "2025-08-13"; "end before start")]
    #[test_case("expected_amount", "-5"; "negative amount")]
    #[test_case("expected_amount", "four hundred"; "non numeric amount")]
    #[test_case("adults", "0"; "zero adults")]
    fn test_invalid_context_fields(field: &str, value: &str) {
        let mut context = hotel_x_context();
        match field {
            "start_date" => context.start_date = value.to_string(),
            "end_date" => context.end_date = value.to_string(),
            "expected_amount" => context.expected_amount = value.to_string(),
            "adults" => context.adults = value.to_string(),
            _ => unreachable!(),
        }

        match validate_context(&context) {
            Err(ValidationError::InvalidField { field: reported, .. }) => {
                assert_eq!(reported, field)
            }
            other => panic!("expected invalid {}, got {:?}", field, other),
        }
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let mut context = hotel_x_context();
        context.supplier_program_id = " ".to_string();

        assert_eq!(
            validate_context(&context),
            Err(ValidationError::MissingField("supplier_program_id"))
        );
    }

    #[tokio::test]
    async fn test_price_drift_offers_refresh() {
        let f = fixture().await;
        f.backend
            .reject_bookings_with("Price change detected, please refresh");

        let result = f
            .submitter
            .submit(&hotel_x_context(), Some("C1"), Some("CARD1"), &TripSelection::default())
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.remedy(), Some(Remedy::RefreshRates));
        match error {
            BookingError::Rejected(classification) => {
                assert_eq!(classification.kind, FailureKind::PriceDrift)
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generic_failure_then_retry_succeeds() {
        let f = fixture().await;
        f.backend.fail_bookings_with(ApiError::Timeout(20_000));
        let context = hotel_x_context();
        let trip = TripSelection::default();

        let first = f
            .submitter
            .submit(&context, Some("C1"), Some("CARD1"), &trip)
            .await;
        assert_eq!(first.unwrap_err().remedy(), Some(Remedy::Retry));

        f.backend.accept_bookings();
        assert_ok!(
            f.submitter
                .submit(&context, Some("C1"), Some("CARD1"), &trip)
                .await
        );
        // Billing data came from the cache the second time
        assert_eq!(f.backend.reveal_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.backend.booking_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_submit_while_pending_is_rejected() {
        let f = fixture().await;
        f.backend.set_booking_delay(50);
        let context = hotel_x_context();
        let trip = TripSelection::default();

        let (a, b) = tokio::join!(
            f.submitter.submit(&context, Some("C1"), Some("CARD1"), &trip),
            async {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                f.submitter
                    .submit(&context, Some("C1"), Some("CARD1"), &trip)
                    .await
            }
        );

        assert_ok!(a);
        assert!(matches!(b, Err(BookingError::SubmissionInProgress)));
        assert_eq!(f.backend.booking_calls.load(Ordering::SeqCst), 1);
        assert!(!f.submitter.is_submitting());
    }

    #[tokio::test]
    async fn test_reveal_failure_blocks_submission() {
        let f = fixture().await;
        f.backend.fail_next_reveals(1);

        let result = f
            .submitter
            .submit(&hotel_x_context(), Some("C1"), Some("CARD1"), &TripSelection::default())
            .await;

        assert!(matches!(result, Err(BookingError::BillingUnavailable { .. })));
        assert_eq!(f.backend.booking_calls.load(Ordering::SeqCst), 0);
        assert!(f.vault.cached_reveal("CARD1").is_none());
    }

    #[tokio::test]
    async fn test_existing_trip_is_referenced() {
        let f = fixture().await;
        let trip = TripSelection::existing(TripRef {
            id: "T1".to_string(),
            name: "Lisbon".to_string(),
        });
        let mut context = hotel_x_context();
        context.description = "Deluxe King".to_string();

        f.submitter
            .submit(&context, Some("C1"), Some("CARD1"), &trip)
            .await
            .unwrap();

        let request = f.backend.last_booking().unwrap();
        assert_eq!(request.trip_id.as_deref(), Some("T1"));
        assert_eq!(request.trip_name, "Lisbon");
        assert_eq!(request.room_description, "Deluxe King");
    }
}
