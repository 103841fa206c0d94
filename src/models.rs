// Wire and domain types for the checkout flow
// Every backend payload deserializes into a closed shape so malformed data fails at the boundary

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

// Accepts `"12"` or `12` and yields a string; the vault is not consistent about it
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string_or_number(deserializer)?.unwrap_or_default())
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, found {}",
            other
        ))),
    }
}

// Identity supplied by the session service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

// Client directory records
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Client {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub emails: Vec<ClientEmail>,
    #[serde(default)]
    pub phone_numbers: Vec<ClientPhoneNumber>,
    #[serde(default)]
    pub addresses: Vec<ClientAddress>,
}

impl Client {
    pub fn has_email(&self, email: &str) -> bool {
        self.emails
            .iter()
            .any(|e| e.email.eq_ignore_ascii_case(email.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ClientEmail {
    pub email: String,
    #[serde(default)]
    pub email_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ClientPhoneNumber {
    pub phone_number: String,
    #[serde(default)]
    pub number_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ClientAddress {
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub country_id: Option<String>,
    #[serde(default)]
    pub country_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub emails: Vec<ClientEmail>,
}

impl NewClient {
    // Display name is the email, last name stays empty
    pub fn from_email(email: &str) -> Self {
        Self {
            first_name: email.to_string(),
            last_name: String::new(),
            emails: vec![ClientEmail {
                email: email.to_string(),
                email_type: "personal".to_string(),
            }],
        }
    }
}

// Paginated listing envelope used by the directory services
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn single(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            next: None,
            previous: None,
            results,
        }
    }
}

// Non-sensitive stored card
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CardSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub holder_name: String,
    #[serde(default)]
    pub last_4: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expire_month: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expire_year: String,
    #[serde(default)]
    pub card_logo: String,
}

impl CardSummary {
    pub fn expiry_label(&self) -> String {
        format!("{:0>2}/{}", self.expire_month, self.expire_year)
    }
}

// Sensitive card data returned by a reveal; lives only in the session cache
#[derive(Clone, PartialEq, Deserialize, Serialize)]
pub struct RevealedCard {
    pub card_data: RevealedCardData,
    #[serde(default)]
    pub number_token: String,
    #[serde(default)]
    pub cvv_token: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub tokenex_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RevealedCardData {
    #[serde(default)]
    pub first_6: String,
    #[serde(default)]
    pub last_4: String,
    #[serde(default)]
    pub holder_name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expire_month: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expire_year: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub address_additional: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_id: Option<u32>,
    #[serde(default)]
    pub card_logo: String,
}

// Only the last 4 digits may reach logs
impl fmt::Debug for RevealedCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealedCard")
            .field("last_4", &self.card_data.last_4)
            .field("card_logo", &self.card_data.card_logo)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for RevealedCardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealedCardData")
            .field("last_4", &self.last_4)
            .finish_non_exhaustive()
    }
}

// Trips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Upcoming,
    Cancelled,
    #[serde(alias = "past")]
    Completed,
    #[serde(other)]
    Other,
}

impl TripStatus {
    pub fn is_active(self) -> bool {
        !matches!(self, TripStatus::Cancelled | TripStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trip {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    pub status: TripStatus,
    #[serde(default)]
    pub image: Vec<TripImage>,
    #[serde(default)]
    pub clients: Vec<TripClient>,
    #[serde(default)]
    pub commission_summary: Option<CommissionSummary>,
    #[serde(default)]
    pub booking_summary: Option<BookingSummary>,
}

impl Trip {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TripImage {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub public_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TripClient {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub preferred_name: Option<String>,
}

impl TripClient {
    pub fn display_name(&self) -> String {
        match self.preferred_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("{} {}", self.first_name, self.last_name)
                .trim()
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct CommissionSummary {
    #[serde(default, deserialize_with = "string_or_number")]
    pub total_value: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub advisor_value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct BookingSummary {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub draft_total: u32,
}

// Rate-selection context; immutable once built, refreshed only by re-selecting a rate
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct BookingContext {
    pub hotel_id: String,
    pub hotel_name: String,
    pub start_date: String,
    pub end_date: String,
    pub adults: String,
    pub rate_code: String,
    pub rate_id: String,
    pub expected_amount: String,
    pub expected_currency: String,
    pub currency: String,
    #[serde(default)]
    pub cart_id: String,
    #[serde(default)]
    pub supplier_id: String,
    pub supplier_program_id: String,
    #[serde(default)]
    pub description: String,
}

impl BookingContext {
    // Builds the context from the parameters handed over by rate selection
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| params.get(key).map(|v| v.trim().to_string()).unwrap_or_default();

        let hotel_id = get("hotel_id");
        let adults = Some(get("adults"))
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "2".to_string());
        let supplier_id = Some(get("supplier_id"))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| hotel_id.clone());

        Self {
            hotel_name: get("hotel_name"),
            start_date: get("start_date"),
            end_date: get("end_date"),
            adults,
            rate_code: get("rate_code"),
            rate_id: get("rate_id"),
            expected_amount: get("expected_amount"),
            expected_currency: get("expected_currency"),
            currency: get("currency"),
            cart_id: get("cart_id"),
            supplier_id,
            supplier_program_id: get("supplier_program_id"),
            description: get("description"),
            hotel_id,
        }
    }
}

// Billing sub-object of the booking payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct BillingAddress {
    pub address_1: String,
    #[serde(default)]
    pub address_2: String,
    pub postal_code: String,
    pub city: String,
    pub state: String,
    pub country_id: u32,
}

// Payload accepted by the supplier booking service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub booking_code: String,
    pub cart_id: String,
    pub children_ages: Vec<u32>,
    pub client_card_id: String,
    pub client_id: String,
    pub client_loyalty_program_id: Option<String>,
    pub currency: String,
    pub deposits: Vec<serde_json::Value>,
    pub end_date: String,
    pub expected_amount: f64,
    pub expected_currency: String,
    pub number_of_adults: u32,
    pub program_id: String,
    pub rate_code: String,
    pub rate_id: String,
    pub room_description: String,
    pub start_date: String,
    pub supplier_id: String,
    pub supplier_program_id: String,
    pub trip_id: Option<String>,
    pub trip_name: String,
    pub use_advisor_contact_info: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<BillingAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BookingConfirmation {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

// Error body returned by the backend on rejection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

// Out-of-band card creation
#[derive(Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEntryFields {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
    pub name: String,
    pub address: String,
    pub card_label: String,
    #[serde(default)]
    pub apartment: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

impl fmt::Debug for CardEntryFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .number
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        f.debug_struct("CardEntryFields")
            .field("number", &format!("****{}", tail))
            .field("card_label", &self.card_label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEntryRequest {
    pub checkout_url: String,
    pub form_fields: CardEntryFields,
    pub client_label: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CardEntryOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub progress_updates: Vec<ProgressUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProgressUpdate {
    pub message: String,
    pub percentage: u8,
    pub timestamp: i64,
}
