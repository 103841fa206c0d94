// Single entry point for a checkout session, consumed by whatever presentation layer drives it

use crate::backend::{CardBackend, ClientDirectory, SupplierBooking, TripDirectory};
use crate::booking::{BookingError, BookingSubmitter};
use crate::card_entry::{CardCreationFlow, CardCreationState, CardEntryError};
use crate::card_vault::{CardVault, VaultError};
use crate::client_resolver::{ClientError, ClientMappingStore, ClientResolver};
use crate::config::CheckoutConfig;
use crate::models::{
    BookingConfirmation, BookingContext, CardEntryFields, CardSummary, RevealedCard, Trip,
    UserIdentity,
};
use crate::session::SessionContext;
use crate::trips::{
    browse, TripDefault, TripError, TripFilter, TripMode, TripRef, TripSelection, TripSelector,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Trip(#[from] TripError),

    #[error(transparent)]
    CardEntry(#[from] CardEntryError),

    #[error("No client resolved for this checkout")]
    NoClient,

    #[error("Trip {0} is not among the client's trips")]
    UnknownTrip(String),
}

// Cards and trips degrade independently; a failed section carries its own error
#[derive(Debug)]
pub struct CheckoutSnapshot {
    pub client_id: String,
    pub cards: Result<Vec<CardSummary>, VaultError>,
    pub trips: Result<Vec<Trip>, TripError>,
    pub trip_default: Option<TripDefault>,
}

pub struct CheckoutOrchestrator {
    session: Arc<SessionContext>,
    resolver: ClientResolver,
    vault: Arc<CardVault>,
    trip_selector: TripSelector,
    submitter: BookingSubmitter,
    card_creation: CardCreationFlow,
    trips: RwLock<Vec<Trip>>,
    trip_selection: Mutex<TripSelection>,
}

impl CheckoutOrchestrator {
    pub fn new<B>(
        backend: Arc<B>,
        mappings: Arc<dyn ClientMappingStore>,
        identity: UserIdentity,
        config: &CheckoutConfig,
    ) -> Self
    where
        B: ClientDirectory + CardBackend + TripDirectory + SupplierBooking,
    {
        let session = Arc::new(SessionContext::new(identity));
        let vault = Arc::new(CardVault::new(backend.clone(), Arc::clone(&session)));

        Self {
            resolver: ClientResolver::new(backend.clone(), mappings),
            trip_selector: TripSelector::new(backend.clone(), config.max_trip_pages),
            submitter: BookingSubmitter::new(backend, Arc::clone(&vault), Arc::clone(&session)),
            card_creation: CardCreationFlow::new(Arc::clone(&vault), config.progress_tick()),
            vault,
            session,
            trips: RwLock::new(Vec::new()),
            trip_selection: Mutex::new(TripSelection::default()),
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub async fn resolve_client(&self) -> Result<String, ClientError> {
        let client_id = self.resolver.resolve(self.session.identity()).await?;
        self.session.set_client_id(&client_id);
        Ok(client_id)
    }

    // Resolves the client, then lists cards and trips concurrently
    pub async fn load(&self) -> Result<CheckoutSnapshot, ClientError> {
        let client_id = self.resolve_client().await?;

        let (cards, trips) = futures::join!(
            self.vault.list_cards(&client_id),
            self.trip_selector.load(&client_id)
        );

        if let Err(e) = &cards {
            warn!(client_id = %client_id, error = %e, "Card section unavailable");
        }

        let trip_default = match &trips {
            Ok(loaded) => {
                let default = TripSelector::classify(loaded);
                *self.trips.write() = loaded.clone();
                *self.trip_selection.lock() = TripSelection::from_default(&default);
                Some(default)
            }
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Trip section unavailable");
                None
            }
        };

        info!(
            client_id = %client_id,
            cards = cards.as_ref().map_or(0, |c| c.len()),
            trips = trips.as_ref().map_or(0, |t| t.len()),
            "Checkout loaded"
        );

        Ok(CheckoutSnapshot {
            client_id,
            cards,
            trips,
            trip_default,
        })
    }

    fn client_id(&self) -> Result<String, CheckoutError> {
        self.session.client_id().ok_or(CheckoutError::NoClient)
    }

    pub async fn refresh_cards(&self) -> Result<Vec<CardSummary>, CheckoutError> {
        let client_id = self.client_id()?;
        Ok(self.vault.list_cards(&client_id).await?)
    }

    pub fn cards(&self) -> Vec<CardSummary> {
        self.vault.cards()
    }

    pub fn select_card(&self, card_id: &str) -> Result<CardSummary, CheckoutError> {
        Ok(self.vault.select_card(card_id)?)
    }

    pub fn selected_card(&self) -> Option<String> {
        self.vault.selected_card()
    }

    pub async fn reveal_card(&self, card_id: &str) -> Result<RevealedCard, CheckoutError> {
        let client_id = self.client_id()?;
        Ok(self.vault.reveal(&client_id, card_id).await?)
    }

    pub async fn delete_card(&self, card_id: &str) -> Result<(), CheckoutError> {
        let client_id = self.client_id()?;
        Ok(self.vault.delete_card(&client_id, card_id).await?)
    }

    pub fn trips(&self) -> Vec<Trip> {
        self.trips.read().clone()
    }

    pub fn browse_trips(&self, filter: &TripFilter) -> Vec<Trip> {
        browse(&self.trips.read(), filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn trip_selection(&self) -> TripSelection {
        self.trip_selection.lock().clone()
    }

    pub fn set_trip_mode(&self, mode: TripMode) {
        self.trip_selection.lock().set_mode(mode);
    }

    pub fn set_new_trip_name(&self, name: &str) {
        self.trip_selection.lock().set_new_trip_name(name);
    }

    // Picking a trip, from the default list or the browse view, switches to the existing-trip mode
    pub fn select_trip(&self, trip_id: &str) -> Result<TripRef, CheckoutError> {
        let trip = self
            .trips
            .read()
            .iter()
            .find(|t| t.id == trip_id)
            .map(TripRef::from)
            .ok_or_else(|| CheckoutError::UnknownTrip(trip_id.to_string()))?;
        self.trip_selection.lock().select_trip(trip.clone());
        Ok(trip)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitter.is_submitting()
    }

    pub async fn submit(
        &self,
        context: &BookingContext,
    ) -> Result<BookingConfirmation, BookingError> {
        let client_id = self.session.client_id();
        let card_id = self.vault.selected_card();
        let trip = self.trip_selection();

        self.submitter
            .submit(context, client_id.as_deref(), card_id.as_deref(), &trip)
            .await
    }

    // A successful creation re-fetches the card list so the new card can be selected
    pub async fn create_card(
        &self,
        checkout_url: &str,
        fields: CardEntryFields,
    ) -> Result<CardCreationState, CheckoutError> {
        let client_label = self.session.identity().email.clone();
        let state = self
            .card_creation
            .submit(checkout_url, fields, &client_label)
            .await?;

        if matches!(state.step, crate::card_entry::CreationStep::Succeeded { .. }) {
            if let Some(client_id) = self.session.client_id() {
                if let Err(e) = self.vault.list_cards(&client_id).await {
                    warn!(client_id = %client_id, error = %e, "Card list refresh after creation failed");
                }
            }
        }
        Ok(state)
    }

    pub fn card_creation_updates(&self) -> watch::Receiver<CardCreationState> {
        self.card_creation.subscribe()
    }

    pub fn cancel_card_creation(&self) -> bool {
        self.card_creation.cancel()
    }

    pub fn retry_card_creation(&self) -> Result<(), CheckoutError> {
        Ok(self.card_creation.retry()?)
    }

    pub fn leave_checkout(&self) {
        self.vault.clear_selection();
        self.session.leave_checkout();
    }

    pub fn sign_out(&self) {
        self.vault.clear_selection();
        self.trips.write().clear();
        *self.trip_selection.lock() = TripSelection::default();
        self.session.sign_out();
    }
}
