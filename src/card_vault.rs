// Stored payment cards: listing, selection, on-demand reveal and out-of-band creation

use crate::backend::{ApiError, CardBackend};
use crate::models::{
    BillingAddress, CardEntryFields, CardEntryOutcome, CardEntryRequest, CardSummary,
    RevealedCard,
};
use crate::session::SessionContext;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Card vault unavailable: {0}")]
    Unavailable(#[source] ApiError),

    #[error("Could not reveal card {card_id}: {source}")]
    RevealFailed {
        card_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not delete card {card_id}: {source}")]
    DeleteFailed {
        card_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Card {0} is not in the client's card list")]
    UnknownCard(String),

    #[error("Invalid card entry request: {0}")]
    InvalidCardEntry(String),

    #[error("Card entry workflow failed: {0}")]
    CardEntryFailed(#[source] ApiError),
}

pub struct CardVault {
    backend: Arc<dyn CardBackend>,
    session: Arc<SessionContext>,
    cards: RwLock<Vec<CardSummary>>,
    selected: RwLock<Option<String>>,
}

impl CardVault {
    pub fn new(backend: Arc<dyn CardBackend>, session: Arc<SessionContext>) -> Self {
        Self {
            backend,
            session,
            cards: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
        }
    }

    // Always hits the backend; a selection that disappeared from the list is dropped
    pub async fn list_cards(&self, client_id: &str) -> Result<Vec<CardSummary>, VaultError> {
        let cards = self
            .backend
            .list_cards(client_id)
            .await
            .map_err(VaultError::Unavailable)?;

        let mut selected = self.selected.write();
        if let Some(card_id) = selected.as_deref() {
            if !cards.iter().any(|c| c.id == card_id) {
                debug!(card_id, "Selected card no longer listed, clearing selection");
                *selected = None;
            }
        }
        *self.cards.write() = cards.clone();

        debug!(client_id, count = cards.len(), "Cards listed");
        Ok(cards)
    }

    pub fn cards(&self) -> Vec<CardSummary> {
        self.cards.read().clone()
    }

    pub fn select_card(&self, card_id: &str) -> Result<CardSummary, VaultError> {
        let card = self
            .cards
            .read()
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
            .ok_or_else(|| VaultError::UnknownCard(card_id.to_string()))?;
        *self.selected.write() = Some(card.id.clone());
        Ok(card)
    }

    pub fn selected_card(&self) -> Option<String> {
        self.selected.read().clone()
    }

    pub fn clear_selection(&self) {
        *self.selected.write() = None;
    }

    pub fn is_listed(&self, card_id: &str) -> bool {
        self.cards.read().iter().any(|c| c.id == card_id)
    }

    // Only listed cards can be revealed. At most one network call per card per session;
    // concurrent callers share it
    pub async fn reveal(&self, client_id: &str, card_id: &str) -> Result<RevealedCard, VaultError> {
        if !self.is_listed(card_id) {
            warn!(card_id, "Reveal requested for a card that is not listed");
            return Err(VaultError::UnknownCard(card_id.to_string()));
        }

        let backend = Arc::clone(&self.backend);
        let result = self
            .session
            .reveal_cache()
            .get_or_reveal(card_id, move || async move {
                debug!(card_id, "Revealing card");
                backend.reveal_card(client_id, card_id).await
            })
            .await;

        result.map_err(|source| {
            warn!(card_id, error = %source, "Card reveal failed");
            VaultError::RevealFailed {
                card_id: card_id.to_string(),
                source,
            }
        })
    }

    pub fn cached_reveal(&self, card_id: &str) -> Option<RevealedCard> {
        self.session.reveal_cache().get(card_id)
    }

    // Served from the reveal cache when the card was already revealed
    pub async fn billing_address(
        &self,
        client_id: &str,
        card_id: &str,
    ) -> Result<BillingAddress, VaultError> {
        let revealed = self.reveal(client_id, card_id).await?;
        Ok(derive_billing_address(&revealed))
    }

    pub async fn delete_card(&self, client_id: &str, card_id: &str) -> Result<(), VaultError> {
        self.backend
            .delete_card(client_id, card_id)
            .await
            .map_err(|source| VaultError::DeleteFailed {
                card_id: card_id.to_string(),
                source,
            })?;

        self.session.reveal_cache().evict(card_id);
        self.cards.write().retain(|c| c.id != card_id);
        let mut selected = self.selected.write();
        if selected.as_deref() == Some(card_id) {
            *selected = None;
        }

        info!(client_id, card_id, "Card deleted");
        Ok(())
    }

    // Long-running; a reported `success: false` comes back as Ok, transport failures as Err
    pub async fn request_card_creation(
        &self,
        checkout_url: &str,
        form_fields: CardEntryFields,
        client_label: &str,
    ) -> Result<CardEntryOutcome, VaultError> {
        if checkout_url.trim().is_empty() {
            return Err(VaultError::InvalidCardEntry(
                "checkout url is required".to_string(),
            ));
        }
        if form_fields.number.trim().is_empty() || form_fields.cvv.trim().is_empty() {
            return Err(VaultError::InvalidCardEntry(
                "card number and cvv are required".to_string(),
            ));
        }

        let request = CardEntryRequest {
            checkout_url: checkout_url.to_string(),
            form_fields,
            client_label: client_label.to_string(),
        };

        info!(client_label, "Delegating card creation to card-entry workflow");
        let outcome = self
            .backend
            .create_card(request)
            .await
            .map_err(VaultError::CardEntryFailed)?;

        if outcome.success {
            info!(client_label, updates = outcome.progress_updates.len(), "Card entry reported success");
        } else {
            warn!(client_label, message = ?outcome.message, "Card entry reported failure");
        }
        Ok(outcome)
    }
}

// Missing fields become empty strings; derivation itself never fails
pub fn derive_billing_address(card: &RevealedCard) -> BillingAddress {
    let data = &card.card_data;
    let text = |field: &Option<String>| field.as_deref().unwrap_or_default().trim().to_string();

    BillingAddress {
        address_1: text(&data.address),
        address_2: text(&data.address_additional),
        postal_code: text(&data.zip_code),
        city: text(&data.city),
        state: text(&data.state),
        country_id: data.country_id.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_backend::{card, revealed, MockBackend};
    use crate::models::UserIdentity;
    use std::sync::atomic::Ordering;
    use tokio_test::{assert_err, assert_ok};

    fn vault_with(backend: &Arc<MockBackend>) -> CardVault {
        let session = Arc::new(SessionContext::new(UserIdentity::new(
            "u1",
            "user@example.com",
        )));
        CardVault::new(backend.clone(), session)
    }

    fn backend_with_cards() -> Arc<MockBackend> {
        let backend = Arc::new(MockBackend::new());
        backend.add_card("C1", card("CARD1", "4242"), revealed("4242"));
        backend.add_card("C1", card("CARD2", "1881"), revealed("1881"));
        backend
    }

    #[tokio::test]
    async fn test_reveal_twice_issues_one_call() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);
        vault.list_cards("C1").await.unwrap();

        let first = vault.reveal("C1", "CARD1").await.unwrap();
        let second = vault.reveal("C1", "CARD1").await.unwrap();

        assert_eq!(backend.reveal_calls.load(Ordering::SeqCst), 1);
        assert!(first == second);
    }

    #[tokio::test]
    async fn test_concurrent_reveal_of_same_card_is_single_flight() {
        let backend = backend_with_cards();
        backend.set_reveal_delay(30);
        let vault = vault_with(&backend);
        vault.list_cards("C1").await.unwrap();

        let (a, b, c) = tokio::join!(
            vault.reveal("C1", "CARD1"),
            vault.reveal("C1", "CARD1"),
            vault.reveal("C1", "CARD2"),
        );

        assert_ok!(a);
        assert_ok!(b);
        assert_ok!(c);
        assert_eq!(backend.reveal_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_reveal_is_retried_next_time() {
        let backend = backend_with_cards();
        backend.fail_next_reveals(1);
        let vault = vault_with(&backend);
        vault.list_cards("C1").await.unwrap();

        let failed = vault.reveal("C1", "CARD1").await;
        assert!(matches!(failed, Err(VaultError::RevealFailed { ref card_id, .. }) if card_id == "CARD1"));

        // Other cards are unaffected by the failure
        assert_ok!(vault.reveal("C1", "CARD2").await);
        assert_ok!(vault.reveal("C1", "CARD1").await);
        assert_eq!(backend.reveal_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_listing_drops_stale_selection() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);

        vault.list_cards("C1").await.unwrap();
        assert_ok!(vault.select_card("CARD2"));
        assert_eq!(vault.selected_card().as_deref(), Some("CARD2"));

        backend.set_cards("C1", vec![card("CARD1", "4242")]);
        let cards = vault.list_cards("C1").await.unwrap();

        assert_eq!(cards.len(), 1);
        assert!(vault.selected_card().is_none());
        assert_eq!(backend.list_card_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_select_unlisted_card_fails() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);
        vault.list_cards("C1").await.unwrap();

        assert!(matches!(
            vault.select_card("CARD9"),
            Err(VaultError::UnknownCard(_))
        ));
    }

    #[tokio::test]
    async fn test_listing_failure_surfaces_unavailable() {
        let backend = backend_with_cards();
        backend.set_vault_down(true);
        let vault = vault_with(&backend);

        assert!(matches!(
            vault.list_cards("C1").await,
            Err(VaultError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_evicts_cache_and_selection() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);
        vault.list_cards("C1").await.unwrap();
        vault.select_card("CARD1").unwrap();
        vault.reveal("C1", "CARD1").await.unwrap();

        assert_ok!(vault.delete_card("C1", "CARD1").await);

        assert!(vault.cached_reveal("CARD1").is_none());
        assert!(vault.selected_card().is_none());
        assert_eq!(vault.cards().len(), 1);
        assert_err!(vault.delete_card("C1", "CARD1").await);
    }

    #[tokio::test]
    async fn test_billing_address_reuses_cached_reveal() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);
        vault.list_cards("C1").await.unwrap();
        vault.reveal("C1", "CARD1").await.unwrap();

        let address = vault.billing_address("C1", "CARD1").await.unwrap();

        assert_eq!(address.address_1, "16075 Surprise Ln");
        assert_eq!(address.postal_code, "92649");
        assert_eq!(address.country_id, 1);
        assert_eq!(backend.reveal_calls.load(Ordering::SeqCst), 1);

        let stats = vault.session.reveal_cache().stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 1);
    }

    #[tokio::test]
    async fn test_billing_address_on_cold_cache_counts_one_miss() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);
        vault.list_cards("C1").await.unwrap();

        vault.billing_address("C1", "CARD2").await.unwrap();

        let stats = vault.session.reveal_cache().stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 0);
        assert_eq!(stats.network_reveals, 1);
    }

    #[tokio::test]
    async fn test_unlisted_card_is_not_revealed() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);

        // Nothing listed yet
        assert!(matches!(
            vault.reveal("C1", "CARD1").await,
            Err(VaultError::UnknownCard(_))
        ));

        backend.set_cards("C1", vec![card("CARD1", "4242")]);
        vault.list_cards("C1").await.unwrap();
        assert!(matches!(
            vault.reveal("C1", "CARD2").await,
            Err(VaultError::UnknownCard(ref id)) if id == "CARD2"
        ));
        assert!(matches!(
            vault.billing_address("C1", "CARD2").await,
            Err(VaultError::UnknownCard(_))
        ));
        assert_eq!(backend.reveal_calls.load(Ordering::SeqCst), 0);
        assert!(vault.session.reveal_cache().is_empty());
    }

    #[test]
    fn test_missing_fields_derive_empty_strings() {
        let mut card = revealed("4242");
        card.card_data.address_additional = None;
        card.card_data.state = None;
        card.card_data.country_id = None;

        let address = derive_billing_address(&card);

        assert_eq!(address.address_2, "");
        assert_eq!(address.state, "");
        assert_eq!(address.country_id, 0);
        assert_eq!(address.city, "Huntington Beach");
    }

    #[tokio::test]
    async fn test_card_creation_outcomes() {
        let backend = backend_with_cards();
        let vault = vault_with(&backend);
        let fields = CardEntryFields {
            number: "5556710479144892".to_string(),
            cvv: "202".to_string(),
            card_label: "Test Card".to_string(),
            ..Default::default()
        };

        let outcome = vault
            .request_card_creation("https://checkout.example.com/c/1", fields.clone(), "Testing 1")
            .await
            .unwrap();
        assert!(outcome.success);

        backend.set_card_entry_outcome(CardEntryOutcome {
            success: false,
            message: Some("Could not find submit button".to_string()),
            progress_updates: vec![],
        });
        let reported = vault
            .request_card_creation("https://checkout.example.com/c/1", fields.clone(), "Testing 1")
            .await
            .unwrap();
        assert!(!reported.success);

        backend.fail_card_entry_with(ApiError::Timeout(180_000));
        let hard = vault
            .request_card_creation("https://checkout.example.com/c/1", fields.clone(), "Testing 1")
            .await;
        assert!(matches!(hard, Err(VaultError::CardEntryFailed(ApiError::Timeout(_)))));

        let invalid = vault.request_card_creation(" ", fields, "Testing 1").await;
        assert!(matches!(invalid, Err(VaultError::InvalidCardEntry(_))));
        assert_eq!(backend.card_entry_calls.load(Ordering::SeqCst), 3);
    }
}
