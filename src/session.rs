// Per-checkout session state, passed explicitly to every component

use crate::models::UserIdentity;
use crate::reveal_cache::RevealCache;
use parking_lot::RwLock;
use tracing::info;

#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    identity: UserIdentity,
    client_id: RwLock<Option<String>>,
    reveal_cache: RevealCache,
}

impl SessionContext {
    pub fn new(identity: UserIdentity) -> Self {
        Self {
            session_id: format!("checkout-{:08x}", rand::random::<u32>()),
            identity,
            client_id: RwLock::new(None),
            reveal_cache: RevealCache::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    pub fn set_client_id(&self, client_id: &str) {
        *self.client_id.write() = Some(client_id.to_string());
    }

    // Only the card vault writes through this; everyone else reads
    pub fn reveal_cache(&self) -> &RevealCache {
        &self.reveal_cache
    }

    // Leaving the checkout drops revealed card data but keeps the resolved client
    pub fn leave_checkout(&self) {
        let dropped = self.reveal_cache.clear();
        info!(session_id = %self.session_id, dropped, "Left checkout, reveal cache cleared");
    }

    pub fn sign_out(&self) {
        let dropped = self.reveal_cache.clear();
        *self.client_id.write() = None;
        info!(session_id = %self.session_id, dropped, "Signed out, session state cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_backend::revealed;

    #[tokio::test]
    async fn test_sign_out_clears_client_and_cache() {
        let session = SessionContext::new(UserIdentity::new("u1", "user@example.com"));
        session.set_client_id("C1");
        session
            .reveal_cache()
            .get_or_reveal("CARD1", || async move { Ok::<_, String>(revealed("4242")) })
            .await
            .unwrap();

        session.sign_out();

        assert!(session.client_id().is_none());
        assert!(session.reveal_cache().is_empty());
    }

    #[tokio::test]
    async fn test_leave_checkout_keeps_client() {
        let session = SessionContext::new(UserIdentity::new("u1", "user@example.com"));
        session.set_client_id("C1");
        session
            .reveal_cache()
            .get_or_reveal("CARD1", || async move { Ok::<_, String>(revealed("4242")) })
            .await
            .unwrap();

        session.leave_checkout();

        assert_eq!(session.client_id().as_deref(), Some("C1"));
        assert!(!session.reveal_cache().contains("CARD1"));
        assert!(session.session_id().starts_with("checkout-"));
    }
}
