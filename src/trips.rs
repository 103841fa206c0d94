// Trip listing, default selection and the new/existing trip decision

use crate::backend::{ApiError, TripDirectory};
use crate::booking::ValidationError;
use crate::models::Trip;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TripError {
    #[error("Trip directory unavailable: {0}")]
    DirectoryUnavailable(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripMode {
    New,
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRef {
    pub id: String,
    pub name: String,
}

impl From<&Trip> for TripRef {
    fn from(trip: &Trip) -> Self {
        Self {
            id: trip.id.clone(),
            name: trip.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripDefault {
    pub mode: TripMode,
    pub default_selection: Option<TripRef>,
}

// What ends up in the booking payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrip {
    pub trip_id: Option<String>,
    pub trip_name: String,
}

pub fn default_trip_name(client_email: &str, hotel_name: &str) -> String {
    format!("{} client's {} Trip", client_email, hotel_name)
}

// User-driven trip choice for one checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripSelection {
    mode: TripMode,
    existing: Option<TripRef>,
    new_trip_name: String,
}

impl Default for TripSelection {
    fn default() -> Self {
        Self::new_trip("")
    }
}

impl TripSelection {
    pub fn new_trip(name: impl Into<String>) -> Self {
        Self {
            mode: TripMode::New,
            existing: None,
            new_trip_name: name.into(),
        }
    }

    pub fn existing(trip: TripRef) -> Self {
        Self {
            mode: TripMode::Existing,
            existing: Some(trip),
            new_trip_name: String::new(),
        }
    }

    pub fn from_default(default: &TripDefault) -> Self {
        Self {
            mode: default.mode,
            existing: default.default_selection.clone(),
            new_trip_name: String::new(),
        }
    }

    pub fn mode(&self) -> TripMode {
        self.mode
    }

    pub fn selected_trip(&self) -> Option<&TripRef> {
        self.existing.as_ref()
    }

    pub fn new_trip_name(&self) -> &str {
        &self.new_trip_name
    }

    // Switching modes keeps both the picked trip and the typed name
    pub fn set_mode(&mut self, mode: TripMode) {
        self.mode = mode;
    }

    pub fn toggle(&mut self) {
        self.mode = match self.mode {
            TripMode::New => TripMode::Existing,
            TripMode::Existing => TripMode::New,
        };
    }

    pub fn select_trip(&mut self, trip: TripRef) {
        self.existing = Some(trip);
        self.mode = TripMode::Existing;
    }

    pub fn set_new_trip_name(&mut self, name: impl Into<String>) {
        self.new_trip_name = name.into();
    }

    pub fn resolve(
        &self,
        client_email: &str,
        hotel_name: &str,
    ) -> Result<ResolvedTrip, ValidationError> {
        match self.mode {
            TripMode::Existing => match &self.existing {
                Some(trip) if !trip.id.trim().is_empty() => Ok(ResolvedTrip {
                    trip_id: Some(trip.id.clone()),
                    trip_name: trip.name.clone(),
                }),
                _ => Err(ValidationError::TripNotSelected),
            },
            TripMode::New => {
                let name = self.new_trip_name.trim();
                let trip_name = if name.is_empty() {
                    default_trip_name(client_email, hotel_name)
                } else {
                    name.to_string()
                };
                Ok(ResolvedTrip {
                    trip_id: None,
                    trip_name,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TripSearchField {
    #[default]
    TripName,
    ClientName,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TripFilter {
    pub query: String,
    pub field: TripSearchField,
    pub include_inactive: bool,
}

// Backing logic for the "browse all trips" view; keeps backend order
pub fn browse<'a>(trips: &'a [Trip], filter: &TripFilter) -> Vec<&'a Trip> {
    let query = filter.query.trim().to_lowercase();

    trips
        .iter()
        .filter(|trip| filter.include_inactive || trip.is_active())
        .filter(|trip| {
            if query.is_empty() {
                return true;
            }
            match filter.field {
                TripSearchField::TripName => trip.name.to_lowercase().contains(&query),
                TripSearchField::ClientName => trip.clients.iter().any(|client| {
                    client.display_name().to_lowercase().contains(&query)
                        || format!("{} {}", client.first_name, client.last_name)
                            .to_lowercase()
                            .contains(&query)
                }),
            }
        })
        .collect()
}

pub struct TripSelector {
    directory: Arc<dyn TripDirectory>,
    max_pages: usize,
}

impl TripSelector {
    pub fn new(directory: Arc<dyn TripDirectory>, max_pages: usize) -> Self {
        Self {
            directory,
            max_pages: max_pages.max(1),
        }
    }

    // Follows `next` links; stops at the page limit with whatever was collected
    pub async fn load(&self, client_id: &str) -> Result<Vec<Trip>, TripError> {
        let mut trips = Vec::new();
        let mut next: Option<String> = None;

        for page_number in 0..self.max_pages {
            let page = self
                .directory
                .list_trips(client_id, next.as_deref())
                .await?;
            debug!(client_id, page_number, count = page.results.len(), "Trip page loaded");
            trips.extend(page.results);

            match page.next {
                Some(link) if !link.is_empty() => next = Some(link),
                _ => return Ok(trips),
            }
        }

        warn!(client_id, max_pages = self.max_pages, loaded = trips.len(), "Trip page limit reached");
        Ok(trips)
    }

    // First active trip in backend order becomes the default existing selection
    pub fn classify(trips: &[Trip]) -> TripDefault {
        match trips.iter().find(|trip| trip.is_active()) {
            Some(trip) => TripDefault {
                mode: TripMode::Existing,
                default_selection: Some(TripRef::from(trip)),
            },
            None => TripDefault {
                mode: TripMode::New,
                default_selection: None,
            },
        }
    }
}
