// Router registry
// Static mapping from venue id to its on-chain router and protocol family.
// Built once at startup and shared read-only between concurrent trades.
//
// Numan Thabit 2025 Nov

use alloy_primitives::Address;
use std::collections::HashMap;

use crate::config::{VenueSpec, VenuesFile};
use crate::errors::AggrError;
use crate::trade::ProtocolFamily;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterEntry {
    pub venue_id: String,
    pub router: Address,
    pub family: ProtocolFamily,
}

#[derive(Debug, Clone)]
pub struct RouterRegistry {
    wrapped_native: Address,
    entries: Vec<RouterEntry>,
    index: HashMap<String, usize>,
}

impl RouterRegistry {
    pub fn new(wrapped_native: Address) -> Self {
        Self {
            wrapped_native,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_router(
        mut self,
        venue_id: impl Into<String>,
        router: Address,
        family: ProtocolFamily,
    ) -> Result<Self, AggrError> {
        let venue_id = venue_id.into();
        if self.index.contains_key(&venue_id) {
            return Err(AggrError::Config(format!("venue {venue_id} registered twice")));
        }
        self.index.insert(venue_id.clone(), self.entries.len());
        self.entries.push(RouterEntry {
            venue_id,
            router,
            family,
        });
        Ok(self)
    }

    pub fn from_venues(file: &VenuesFile) -> Result<Self, AggrError> {
        file.venues
            .iter()
            .try_fold(Self::new(file.wrapped_native), |registry, spec| {
                let family = match spec {
                    VenueSpec::ConstantProduct { .. } => ProtocolFamily::ConstantProduct,
                    VenueSpec::ConcentratedLiquidity { .. } => {
                        ProtocolFamily::ConcentratedLiquidity
                    }
                };
                registry.with_router(spec.id(), spec.router(), family)
            })
    }

    pub fn get(&self, venue_id: &str) -> Option<&RouterEntry> {
        self.index.get(venue_id).map(|&i| &self.entries[i])
    }

    pub fn router_for(&self, venue_id: &str) -> Result<&RouterEntry, AggrError> {
        self.get(venue_id)
            .ok_or_else(|| AggrError::UnsupportedVenue(venue_id.to_string()))
    }

    pub fn wrapped_native(&self) -> Address {
        self.wrapped_native
    }

    /// Entries in registration order
    pub fn entries(&self) -> &[RouterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
