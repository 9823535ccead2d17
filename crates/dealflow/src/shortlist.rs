//! The buyer's bounded working set of candidate vehicles that seeds an
//! auction.

use {
    crate::{
        collaborators::{InventoryChecking, with_timeout},
        error::{Error, Result},
        storage::Storage,
    },
    chrono::Utc,
    model::{
        ids::{BuyerId, VehicleId},
        partner::VehicleAvailability,
        shortlist::ShortlistItem,
    },
    std::{sync::Arc, time::Duration},
};

pub struct ShortlistStore {
    store: Arc<dyn Storage>,
    inventory: Arc<dyn InventoryChecking>,
    collaborator_timeout: Duration,
}

impl ShortlistStore {
    pub fn new(
        store: Arc<dyn Storage>,
        inventory: Arc<dyn InventoryChecking>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            store,
            inventory,
            collaborator_timeout,
        }
    }

    /// Adds a vehicle to the buyer's shortlist. Idempotent for an already
    /// active vehicle. Fails with [`Error::CapacityExceeded`] when the
    /// buyer is at capacity and with [`Error::VehicleUnavailable`] when the
    /// inventory collaborator reports the vehicle sold or removed.
    pub async fn add_item(
        &self,
        buyer: BuyerId,
        vehicle: VehicleId,
        note: Option<String>,
    ) -> Result<()> {
        let availability = with_timeout(
            "inventory",
            self.collaborator_timeout,
            self.inventory.availability(vehicle),
        )
        .await?;
        if availability != VehicleAvailability::Available {
            return Err(Error::VehicleUnavailable);
        }
        self.store
            .add_shortlist_item(buyer, vehicle, note, Utc::now())
            .await?;
        tracing::debug!(?buyer, ?vehicle, "shortlisted vehicle");
        Ok(())
    }

    /// Soft-removes an item, a no-op when absent or already removed. The
    /// tombstoned row is retained for audit.
    pub async fn remove_item(&self, buyer: BuyerId, vehicle: VehicleId) -> Result<()> {
        self.store
            .remove_shortlist_item(buyer, vehicle, Utc::now())
            .await
    }

    /// Marks one active item as the buyer's primary choice, clearing the
    /// flag from every other item.
    pub async fn mark_primary(&self, buyer: BuyerId, vehicle: VehicleId) -> Result<()> {
        self.store.mark_primary_choice(buyer, vehicle).await
    }

    pub async fn active_items(&self, buyer: BuyerId) -> Result<Vec<ShortlistItem>> {
        self.store.active_shortlist(buyer).await
    }
}
