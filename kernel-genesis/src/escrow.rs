//! `genesis_escrow` - artifact trade facade. Listings live as JSON inside
//! the escrow's own artifact content, read with [`ArtifactStore::get_raw`]
//! and written back with `caller_id = ArtifactId::nil()` (the escrow
//! artifact's own `created_by`, which a freeware contract always lets
//! write). A trade is a scrip transfer followed by an ownership
//! reassignment; if the ownership move fails after the transfer already
//! succeeded, `buy` reverses the transfer so neither step takes effect on
//! its own.

use crate::util::{invalid_args, required_artifact_id, required_u64};
use async_trait::async_trait;
use kernel_core::{ArtifactId, ContractError, KernelResult};
use kernel_engine::{Capability, InvocationHandler};
use kernel_ledger::Ledger;
use kernel_store::ArtifactStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Listing {
    seller: ArtifactId,
    price: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Listings {
    #[serde(default)]
    listings: HashMap<ArtifactId, Listing>,
}

pub struct GenesisEscrow {
    store: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn Ledger>,
    escrow_id: ArtifactId,
}

impl GenesisEscrow {
    pub fn new(store: Arc<dyn ArtifactStore>, ledger: Arc<dyn Ledger>, escrow_id: ArtifactId) -> Self {
        Self { store, ledger, escrow_id }
    }

    fn read_listings(&self) -> KernelResult<Listings> {
        let artifact = self.store.get_raw(self.escrow_id)?;
        if artifact.content.is_null() || artifact.content == serde_json::json!({}) {
            return Ok(Listings::default());
        }
        serde_json::from_value(artifact.content).map_err(|e| {
            ContractError::Denied { reason: format!("corrupt escrow listings: {e}") }.into()
        })
    }

    fn write_listings(&self, listings: &Listings) -> KernelResult<()> {
        let content = serde_json::to_value(listings).expect("Listings serializes");
        self.store.write(self.escrow_id, ArtifactId::nil(), content, &serde_json::json!({}))
    }
}

#[async_trait]
impl InvocationHandler for GenesisEscrow {
    async fn call(&self, cap: &Capability, requester_id: ArtifactId, method: &str, args: Value) -> KernelResult<Value> {
        let me = cap.caller_id();
        match method {
            "list_for_sale" => {
                let artifact_id = required_artifact_id(&args, "artifact_id", me, method)?;
                let price = required_u64(&args, "price", me, method)?;
                let owner = self.store.metadata(artifact_id)?.owner_id;
                if owner != requester_id {
                    return Err(ContractError::Denied { reason: "only the owner may list an artifact for sale".into() }.into());
                }
                let mut listings = self.read_listings()?;
                listings.listings.insert(artifact_id, Listing { seller: requester_id, price });
                self.write_listings(&listings)?;
                Ok(serde_json::json!({ "artifact_id": artifact_id.to_string(), "price": price }))
            }
            "cancel" => {
                let artifact_id = required_artifact_id(&args, "artifact_id", me, method)?;
                let mut listings = self.read_listings()?;
                match listings.listings.get(&artifact_id) {
                    None => Err(invalid_args(me, method, "no active listing for that artifact")),
                    Some(listing) if listing.seller != requester_id => {
                        Err(ContractError::Denied { reason: "only the seller may cancel a listing".into() }.into())
                    }
                    Some(_) => {
                        listings.listings.remove(&artifact_id);
                        self.write_listings(&listings)?;
                        Ok(serde_json::json!({ "artifact_id": artifact_id.to_string(), "cancelled": true }))
                    }
                }
            }
            "buy" => {
                let artifact_id = required_artifact_id(&args, "artifact_id", me, method)?;
                let mut listings = self.read_listings()?;
                let listing = listings
                    .listings
                    .get(&artifact_id)
                    .cloned()
                    .ok_or_else(|| invalid_args(me, method, "no active listing for that artifact"))?;
                if listing.seller == requester_id {
                    return Err(invalid_args(me, method, "cannot buy your own listing"));
                }
                self.ledger.transfer(requester_id, listing.seller, listing.price)?;
                if let Err(err) = self.store.set_owner(artifact_id, requester_id) {
                    // Ownership move failed after scrip already moved; reverse
                    // it so the trade leaves no partial effect.
                    self.ledger.transfer(listing.seller, requester_id, listing.price)?;
                    return Err(err);
                }
                listings.listings.remove(&artifact_id);
                self.write_listings(&listings)?;
                Ok(serde_json::json!({
                    "artifact_id": artifact_id.to_string(),
                    "seller": listing.seller.to_string(),
                    "buyer": requester_id.to_string(),
                    "price": listing.price,
                }))
            }
            "list_for_sale_all" => {
                let listings = self.read_listings()?;
                Ok(serde_json::json!({
                    "listings": listings.listings.iter().map(|(id, l)| serde_json::json!({
                        "artifact_id": id.to_string(),
                        "seller": l.seller.to_string(),
                        "price": l.price,
                    })).collect::<Vec<_>>()
                }))
            }
            other => Err(invalid_args(me, other, "unknown genesis_escrow method")),
        }
    }
}
