//! Shared application state.

use std::sync::Arc;

use crate::assets::AssetStore;
use crate::delivery::DeliveryPipeline;
use crate::identity::{Authenticator, UserDirectory};
use crate::presence::PresenceRegistry;
use crate::store::MessageStore;

/// Everything a handler needs. Cheap to clone; no lock wraps the whole
/// state, each component guards itself.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn Authenticator>,
    pub users: Arc<dyn UserDirectory>,
    pub pipeline: Arc<DeliveryPipeline>,
    pub assets: Option<Arc<dyn AssetStore>>,
}

impl AppState {
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        self.pipeline.presence()
    }

    pub fn messages(&self) -> &Arc<dyn MessageStore> {
        self.pipeline.store()
    }

    pub fn asset_store(&self) -> Option<&dyn AssetStore> {
        self.assets.as_deref()
    }
}
