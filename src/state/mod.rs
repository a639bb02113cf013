use std::sync::Arc;

use crate::services::{engine::Engine, restrictions::RestrictionManager};

pub type SharedState = Arc<AppState>;

/// Long-lived services shared by every connection handler.
pub struct AppState {
    engine: Engine,
    restrictions: RestrictionManager,
}

impl AppState {
    /// Bundle the running services into a [`SharedState`].
    pub fn new(engine: Engine, restrictions: RestrictionManager) -> SharedState {
        Arc::new(Self {
            engine,
            restrictions,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn restrictions(&self) -> &RestrictionManager {
        &self.restrictions
    }
}
