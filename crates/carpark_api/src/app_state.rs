use std::sync::Arc;

use carpark_core::ChargingPark;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    park: Arc<ChargingPark>,
}

impl AppState {
    pub fn new(park: ChargingPark) -> Self {
        Self {
            park: Arc::new(park),
        }
    }

    /// Run `op` on the park outside the async runtime, saving the state
    /// blocks on file I/O.
    pub async fn with_park<T, F>(&self, op: F) -> Result<T, tokio::task::JoinError>
    where
        F: FnOnce(&ChargingPark) -> T + Send + 'static,
        T: Send + 'static,
    {
        let park = Arc::clone(&self.park);
        tokio::task::spawn_blocking(move || op(park.as_ref())).await
    }
}
