use std::sync::Arc;

use tokio::sync::Mutex;
use vitrine_core::{Catalog, CatalogConfig};

mod http;
mod upload;

pub use http::{app_router, serve};
pub use upload::RequestInput;

pub const DEFAULT_BODY_LIMIT: usize = 256 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    /// Serializes load-mutate-save cycles within this process.
    write_lock: Arc<Mutex<()>>,
    pub body_limit: usize,
}

impl AppState {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            catalog: Arc::new(Catalog::new(config)),
            write_lock: Arc::new(Mutex::new(())),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}
