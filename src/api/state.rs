use std::sync::Arc;

use crate::engine::Engine;
use crate::store::{ExecutionStore, JobStore};

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub engine: Arc<Engine>,
}
