use std::sync::Arc;

use crate::purge::coordinator::PurgeCoordinator;
use crate::purge::queue::PurgeQueue;

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<PurgeCoordinator>,
}

impl ApiState {
    pub fn new(coordinator: Arc<PurgeCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn queue(&self) -> Option<&PurgeQueue> {
        self.coordinator.dispatcher().queue()
    }
}
