use crate::scheduler::SchedulerHandle;
use chrono::{DateTime, Utc};
use monty_storage::{EndpointStore, ResultStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub endpoints: Arc<EndpointStore>,
    pub results: Arc<dyn ResultStore>,
    pub scheduler: SchedulerHandle,
    pub start_time: DateTime<Utc>,
}
