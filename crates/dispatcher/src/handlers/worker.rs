use async_trait::async_trait;
use herqles_core::{
    models::{
        IdReply, WorkerFilter, WorkerGetReply, WorkerGetRequest, WorkerRegistration,
        WorkerReloadRequest, WorkerSummary,
    },
    traits::{Binding, Delivery},
    HerqlesResult,
};
use serde_json::Value;

use super::{WORKER_GET_QUEUE, WORKER_REGISTER_QUEUE, WORKER_RELOAD_QUEUE};
use crate::registry::WorkerRegistry;
use crate::subscriber::MessageHandler;

pub struct RegisterWorkerHandler {
    registry: WorkerRegistry,
}

impl RegisterWorkerHandler {
    pub fn new(registry: WorkerRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for RegisterWorkerHandler {
    fn binding(&self) -> Binding {
        Binding::new("worker", "register", WORKER_REGISTER_QUEUE)
    }

    async fn handle(&self, delivery: &Delivery) -> HerqlesResult<Option<Value>> {
        let registration: WorkerRegistration = delivery.json()?;
        let id = self.registry.register(&registration).await?;
        Ok(Some(serde_json::to_value(IdReply { id: id.to_string() })?))
    }
}

pub struct ReloadWorkerHandler {
    registry: WorkerRegistry,
}

impl ReloadWorkerHandler {
    pub fn new(registry: WorkerRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for ReloadWorkerHandler {
    fn binding(&self) -> Binding {
        Binding::new("worker", "reload", WORKER_RELOAD_QUEUE)
    }

    async fn handle(&self, delivery: &Delivery) -> HerqlesResult<Option<Value>> {
        let request: WorkerReloadRequest = delivery.json()?;
        self.registry
            .reload(&request.target, &request.framework, &request.tags)
            .await?;
        Ok(None)
    }
}

pub struct GetWorkersHandler {
    registry: WorkerRegistry,
}

impl GetWorkersHandler {
    pub fn new(registry: WorkerRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for GetWorkersHandler {
    fn binding(&self) -> Binding {
        Binding::new("worker", "get", WORKER_GET_QUEUE)
    }

    async fn handle(&self, delivery: &Delivery) -> HerqlesResult<Option<Value>> {
        let request: WorkerGetRequest = delivery.json()?;
        let workers = self
            .registry
            .list(&WorkerFilter::framework_in_datacenter(
                &request.framework,
                &request.datacenter,
            ))
            .await?;

        let reply = WorkerGetReply {
            workers: workers.into_iter().map(WorkerSummary::from).collect(),
        };
        Ok(Some(serde_json::to_value(reply)?))
    }
}
