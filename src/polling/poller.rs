// src/polling/poller.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cluster::ClusterReader;
use crate::errors::{ErrorKind, KapplyError, Result};
use crate::object::{GroupKind, ObjMetadata, ObjMetadataSet, Unstructured};
use crate::polling::{Change, PollEvent, PollOptions, Poller, ResourceStatus, StatusCache};
use crate::status::StatusComputer;
use crate::types::ReadStrategy;

const DEFAULT_BUFFER: usize = 256;

/// Polls a [`ClusterReader`] and evaluates what it reads.
pub struct StatusPoller<R: ClusterReader + ?Sized> {
    reader: Arc<R>,
    computer: StatusComputer,
    buffer: usize,
}

impl<R: ClusterReader + ?Sized> std::fmt::Debug for StatusPoller<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("computer", &self.computer)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<R: ClusterReader + ?Sized + 'static> StatusPoller<R> {
    pub fn new(reader: Arc<R>, computer: StatusComputer) -> Self {
        Self {
            reader,
            computer,
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

impl<R: ClusterReader + ?Sized + 'static> Poller for StatusPoller<R> {
    fn poll(
        &self,
        cancel: CancellationToken,
        ids: ObjMetadataSet,
        options: PollOptions,
    ) -> mpsc::Receiver<PollEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let poll_loop = PollLoop {
            reader: Arc::clone(&self.reader),
            computer: self.computer.clone(),
            ids,
            options,
            cache: StatusCache::new(),
            failures: HashMap::new(),
        };
        tokio::spawn(poll_loop.run(cancel, tx));
        rx
    }
}

struct PollLoop<R: ClusterReader + ?Sized> {
    reader: Arc<R>,
    computer: StatusComputer,
    ids: ObjMetadataSet,
    options: PollOptions,
    cache: StatusCache,
    /// Consecutive read failures per object.
    failures: HashMap<ObjMetadata, u32>,
}

impl<R: ClusterReader + ?Sized> PollLoop<R> {
    async fn run(mut self, cancel: CancellationToken, tx: mpsc::Sender<PollEvent>) {
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut synced = false;

        debug!(count = self.ids.len(), interval = ?self.options.poll_interval, "status poller started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fetched = self.fetch_all() => fetched,
            };

            let mut events = Vec::new();
            for (id, read) in fetched {
                if let Some(event) = self.evaluate(id, read) {
                    events.push(event);
                }
            }
            if !synced {
                events.push(PollEvent::Sync);
                synced = true;
            }

            for event in events {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("status poller cancelled while sending");
                        return;
                    }
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            debug!("status poller receiver dropped");
                            return;
                        }
                    }
                }
            }
        }

        debug!("status poller stopped");
    }

    async fn fetch_all(&self) -> Vec<(ObjMetadata, Result<Option<Unstructured>>)> {
        match self.options.read_strategy {
            ReadStrategy::Individual => {
                let mut out = Vec::with_capacity(self.ids.len());
                for id in self.ids.iter() {
                    out.push((id.clone(), self.reader.get(id).await));
                }
                out
            }
            ReadStrategy::Batched => self.fetch_batched().await,
        }
    }

    /// One list call per (group/kind, namespace).
    async fn fetch_batched(&self) -> Vec<(ObjMetadata, Result<Option<Unstructured>>)> {
        let mut groups: BTreeMap<(GroupKind, String), Vec<&ObjMetadata>> = BTreeMap::new();
        for id in self.ids.iter() {
            groups
                .entry((id.group_kind(), id.namespace.clone()))
                .or_default()
                .push(id);
        }

        let mut by_id: HashMap<ObjMetadata, Result<Option<Unstructured>>> = HashMap::new();
        for ((group_kind, namespace), members) in groups {
            match self.reader.list(&group_kind, &namespace).await {
                Ok(listed) => {
                    let mut found: HashMap<String, Unstructured> = listed
                        .into_iter()
                        .map(|obj| (obj.name().to_string(), obj))
                        .collect();
                    for id in members {
                        by_id.insert(id.clone(), Ok(found.remove(&id.name)));
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    for id in members {
                        by_id.insert(
                            id.clone(),
                            Err(KapplyError::Fetch {
                                id: id.clone(),
                                message: message.clone(),
                            }),
                        );
                    }
                }
            }
        }

        // Keep the caller's identifier order.
        self.ids
            .iter()
            .filter_map(|id| by_id.remove(id).map(|read| (id.clone(), read)))
            .collect()
    }

    fn evaluate(
        &mut self,
        id: ObjMetadata,
        read: Result<Option<Unstructured>>,
    ) -> Option<PollEvent> {
        let obj = match read {
            Ok(obj) => {
                self.failures.remove(&id);
                obj
            }
            Err(err) => return self.read_failed(id, err),
        };

        let Some(obj) = obj else {
            return self.report(ResourceStatus::not_found(id));
        };

        let resource_version = obj.resource_version().map(str::to_string);
        let cached = match (&resource_version, self.options.use_cache) {
            (Some(rv), true) => self.cache.computed_for(&id, rv).cloned(),
            _ => None,
        };

        let status = match cached {
            Some(status) => status,
            None => match self.compute(&id, &obj) {
                Ok(status) => {
                    if let Some(rv) = &resource_version {
                        self.cache.store_computed(rv, status.clone());
                    }
                    status
                }
                Err(err) => {
                    let message = err.to_string();
                    return self.cache.observe_error(&id, &message).then_some(PollEvent::Error {
                        id,
                        kind: err.kind(),
                        message,
                    });
                }
            },
        };

        self.report(status)
    }

    fn report(&mut self, status: ResourceStatus) -> Option<PollEvent> {
        match self.cache.observe(&status) {
            Change::None => None,
            Change::Generation => Some(PollEvent::GenerationUpdate(status)),
            Change::Verdict => Some(PollEvent::ResourceUpdate(status)),
        }
    }

    fn compute(&self, id: &ObjMetadata, obj: &Unstructured) -> Result<ResourceStatus> {
        let result = self.computer.compute(obj)?;
        Ok(ResourceStatus {
            id: id.clone(),
            status: result.status,
            message: result.message,
            generation: obj.generation()?,
        })
    }

    /// Transient read failures are retried silently; the streak reaching the
    /// limit is reported once.
    fn read_failed(&mut self, id: ObjMetadata, err: KapplyError) -> Option<PollEvent> {
        let limit = self.options.max_fetch_failures.max(1);
        let streak = self.failures.entry(id.clone()).or_insert(0);
        *streak += 1;

        if *streak != limit {
            debug!(id = %id, streak = *streak, error = %err, "transient read failure");
            return None;
        }

        warn!(id = %id, failures = limit, error = %err, "resource reads keep failing");
        Some(PollEvent::Error {
            id,
            kind: ErrorKind::Fetch,
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::status::Status;
    use serde_json::json;
    use std::time::Duration;

    fn options() -> PollOptions {
        PollOptions {
            poll_interval: Duration::from_millis(10),
            ..PollOptions::default()
        }
    }

    fn config_map(name: &str) -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": name, "namespace": "default" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn first_tick_reports_every_object_then_syncs() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.insert(config_map("present")).unwrap();
        let present = config_map("present").id().unwrap();
        let missing = config_map("missing").id().unwrap();

        let poller = StatusPoller::new(cluster, StatusComputer::default());
        let cancel = CancellationToken::new();
        let ids: ObjMetadataSet = vec![present.clone(), missing.clone()].into();
        let mut rx = poller.poll(cancel.clone(), ids, options());

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            if event == PollEvent::Sync {
                break;
            }
            seen.push(event);
        }
        cancel.cancel();

        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[0], PollEvent::ResourceUpdate(s) if s.id == present && s.status == Status::Current));
        assert!(matches!(&seen[1], PollEvent::ResourceUpdate(s) if s.id == missing && s.status == Status::NotFound));
    }

    #[tokio::test]
    async fn persistent_read_failures_surface_once() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.insert(config_map("flaky")).unwrap();
        let id = config_map("flaky").id().unwrap();
        cluster.fail_reads_always(id.clone());

        let poller = StatusPoller::new(Arc::clone(&cluster), StatusComputer::default());
        let cancel = CancellationToken::new();
        let opts = PollOptions {
            read_strategy: ReadStrategy::Individual,
            max_fetch_failures: 2,
            ..options()
        };
        let mut rx = poller.poll(cancel.clone(), vec![id.clone()].into(), opts);

        let mut errors = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(150);
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            if let PollEvent::Error { kind, .. } = event {
                assert_eq!(kind, ErrorKind::Fetch);
                errors += 1;
            }
        }
        cancel.cancel();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn stream_closes_after_cancel() {
        let cluster = Arc::new(MemoryCluster::new());
        let poller = StatusPoller::new(cluster, StatusComputer::default());
        let cancel = CancellationToken::new();
        let mut rx = poller.poll(cancel.clone(), ObjMetadataSet::new(), options());

        assert_eq!(rx.recv().await, Some(PollEvent::Sync));
        cancel.cancel();
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(closed.ok(), Some(None));
    }
}
