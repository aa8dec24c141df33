use std::sync::{Arc, Mutex};
use std::time::Duration;

use kapply::polling::{PollEvent, PollOptions, Poller};
use kapply::ObjMetadataSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A poller that:
/// - records which identifier sets it was asked to poll
/// - replays a fixed script of poll events, `delay` apart
/// - then stays open until cancelled, like a real poller would.
#[derive(Clone)]
pub struct ScriptedPoller {
    script: Vec<PollEvent>,
    delay: Duration,
    polled: Arc<Mutex<Vec<ObjMetadataSet>>>,
}

impl ScriptedPoller {
    pub fn new(script: Vec<PollEvent>) -> Self {
        Self {
            script,
            delay: Duration::from_millis(5),
            polled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A poller that never reports anything.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Identifier sets passed to `poll`, in call order.
    pub fn polled(&self) -> Vec<ObjMetadataSet> {
        self.polled.lock().unwrap().clone()
    }
}

impl Poller for ScriptedPoller {
    fn poll(
        &self,
        cancel: CancellationToken,
        ids: ObjMetadataSet,
        _options: PollOptions,
    ) -> mpsc::Receiver<PollEvent> {
        self.polled.lock().unwrap().push(ids);

        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            for event in script {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            cancel.cancelled().await;
        });
        rx
    }
}
