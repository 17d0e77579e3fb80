use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::traits::LlmClient;

/// Background worker that periodically pings idle backing models to keep
/// them resident in the LLM host's memory (§2 component 6, §4.8).
pub struct WarmthManager {
    last_touch: Arc<Mutex<HashMap<String, Instant>>>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl WarmthManager {
    pub fn new(client: Arc<dyn LlmClient>, models: Vec<String>, interval: Duration) -> Self {
        let last_touch = Arc::new(Mutex::new(HashMap::new()));
        {
            let mut guard = last_touch.lock();
            for m in &models {
                guard.insert(m.clone(), Instant::now() - interval);
            }
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let touch_map = last_touch.clone();
        let tick_interval = interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stale: Vec<String> = {
                            let guard = touch_map.lock();
                            guard
                                .iter()
                                .filter(|(_, last)| last.elapsed() >= tick_interval)
                                .map(|(m, _)| m.clone())
                                .collect()
                        };
                        for model in stale {
                            let start = Instant::now();
                            let ok = client.warm_model(&model).await.is_ok();
                            let duration_ms = start.elapsed().as_millis() as u64;
                            circle_domain::trace::TraceEvent::WarmthPing {
                                model: model.clone(),
                                success: ok,
                                duration_ms,
                            }
                            .emit();
                            if ok {
                                touch_map.lock().insert(model, Instant::now());
                            }
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            last_touch,
            stop_tx,
            handle: Mutex::new(Some(handle)),
            interval,
        }
    }

    /// Called by the generation loop after any real request to this model.
    pub fn touch(&self, model: &str) {
        self.last_touch.lock().insert(model.to_string(), Instant::now());
    }

    /// Stops the background worker, joining with a bounded timeout (§5: ≤5s).
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatRequest, ChatResponse};
    use async_trait::async_trait;
    use circle_domain::Result;

    struct StubClient;

    #[async_trait]
    impl LlmClient for StubClient {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            unimplemented!()
        }
        async fn is_running(&self) -> bool {
            true
        }
        async fn available_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn warm_model(&self, _model: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn touch_updates_last_touch_timestamp() {
        let manager = WarmthManager::new(Arc::new(StubClient), vec!["llama3".into()], Duration::from_secs(180));
        let before = manager.last_touch.lock().get("llama3").copied().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.touch("llama3");
        let after = manager.last_touch.lock().get("llama3").copied().unwrap();
        assert!(after > before);
        manager.stop().await;
    }

    #[tokio::test]
    async fn stop_joins_within_bound() {
        let manager = WarmthManager::new(Arc::new(StubClient), vec![], Duration::from_secs(180));
        manager.stop().await;
    }
}
