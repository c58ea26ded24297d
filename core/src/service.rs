// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;

use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

/// Stop signal handed to a background task.
pub struct StopHandle {
    stop_rx: Option<oneshot::Receiver<()>>,
}

impl StopHandle {
    /// Resolves once a stop was requested or the owning [`ServiceHandle`] was dropped.
    ///
    /// After the first resolution every later call returns immediately, so the handle may be
    /// awaited again after a `select!` branch fired.
    pub async fn signaled(&mut self) {
        if let Some(rx) = self.stop_rx.as_mut() {
            let _ = rx.await;
            self.stop_rx = None;
        }
    }
}

/// Owner side of a named background task with cooperative shutdown.
pub struct ServiceHandle {
    name: String,
    join: JoinHandle<()>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            debug!("Stopping {}", self.name);
            let _ = tx.send(());
        }
    }

    /// Requests shutdown and waits for the task to finish its cleanup.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.request_shutdown();
        self.join.await
    }
}

/// Spawns `f` on the Tokio runtime under `name`, passing it the [`StopHandle`] it should watch.
pub fn spawn_service<Fut, Func>(name: impl Into<String>, f: Func) -> ServiceHandle
where
    Fut: Future<Output = ()> + Send + 'static,
    Func: FnOnce(StopHandle) -> Fut + Send + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel();
    let join = tokio::spawn(f(StopHandle { stop_rx: Some(stop_rx) }));
    ServiceHandle { name: name.into(), join, stop_tx: Some(stop_tx) }
}

/// Service handles that are stopped together, e.g. every entry watch at exit.
#[derive(Default)]
pub struct MultiServiceHandle {
    handles: Vec<ServiceHandle>,
}

impl MultiServiceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Signals every service before joining any, so they wind down concurrently.
    ///
    /// Each failed join is logged; the first one is returned.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.handles.iter_mut().for_each(ServiceHandle::request_shutdown);
        let mut result = Ok(());
        for handle in self.handles {
            let name = handle.name;
            if let Err(e) = handle.join.await {
                warn!("{} ended abnormally: {}", name, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl Extend<ServiceHandle> for MultiServiceHandle {
    fn extend<I: IntoIterator<Item = ServiceHandle>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}
