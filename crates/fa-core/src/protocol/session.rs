//! Per-connection command handling.
//!
//! A session owns at most one active [`Monitor`] and the thread running its
//! supervision loop. A new `start` replaces the active monitor; closing the
//! session terminates it.

use super::messages::{parse_targets, Request, Response};
use crate::supervision::Monitor;
use serde_json::Value;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Builds a fresh, unstarted monitor for each `start`.
pub type MonitorFactory = Arc<dyn Fn() -> Monitor + Send + Sync>;

struct ActiveMonitor {
    monitor: Arc<Monitor>,
    thread: JoinHandle<()>,
}

pub struct Session {
    factory: MonitorFactory,
    active: Option<ActiveMonitor>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.active.as_ref().map(|a| &a.monitor))
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(factory: MonitorFactory) -> Self {
        Self {
            factory,
            active: None,
        }
    }

    /// Execute one request and produce its response.
    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::pong(),
            Request::Start(data) => Response::outcome("start", self.start(&data)),
            Request::Kill => Response::outcome("kill", self.kill()),
            Request::Stop => {
                let ok = self.kill();
                self.shutdown();
                Response::outcome("kill", ok)
            }
            Request::Status => self.status(),
        }
    }

    fn start(&mut self, data: &Value) -> bool {
        let specs = match parse_targets(data) {
            Ok(specs) => specs,
            Err(err) => {
                warn!(error = %err, "start rejected");
                return false;
            }
        };

        self.shutdown();

        let monitor = Arc::new((self.factory)());
        for spec in &specs {
            if let Err(err) = monitor.add_target(spec.kind, &spec.input) {
                warn!(
                    kind = %spec.kind,
                    input = %spec.input,
                    error = %err,
                    code = err.code(),
                    "target rejected"
                );
                return false;
            }
        }

        let runner = Arc::clone(&monitor);
        let span = tracing::Span::current();
        let spawned = thread::Builder::new()
            .name("fa-supervisor".into())
            .spawn(move || {
                let _enter = span.enter();
                if let Err(err) = runner.start() {
                    warn!(error = %err, code = err.code(), "supervision ended with error");
                }
            });

        match spawned {
            Ok(thread) => {
                info!(targets = specs.len(), "monitor started");
                self.active = Some(ActiveMonitor { monitor, thread });
                true
            }
            Err(err) => {
                error!(error = %err, "failed to spawn supervision thread");
                false
            }
        }
    }

    fn kill(&mut self) -> bool {
        match &self.active {
            Some(active) => active.monitor.terminate(),
            None => {
                debug!("kill without an active monitor");
                false
            }
        }
    }

    fn status(&self) -> Response {
        let Some(active) = &self.active else {
            return Response::status_ok();
        };
        let views = active.monitor.snapshot();
        if !active.monitor.is_running() || views.is_empty() {
            return Response::status_ok();
        }
        Response::status(&views)
    }

    /// Terminate and stop the active monitor, waiting for its thread.
    fn shutdown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.monitor.terminate();
        active.monitor.stop();
        if active.thread.join().is_err() {
            error!("supervision thread panicked");
        }
        debug!("monitor shut down");
    }

    /// Release the active monitor, if any.
    pub fn close(&mut self) {
        self.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
