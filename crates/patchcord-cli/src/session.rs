//! A canvas wired to the loopback server, driven from the command line.

use std::rc::Rc;
use std::time::Duration;

use patchcord_config::EngineConfig;
use patchcord_core::{Canvas, Deferred, Failure, Scheduler};
use patchcord_server::{LoopbackOptions, LoopbackState, LoopbackTransport, ServerBridge, ServerReply};

use crate::templates;

/// Poll interval while waiting without a configured limit.
const POLL: Duration = Duration::from_millis(50);

/// Errors while waiting for the server.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The configured reply limit passed first.
    #[error("no reply from the server within {0:?}")]
    Timeout(Duration),
    /// The scheduler was shut down with the request still pending.
    #[error("scheduler shut down while waiting for a reply")]
    Closed,
    /// The server answered with a failure.
    #[error(transparent)]
    Failed(#[from] Failure),
}

/// Scheduler, bridge and canvas over a loopback server thread.
pub struct Session {
    scheduler: Scheduler<ServerReply>,
    bridge: Rc<ServerBridge<LoopbackTransport>>,
    canvas: Canvas,
    timeout: Option<Duration>,
}

impl Session {
    /// Spawns the loopback server and registers the built-in templates.
    pub fn start(config: &EngineConfig) -> Self {
        let scheduler = Scheduler::with_drain_budget(config.drain_budget);
        let options = config
            .loopback
            .refused
            .iter()
            .fold(LoopbackOptions::default(), |options, def| options.refuse(def.clone()));
        let transport = LoopbackTransport::spawn(scheduler.reply_sender(), options);
        let bridge = Rc::new(ServerBridge::new(transport, scheduler.clone()));
        let canvas = Canvas::with_server(bridge.clone(), config.canvas_options());
        for template in templates::library() {
            canvas.register_template(template);
        }
        tracing::debug!(
            max_fanout = config.max_fanout,
            drain_budget = config.drain_budget,
            "session_start"
        );
        Self {
            scheduler,
            bridge,
            canvas,
            timeout: config.reply_timeout(),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Runs the reply loop until `deferred` settles.
    pub fn settle<T: 'static>(&self, deferred: Deferred<T>) -> Result<T, SessionError> {
        let slot = deferred.into_slot();
        let ready = match self.timeout {
            Some(limit) => self.scheduler.run_until(limit, || slot.is_ready()),
            None => loop {
                if self.scheduler.run_until(POLL, || slot.is_ready()) {
                    break true;
                }
                if !self.scheduler.is_open() {
                    break false;
                }
            },
        };
        if !ready {
            return Err(self.timeout.map_or(SessionError::Closed, SessionError::Timeout));
        }
        let outcome = slot.take().ok_or(SessionError::Closed)?;
        Ok(outcome?)
    }

    /// Waits for the server to catch up and returns what it holds.
    pub fn server_state(&self) -> Result<LoopbackState, SessionError> {
        self.settle(self.bridge.sync())?;
        Ok(self.bridge.transport().snapshot())
    }

    /// Shuts the scheduler down. Returns the number of unanswered requests.
    pub fn finish(self) -> usize {
        let abandoned = self.scheduler.shutdown();
        tracing::debug!(abandoned, "session_finish");
        abandoned
    }
}
