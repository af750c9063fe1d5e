use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chat_transport::{
    CancelSignal, ChatReply, ChatRequest, ChatTransport, ExchangeEntry, HistoryRecord, RunId,
    TransportError,
};

use crate::session::{HostOps, Mode, Session};

const ERROR_RUN_ALREADY_ACTIVE: &str = "Request already in flight";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Finished { run_id: RunId, reply: ChatReply },
    Failed { run_id: RunId, error: String },
    Cancelled { run_id: RunId },
}

impl RunEvent {
    fn run_id(&self) -> RunId {
        match self {
            Self::Finished { run_id, .. }
            | Self::Failed { run_id, .. }
            | Self::Cancelled { run_id } => *run_id,
        }
    }
}

struct ActiveRun {
    run_id: RunId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Runs transport requests on worker threads and feeds their outcomes back
/// into the [`Session`].
///
/// Worker results are queued; call [`RuntimeController::flush_pending_run_events`]
/// from the thread that owns the prompt loop to apply them.
pub struct RuntimeController {
    session: Arc<Mutex<Session>>,
    pending_events: Mutex<VecDeque<RunEvent>>,
    next_run_id: AtomicU64,
    active_run: Mutex<Option<ActiveRun>>,
    transport: Arc<dyn ChatTransport>,
    render_requested: AtomicBool,
    stop_requested: AtomicBool,
}

impl RuntimeController {
    pub fn new(session: Arc<Mutex<Session>>, transport: Arc<dyn ChatTransport>) -> Arc<Self> {
        Arc::new(Self {
            session,
            pending_events: Mutex::new(VecDeque::new()),
            next_run_id: AtomicU64::new(1),
            active_run: Mutex::new(None),
            transport,
            render_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        })
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    /// Returns whether a render was requested since the last call.
    pub fn take_render_request(&self) -> bool {
        self.render_requested.swap(false, Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn has_active_run(&self) -> bool {
        self.lock_active_run().is_some()
    }

    fn start_run_internal(self: &Arc<Self>, request: ChatRequest) -> Result<RunId, String> {
        let mut active_run = self.lock_active_run();
        if active_run.is_some() {
            return Err(ERROR_RUN_ALREADY_ACTIVE.to_string());
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let join_handle = self.spawn_worker(run_id, request, Arc::clone(&cancel))?;

        *active_run = Some(ActiveRun {
            run_id,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(run_id)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        run_id: RunId,
        request: ChatRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("branch-chat-run-{run_id}"))
            .spawn(move || controller.run_worker(run_id, request, cancel))
            .map_err(|error| format!("Failed to spawn request worker: {error}"))
    }

    fn run_worker(self: Arc<Self>, run_id: RunId, request: ChatRequest, cancel: CancelSignal) {
        self.wait_for_session_run_visibility(run_id);

        let transport = Arc::clone(&self.transport);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            transport.send_message(&request, &cancel)
        }));

        let event = match outcome {
            Ok(Ok(_)) if cancel.load(Ordering::SeqCst) => RunEvent::Cancelled { run_id },
            Ok(Ok(reply)) => RunEvent::Finished { run_id, reply },
            Ok(Err(TransportError::Cancelled)) => RunEvent::Cancelled { run_id },
            Ok(Err(error)) => RunEvent::Failed {
                run_id,
                error: error.to_string(),
            },
            Err(_) => RunEvent::Failed {
                run_id,
                error: "Transport panicked".to_string(),
            },
        };

        self.enqueue_run_event(event);
    }

    fn enqueue_run_event(&self, event: RunEvent) {
        lock_unpoisoned(&self.pending_events).push_back(event);
    }

    fn drain_pending_run_events(&self) -> usize {
        let mut drained = 0usize;

        loop {
            let event = {
                let mut pending_events = lock_unpoisoned(&self.pending_events);
                pending_events.pop_front()
            };

            match event {
                Some(event) => {
                    self.apply_run_event(event);
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    /// Applies queued run events to the session and schedules a render.
    pub fn flush_pending_run_events(&self) -> usize {
        let drained = self.drain_pending_run_events();
        if drained > 0 {
            self.render_requested.store(true, Ordering::SeqCst);
        }

        drained
    }

    fn wait_for_session_run_visibility(&self, run_id: RunId) {
        for _ in 0..256 {
            let run_visible = {
                let session = lock_unpoisoned(&self.session);
                matches!(session.mode, Mode::Sending { run_id: current, .. } if current == run_id)
            };

            if run_visible {
                return;
            }

            thread::yield_now();
        }
    }

    fn apply_run_event(&self, event: RunEvent) {
        let run_id = event.run_id();

        {
            let mut session = lock_unpoisoned(&self.session);
            match event {
                RunEvent::Finished { run_id, reply } => session.on_run_finished(run_id, reply),
                RunEvent::Failed { run_id, error } => session.on_run_failed(run_id, &error),
                RunEvent::Cancelled { run_id } => session.on_run_cancelled(run_id),
            }
        }

        self.clear_active_run_if_matching(run_id);
    }

    fn clear_active_run_if_matching(&self, run_id: RunId) {
        let mut active_run = self.lock_active_run();
        let matches = active_run.as_ref().map(|active| active.run_id) == Some(run_id);
        if !matches {
            return;
        }

        let Some(mut completed) = active_run.take() else {
            return;
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }

    fn cancel_run_internal(&self, run_id: RunId) {
        let active_run = self.lock_active_run();
        if let Some(active_run) = active_run.as_ref() {
            if active_run.run_id == run_id {
                active_run.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    fn lock_active_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        lock_unpoisoned(&self.active_run)
    }
}

impl HostOps for Arc<RuntimeController> {
    fn start_run(&mut self, request: ChatRequest) -> Result<RunId, String> {
        self.start_run_internal(request)
    }

    fn cancel_run(&mut self, run_id: RunId) {
        self.cancel_run_internal(run_id);
    }

    fn fetch_history(&mut self, session_id: &str) -> Result<Vec<HistoryRecord>, String> {
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        self.transport
            .fetch_history(session_id, &cancel)
            .map_err(|error| error.to_string())
    }

    fn list_models(&mut self) -> Result<Vec<String>, String> {
        self.transport
            .list_models()
            .map_err(|error| error.to_string())
    }

    fn exchanges(&mut self) -> Vec<ExchangeEntry> {
        self.transport.exchanges()
    }

    fn clear_exchanges(&mut self) {
        self.transport.clear_exchanges();
    }

    fn request_render(&mut self) {
        self.render_requested.store(true, Ordering::SeqCst);
    }

    fn request_stop(&mut self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
