use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::{sync::oneshot, task};

use super::diagnostics::{DiagnosticsStream, SinkDiagnostic};
use super::emitter::EventEmitter;
use super::hub::{EventHub, EventStream};
use super::sink::{EventSink, StdOutSink};

/// Central event broadcasting system for host-side observability.
///
/// A running [`crate::graph::GraphAutoma`] dispatches `post_event`/
/// `request_feedback*` synchronously to its own `EventHandler`s (spec
/// §4.7) — that path is untouched by this module. `EventBus` is a
/// side channel a host can additionally attach (see
/// `GraphAutoma::attach_event_bus`) to fan the same observations out to
/// stdout, an in-memory buffer, a JSON-lines file, or an async channel,
/// without the scheduler itself depending on any particular sink.
///
/// ```text
/// ctx.post_event()
///     │ (synchronous EventHandler dispatch — unaffected)
///     │
///     │ (optional mirror)
///     ▼
/// EventBus
///     │ broadcast
///     ├─────┬─────┬─────┐
///     ▼     ▼     ▼     ▼
/// StdOut Memory JSONL Channel
///  Sink   Sink   Sink  Sink
/// ```
///
/// # Example
///
/// ```rust,no_run
/// use graphautoma::event_bus::{EventBus, Event, MemorySink};
///
/// let sink = MemorySink::new();
/// let bus = EventBus::with_sink(sink.clone());
/// bus.listen_for_events();
/// bus.get_emitter().emit(Event::diagnostic("startup", "ready")).unwrap();
/// ```
const DEFAULT_BUFFER_CAPACITY: usize = 1024;
const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

pub struct EventBus {
    sinks: Arc<Mutex<Vec<SinkEntry>>>,
    hub: Arc<EventHub>,
    started: AtomicBool,
    diag_tx: broadcast::Sender<SinkDiagnostic>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self::with_capacity(sinks, DEFAULT_BUFFER_CAPACITY)
    }

    pub(crate) fn with_capacity(sinks: Vec<Box<dyn EventSink>>, buffer_capacity: usize) -> Self {
        let hub = EventHub::new(buffer_capacity);
        let (diag_tx, _) = broadcast::channel(DEFAULT_DIAGNOSTICS_CAPACITY);
        let entries = sinks.into_iter().map(SinkEntry::new).collect();
        Self {
            sinks: Arc::new(Mutex::new(entries)),
            hub,
            started: AtomicBool::new(false),
            diag_tx,
        }
    }

    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.add_boxed_sink(Box::new(sink));
    }

    pub fn add_boxed_sink(&self, sink: Box<dyn EventSink>) {
        let mut sinks = self.sinks.lock().unwrap();
        let mut entry = SinkEntry::new(sink);
        if self.started.load(Ordering::SeqCst) {
            entry.spawn_worker(self.hub.clone(), self.diag_tx.clone());
        }
        sinks.push(entry);
    }

    pub fn get_emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::new(self.hub.emitter())
    }

    pub fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    /// Subscribes to sink-failure diagnostics: one [`SinkDiagnostic`] per
    /// `EventSink::handle` error, independent of the main event stream.
    pub fn diagnostics(&self) -> DiagnosticsStream {
        DiagnosticsStream::new(self.diag_tx.subscribe())
    }

    pub fn listen_for_events(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sinks = self.sinks.lock().unwrap();
        for entry in sinks.iter_mut() {
            entry.spawn_worker(self.hub.clone(), self.diag_tx.clone());
        }
    }

    pub async fn stop_listener(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut sinks = self.sinks.lock().unwrap();
        for entry in sinks.iter_mut() {
            entry.stop_worker().await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if self.started.load(Ordering::SeqCst) {
            if let Ok(mut sinks) = self.sinks.lock() {
                for entry in sinks.iter_mut() {
                    entry.abort_worker();
                }
            }
        }
    }
}

struct SinkEntry {
    sink: Arc<Mutex<Box<dyn EventSink>>>,
    occurrences: Arc<AtomicU64>,
    worker: Option<SinkWorker>,
}

impl SinkEntry {
    fn new(sink: Box<dyn EventSink>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            occurrences: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    fn spawn_worker(&mut self, hub: Arc<EventHub>, diag_tx: broadcast::Sender<SinkDiagnostic>) {
        if self.worker.is_some() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let occurrences = Arc::clone(&self.occurrences);
        let sink_name = sink.lock().unwrap().name();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let mut stream = hub.subscribe();
        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = stream.recv() => match event {
                        Ok(event) => {
                            if let Ok(mut guard) = sink.lock() {
                                if let Err(err) = guard.handle(&event) {
                                    eprintln!("EventBus sink error: {err}");
                                    let occurrence = occurrences.fetch_add(1, Ordering::SeqCst) + 1;
                                    let _ = diag_tx.send(SinkDiagnostic {
                                        sink: sink_name.clone(),
                                        error: err.to_string(),
                                        when: chrono::Utc::now(),
                                        occurrence,
                                    });
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        });
        self.worker = Some(SinkWorker {
            shutdown: shutdown_tx,
            handle,
        });
    }

    async fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            let _ = worker.handle.await;
        }
    }

    fn abort_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            worker.handle.abort();
        }
    }
}

struct SinkWorker {
    shutdown: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
