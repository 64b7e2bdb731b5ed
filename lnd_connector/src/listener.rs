use crate::connector::LndConnector;
use crate::invoice_cache::InvoiceCache;
use core_types::lnd::SettlementNotification;
use core_types::ZapNote;
use xerror::lnd_connector::LndConnectorError;

use futures_util::StreamExt;
use slog as log;
use slog::Logger;
use tokio::sync::{mpsc, oneshot};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Pause before resubscribing after LND closed or broke the stream.
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for ListenerState {
    fn from(value: u8) -> Self {
        match value {
            1 => ListenerState::Starting,
            2 => ListenerState::Running,
            3 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

/// Why a listener task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// LND ended the subscription.
    Closed,
    Failed(LndConnectorError),
    /// No invoices left to wait for.
    Drained,
    Stopped { resume: bool },
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Drained,
}

struct Inner {
    state: AtomicU8,
    stop_tx: Mutex<Option<oneshot::Sender<bool>>>,
    connector: Arc<LndConnector>,
    cache: InvoiceCache,
    zap_notes: mpsc::Sender<ZapNote>,
    retry_delay: Duration,
    logger: Logger,
}

/// Keeps at most one invoice subscription open while cached invoices wait
/// for settlement.
#[derive(Clone)]
pub struct SettlementListener {
    inner: Arc<Inner>,
}

impl SettlementListener {
    pub fn new(
        connector: Arc<LndConnector>,
        cache: InvoiceCache,
        zap_notes: mpsc::Sender<ZapNote>,
        logger: Logger,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ListenerState::Stopped as u8),
                stop_tx: Mutex::new(None),
                connector,
                cache,
                zap_notes,
                retry_delay: RETRY_DELAY,
                logger,
            }),
        }
    }

    /// Only takes effect before the listener is cloned.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry_delay = retry_delay;
        }
        self
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::from(self.inner.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: ListenerState, to: ListenerState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Starts a listener task unless one is already live. Returns whether a
    /// task was started.
    pub fn ensure_running(&self) -> bool {
        if !self.transition(ListenerState::Stopped, ListenerState::Starting) {
            return false;
        }
        log::info!(self.inner.logger, "Starting LND invoice listener");
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.inner.stop_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);
        let listener = self.clone();
        tokio::spawn(async move { listener.run(stop_rx).await });
        true
    }

    pub fn stop(&self) {
        self.signal_stop(false);
    }

    /// Restarts the subscription, e.g. after the node address changed.
    pub fn reconnect(&self) {
        if !self.signal_stop(true) && !self.inner.cache.is_empty() {
            self.ensure_running();
        }
    }

    fn signal_stop(&self, resume: bool) -> bool {
        let stop_tx = self.inner.stop_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match stop_tx {
            Some(stop_tx) => {
                let _ = self.transition(ListenerState::Running, ListenerState::Stopping)
                    || self.transition(ListenerState::Starting, ListenerState::Stopping);
                stop_tx.send(resume).is_ok()
            }
            None => false,
        }
    }

    async fn run(self, mut stop_rx: oneshot::Receiver<bool>) {
        let exit = self.listen(&mut stop_rx).await;
        match &exit {
            ListenerExit::Failed(err) => log::error!(self.inner.logger, "LND invoice listener failed: {}", err),
            exit => log::info!(self.inner.logger, "LND invoice listener closed: {:?}", exit),
        }

        self.inner.stop_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.inner.state.store(ListenerState::Stopped as u8, Ordering::SeqCst);

        if self.inner.cache.is_empty() {
            return;
        }
        match exit {
            // an invoice cached while we were shutting down still needs a listener
            ListenerExit::Drained | ListenerExit::Stopped { resume: true } => {
                self.ensure_running();
            }
            ListenerExit::Closed | ListenerExit::Failed(_) => self.retry_later(),
            ListenerExit::Stopped { resume: false } => {}
        }
    }

    fn retry_later(&self) {
        let delay = self.inner.retry_delay;
        log::info!(
            self.inner.logger,
            "{} invoices pending, resubscribing in {:?}",
            self.inner.cache.len(),
            delay
        );
        let listener = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // the janitor may have evicted everything in the meantime
            if !listener.inner.cache.is_empty() {
                listener.ensure_running();
            }
        });
    }

    async fn listen(&self, stop_rx: &mut oneshot::Receiver<bool>) -> ListenerExit {
        let mut lines = tokio::select! {
            resume = &mut *stop_rx => return ListenerExit::Stopped { resume: resume.unwrap_or(false) },
            subscription = self.inner.connector.subscribe_invoices() => match subscription {
                Ok(lines) => lines,
                Err(err) => return ListenerExit::Failed(err),
            },
        };
        self.transition(ListenerState::Starting, ListenerState::Running);

        loop {
            tokio::select! {
                resume = &mut *stop_rx => return ListenerExit::Stopped { resume: resume.unwrap_or(false) },
                line = lines.next() => match line {
                    None => return ListenerExit::Closed,
                    Some(Err(err)) => return ListenerExit::Failed(err),
                    Some(Ok(line)) => {
                        if self.handle_update(&line).await == Flow::Drained {
                            return ListenerExit::Drained;
                        }
                    }
                },
            }
        }
    }

    async fn handle_update(&self, line: &str) -> Flow {
        let logger = &self.inner.logger;
        log::debug!(logger, "Got streamed from LND: {}", line);
        if self.inner.cache.is_empty() {
            log::debug!(logger, "No invoices in cache, closing subscription");
            return Flow::Drained;
        }

        let invoice = match SettlementNotification::decode(line) {
            SettlementNotification::Settled(invoice) => invoice,
            SettlementNotification::Unsettled { add_index } => {
                log::debug!(logger, "Ignoring unsettled invoice {:?}", add_index);
                return Flow::Continue;
            }
            SettlementNotification::Error(error) => {
                log::error!(logger, "LND reported an error on the subscription: {}", error);
                return Flow::Continue;
            }
            SettlementNotification::Malformed(reason) => {
                log::error!(logger, "Unexpected update from LND ({}): {}", reason, line);
                return Flow::Continue;
            }
        };

        log::debug!(logger, "Checking for invoice idx {}", invoice.add_index);
        let pending = match self.inner.cache.take_if_present(&invoice.add_index) {
            Some(pending) => pending,
            None => {
                log::info!(logger, "Uncached add_index {} settled", invoice.add_index);
                return Flow::Continue;
            }
        };

        let note = ZapNote {
            request: pending.request,
            invoice,
        };
        if let Err(err) = self.inner.zap_notes.send(note).await {
            log::error!(logger, "Zap note for {} dropped: {}", err.0.invoice.add_index, err);
        }

        if self.inner.cache.is_empty() {
            Flow::Drained
        } else {
            Flow::Continue
        }
    }
}
