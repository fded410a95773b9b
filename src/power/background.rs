//! Background polling tasks driving the drain tracker and the energy ledger

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::power::drain::{DrainAttributionTracker, DrainSampler, DrainState, ScreenEvent};
use crate::power::ledger::{EnergyLedger, IncrementalEnergyAccumulator};
use crate::power::models::PowerSnapshot;
use crate::power::stats::build_snapshot;

/// Supplies raw checkin text, e.g. by running the platform's batterystats dump.
///
/// `None` means the text could not be obtained this cycle.
pub trait CheckinSource: Send {
    fn fetch(&mut self) -> Option<String>;
}

impl<F> CheckinSource for F
where
    F: FnMut() -> Option<String> + Send,
{
    fn fetch(&mut self) -> Option<String> {
        self()
    }
}

/// Out-of-band input to the drain poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEvent {
    /// Screen transition; sampled immediately so the boundary lands in the right bucket
    Screen(ScreenEvent),
    /// User-requested reset of all totals
    Reset,
}

/// Handle to a running poller task
pub struct PollerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Ask the poller to stop after its current cycle
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && !self.task.is_finished()
    }

    /// Stop and wait for the task to finish
    pub async fn join(mut self) {
        self.stop();
        if let Err(e) = self.task.await {
            log::warn!("Poller task ended abnormally: {}", e);
        }
    }
}

/// Start tracking drain on a fixed cadence plus screen-transition samples.
///
/// The tracker is (re)started here and owned by the task. Every reading publishes the
/// updated state on the returned channel.
pub fn spawn_drain_poller<S>(
    mut tracker: DrainAttributionTracker,
    mut sampler: S,
    mut events: mpsc::Receiver<DrainEvent>,
    period: Duration,
) -> (PollerHandle, watch::Receiver<DrainState>)
where
    S: DrainSampler + 'static,
{
    tracker.start(Utc::now());
    let (state_tx, state_rx) = watch::channel(tracker.state().clone());
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        loop {
            // First tick fires immediately and takes the baseline reading
            tokio::select! {
                _ = ticker.tick() => {}
                event = events.recv(), if events_open => match event {
                    Some(DrainEvent::Screen(screen)) => {
                        log::debug!("Screen turned {:?}, sampling now", screen);
                        ticker.reset();
                    }
                    Some(DrainEvent::Reset) => {
                        tracker.reset(Utc::now());
                        log::info!("Drain totals reset, session {}", tracker.state().session_id);
                        state_tx.send_replace(tracker.state().clone());
                        continue;
                    }
                    // All senders gone; keep running on the timer alone
                    None => {
                        events_open = false;
                        continue;
                    }
                },
                _ = &mut shutdown_rx => {
                    tracker.stop();
                    state_tx.send_replace(tracker.state().clone());
                    break;
                }
            }

            match sampler.sample() {
                Some(reading) => {
                    let outcome = tracker.offer(reading);
                    log::debug!("Drain sample: {:?}", outcome);
                    state_tx.send_replace(tracker.state().clone());
                }
                None => log::warn!("Drain sampler returned no reading"),
            }
        }
    });

    (
        PollerHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        },
        state_rx,
    )
}

/// Start feeding decoded checkin dumps into the energy ledger on a fixed cadence.
///
/// Each successfully decoded snapshot is published on the returned channel.
pub fn spawn_energy_poller<C, L>(
    mut accumulator: IncrementalEnergyAccumulator,
    mut source: C,
    mut ledger: L,
    period: Duration,
) -> (PollerHandle, watch::Receiver<PowerSnapshot>)
where
    C: CheckinSource + 'static,
    L: EnergyLedger + 'static,
{
    accumulator.reset();
    let (snapshot_tx, snapshot_rx) = watch::channel(PowerSnapshot::default());
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown_rx => {
                    log::info!("Energy poller shutting down");
                    break;
                }
            }

            // No text this cycle leaves the baseline untouched for the next one
            let text = match source.fetch() {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    log::warn!("No checkin output this cycle");
                    continue;
                }
            };

            let snapshot = build_snapshot(Some(&text));
            let report = accumulator.accumulate(&snapshot, Utc::now(), &mut ledger);
            if report.failed > 0 {
                log::warn!("{} ledger writes failed this cycle", report.failed);
            }
            snapshot_tx.send_replace(snapshot);
        }
    });

    (
        PollerHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        },
        snapshot_rx,
    )
}
