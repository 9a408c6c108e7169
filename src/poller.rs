// Background register poller.
//
// A dedicated thread walks the configured register list, pushes every
// successful read into that register's bounded queue and reports the
// wall-clock duration of each full pass. A failed read is logged by the
// transport and skipped; a disconnected bus makes the loop back off
// instead of spinning. Cancellation is cooperative.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{POLL_BACKOFF, POLLER_JOIN_TIMEOUT, SAMPLE_QUEUE_CAPACITY};
use crate::messages::Sample;
use crate::vmk::RegisterBus;

/// Thread-safe bounded FIFO of samples, drop-oldest on overflow.
///
/// The poller never blocks on a slow consumer and the consumer never
/// blocks on the poller; popping an empty queue is a no-op.
#[derive(Debug)]
pub struct SampleQueue {
    inner: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, sample: Sample) {
        let mut queue = self.inner.lock();
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(sample);
    }

    pub fn pop(&self) -> Option<Sample> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new(SAMPLE_QUEUE_CAPACITY)
    }
}

/// One polled register and the queue its samples land in.
pub type PollEntry = (u8, Arc<SampleQueue>);

type CycleCallback = Arc<dyn Fn(Duration) + Send + Sync>;
type DataCallback = Arc<dyn Fn() + Send + Sync>;

/// Background sampling loop over a [`RegisterBus`].
pub struct Poller {
    bus: Arc<dyn RegisterBus>,
    interval: Duration,
    entries: Mutex<Option<Arc<Vec<PollEntry>>>>,
    on_cycle_time: Mutex<Option<CycleCallback>>,
    on_new_data: Mutex<Option<DataCallback>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(bus: Arc<dyn RegisterBus>, interval: Duration) -> Self {
        Self {
            bus,
            interval,
            entries: Mutex::new(None),
            on_cycle_time: Mutex::new(None),
            on_new_data: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Set the ordered register list. Must happen before `start`.
    pub fn set_polling_config(&self, entries: Vec<PollEntry>) {
        *self.entries.lock() = Some(Arc::new(entries));
    }

    /// Callback invoked with the wall-clock duration of every full pass.
    pub fn on_cycle_time(&self, callback: impl Fn(Duration) + Send + Sync + 'static) {
        *self.on_cycle_time.lock() = Some(Arc::new(callback));
    }

    /// Callback invoked after every full pass once new samples are queued.
    pub fn on_new_data(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_new_data.lock() = Some(Arc::new(callback));
    }

    /// Spawn the sampling thread. Returns false without a polling
    /// configuration or when already running.
    pub fn start(&self) -> bool {
        let Some(entries) = self.entries.lock().clone() else {
            warn!("poller started without a polling configuration");
            return false;
        };
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let bus = self.bus.clone();
        let interval = self.interval;
        let running = self.running.clone();
        let on_cycle_time = self.on_cycle_time.lock().clone();
        let on_new_data = self.on_new_data.lock().clone();

        let handle = thread::Builder::new()
            .name("vmk-poller".into())
            .spawn(move || {
                sampling_loop(bus, entries, interval, running, on_cycle_time, on_new_data);
            });
        match handle {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                true
            }
            Err(e) => {
                warn!("failed to spawn poller thread: {e}");
                self.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag and wait for the thread to observe it, up to
    /// a bounded timeout. Safe to call repeatedly.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let deadline = Instant::now() + POLLER_JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            // No forced termination; the detached thread exits on its own
            // once its current register read returns.
            warn!("poller thread did not stop within {POLLER_JOIN_TIMEOUT:?}");
        }
    }
}

fn sampling_loop(
    bus: Arc<dyn RegisterBus>,
    entries: Arc<Vec<PollEntry>>,
    interval: Duration,
    running: Arc<AtomicBool>,
    on_cycle_time: Option<CycleCallback>,
    on_new_data: Option<DataCallback>,
) {
    let mut pass_started = Instant::now();
    while running.load(Ordering::SeqCst) {
        if !bus.is_connected() {
            thread::sleep(POLL_BACKOFF);
            pass_started = Instant::now();
            continue;
        }

        for &(address, ref queue) in entries.iter() {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            match bus.read_register(address) {
                Some(value) => queue.push(Sample { address, value }),
                None => debug!("poll of register 0x{address:02X} returned nothing"),
            }
            thread::sleep(interval);
        }

        if running.load(Ordering::SeqCst) {
            let elapsed = pass_started.elapsed();
            pass_started = Instant::now();
            if let Some(callback) = &on_cycle_time {
                callback(elapsed);
            }
            if let Some(callback) = &on_new_data {
                callback();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let queue = SampleQueue::new(10);
        for value in 0..15u16 {
            queue.push(Sample { address: 0, value });
        }
        assert_eq!(queue.len(), 10);
        // exactly the 10 most recent remain, oldest first
        for expected in 5..15u16 {
            assert_eq!(queue.pop().map(|s| s.value), Some(expected));
        }
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    /// Bus double that counts reads and fails every third one.
    struct CountingBus {
        reads: AtomicU32,
        connected: AtomicBool,
    }

    impl CountingBus {
        fn new() -> Self {
            Self {
                reads: AtomicU32::new(0),
                connected: AtomicBool::new(true),
            }
        }
    }

    impl RegisterBus for CountingBus {
        fn read_register(&self, _address: u8) -> Option<u16> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n % 3 == 2 { None } else { Some(n as u16) }
        }

        fn write_register(&self, _address: u8, _value: u16) -> bool {
            true
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_start_requires_polling_config() {
        let bus = Arc::new(CountingBus::new());
        let poller = Poller::new(bus, Duration::from_millis(1));
        assert!(!poller.start());
        assert!(!poller.is_running());
        poller.stop();
    }

    #[test]
    fn test_start_is_idempotent_and_stop_is_safe_twice() {
        let bus = Arc::new(CountingBus::new());
        let poller = Poller::new(bus, Duration::from_millis(1));
        let queue = Arc::new(SampleQueue::default());
        poller.set_polling_config(vec![(0x00, queue)]);

        assert!(poller.start());
        assert!(!poller.start());
        assert!(poller.is_running());

        poller.stop();
        assert!(!poller.is_running());
        poller.stop();
    }

    #[test]
    fn test_samples_flow_and_failed_reads_do_not_kill_the_loop() {
        let bus = Arc::new(CountingBus::new());
        let poller = Poller::new(bus.clone(), Duration::from_millis(1));
        let status = Arc::new(SampleQueue::default());
        let period = Arc::new(SampleQueue::default());
        poller.set_polling_config(vec![(0x00, status.clone()), (0x06, period.clone())]);

        let cycles = Arc::new(AtomicU32::new(0));
        let cycle_counter = cycles.clone();
        poller.on_cycle_time(move |_| {
            cycle_counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(poller.start());
        while cycles.load(Ordering::SeqCst) < 5 {
            thread::sleep(Duration::from_millis(2));
        }
        poller.stop();

        // every third read fails, yet both queues keep receiving samples
        assert!(bus.reads.load(Ordering::SeqCst) >= 10);
        assert!(!status.is_empty() || !period.is_empty());
    }

    #[test]
    fn test_disconnected_bus_backs_off() {
        let bus = Arc::new(CountingBus::new());
        bus.connected.store(false, Ordering::SeqCst);
        let poller = Poller::new(bus.clone(), Duration::from_millis(1));
        poller.set_polling_config(vec![(0x00, Arc::new(SampleQueue::default()))]);

        assert!(poller.start());
        thread::sleep(Duration::from_millis(20));
        poller.stop();

        // no reads are attempted while disconnected
        assert_eq!(bus.reads.load(Ordering::SeqCst), 0);
    }
}
