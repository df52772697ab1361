//! Fixed-cadence sampling with drift correction and cooperative cancellation.
//!
//! Sample `k` of a run is due at `start + k * interval`, so a slow sample
//! delays only itself and never the rest of the schedule. Between samples
//! the loop sleeps in short sub-intervals and polls a bounded control
//! channel, which is how [`SamplerHandle::stop`] and
//! [`SamplerHandle::query_statistics`] reach it without touching the bus.
//!
//! Two modes share the loop: [`SamplingMode::Bounded`] runs for a fixed time
//! and keeps every sample; [`SamplingMode::Continuous`] runs until stopped
//! and keeps the most recent [`SchedulerConfig::log_capacity`] samples.

use crate::autorange::AutoRanger;
use crate::bus::BusPort;
use crate::chip::MeasurementKind;
use crate::device::RegisterDevice;
use crate::error::{Error, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Samples kept in continuous mode.
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;
/// Sleep granularity between control checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Upper bound for the poll interval; bounds the cancellation latency.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CONTROL_QUEUE_DEPTH: usize = 16;

/// One channel of one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    pub current_a: f64,
    pub voltage_v: f64,
    pub power_w: f64,
}

/// A time-stamped reading of all requested channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: SystemTime,
    /// Time since the start of the run.
    pub relative_time: Duration,
    /// 1-based attempt number; failed attempts consume a number too.
    pub sequence: u64,
    pub channels: BTreeMap<u8, ChannelReading>,
}

/// Anything that can produce a reading of several channels at once.
///
/// A sample is all or nothing: if one channel fails, the whole sample fails.
pub trait SampleSource {
    fn available_channels(&self) -> Vec<u8>;

    /// Fails if the source cannot produce samples yet (e.g. not calibrated).
    fn ensure_ready(&self) -> Result<()>;

    fn sample(&mut self, channels: &[u8]) -> Result<BTreeMap<u8, ChannelReading>>;
}

impl<B: BusPort> SampleSource for RegisterDevice<B> {
    fn available_channels(&self) -> Vec<u8> {
        self.chip().channels()
    }

    fn ensure_ready(&self) -> Result<()> {
        match self
            .chip()
            .channels()
            .into_iter()
            .find(|&ch| self.calibration(ch).is_none())
        {
            Some(channel) => Err(Error::NotCalibrated {
                chip: self.chip(),
                channel,
            }),
            None => Ok(()),
        }
    }

    fn sample(&mut self, channels: &[u8]) -> Result<BTreeMap<u8, ChannelReading>> {
        let host_power = self.chip().constants().power_lsb_factor.is_none();
        let mut readings = BTreeMap::new();
        for &ch in channels {
            let current_a = self.read_current(ch)?;
            let voltage_v = self.read_voltage(ch)?;
            let power_w = if host_power {
                voltage_v * current_a
            } else {
                self.read_measurement(MeasurementKind::Power, ch)?
            };
            readings.insert(
                ch,
                ChannelReading {
                    current_a,
                    voltage_v,
                    power_w,
                },
            );
        }
        Ok(readings)
    }
}

/// The ranger reports one channel, [`AutoRanger::OUTPUT_CHANNEL`]; each
/// sample is one control step.
impl<B: BusPort> SampleSource for AutoRanger<B> {
    fn available_channels(&self) -> Vec<u8> {
        vec![Self::OUTPUT_CHANNEL]
    }

    fn ensure_ready(&self) -> Result<()> {
        self.device().ensure_ready()
    }

    fn sample(&mut self, _channels: &[u8]) -> Result<BTreeMap<u8, ChannelReading>> {
        let current_a = self.process()?;
        let channel = self.voltage_channel();
        let voltage_v = self.device_mut().read_voltage(channel)?;
        let mut readings = BTreeMap::new();
        readings.insert(
            Self::OUTPUT_CHANNEL,
            ChannelReading {
                current_a,
                voltage_v,
                power_w: voltage_v * current_a,
            },
        );
        Ok(readings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingMode {
    /// Run for `duration`, then return every sample.
    Bounded { duration: Duration },
    /// Run until stopped; keep the most recent samples only.
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingRequest {
    pub mode: SamplingMode,
    pub interval: Duration,
    /// Channels to read; `None` reads every channel of the source.
    pub channels: Option<Vec<u8>>,
}

impl SamplingRequest {
    pub fn bounded(duration: Duration, interval: Duration) -> Self {
        Self {
            mode: SamplingMode::Bounded { duration },
            interval,
            channels: None,
        }
    }

    pub fn continuous(interval: Duration) -> Self {
        Self {
            mode: SamplingMode::Continuous,
            interval,
            channels: None,
        }
    }

    pub fn with_channels(mut self, channels: impl Into<Vec<u8>>) -> Self {
        self.channels = Some(channels.into());
        self
    }

    /// Number of samples a bounded run is expected to produce.
    pub fn target_samples(&self) -> Option<u64> {
        match self.mode {
            SamplingMode::Bounded { duration } if !self.interval.is_zero() => {
                let d = duration.as_nanos();
                let i = self.interval.as_nanos();
                Some(d.div_ceil(i) as u64)
            }
            _ => None,
        }
    }

    fn validate(&self, available: &[u8]) -> Result<Vec<u8>> {
        if self.interval.is_zero() {
            return Err(Error::Configuration("sampling interval must be positive".to_string()));
        }
        if let SamplingMode::Bounded { duration } = self.mode {
            if duration.is_zero() {
                return Err(Error::Configuration("sampling duration must be positive".to_string()));
            }
        }
        let channels = match &self.channels {
            Some(channels) => channels.clone(),
            None => available.to_vec(),
        };
        if channels.is_empty() {
            return Err(Error::Configuration("no channels to sample".to_string()));
        }
        if let Some(ch) = channels.iter().find(|ch| !available.contains(ch)) {
            return Err(Error::Configuration(format!(
                "channel {} is not available (source has {:?})",
                ch, available
            )));
        }
        Ok(channels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Samples kept in continuous mode.
    pub log_capacity: usize,
    /// Sleep granularity between control checks; at most 100 ms.
    pub poll_interval: Duration,
    /// Log progress every this many samples; 0 disables.
    pub progress_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress_every: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_capacity == 0 {
            return Err(Error::Configuration("log capacity must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(Error::Configuration(format!(
                "poll interval must be in (0, {:?}], got {:?}",
                MAX_POLL_INTERVAL, self.poll_interval
            )));
        }
        Ok(())
    }
}

/// Min, max and mean of one quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSummary {
    pub samples: usize,
    pub current_a: Summary,
    pub voltage_v: Summary,
    pub power_w: Summary,
}

#[derive(Default)]
struct Accumulator {
    n: usize,
    min: f64,
    max: f64,
    sum: f64,
}

impl Accumulator {
    fn add(&mut self, v: f64) {
        if self.n == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.sum += v;
        self.n += 1;
    }

    fn summary(&self) -> Summary {
        Summary {
            min: self.min,
            max: self.max,
            mean: if self.n == 0 { 0.0 } else { self.sum / self.n as f64 },
        }
    }
}

/// Samples of the current run, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SampleLog {
    samples: VecDeque<Sample>,
    capacity: Option<usize>,
    evicted: u64,
}

impl SampleLog {
    /// A log that keeps at most `capacity` samples, or all of them for `None`.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity,
            evicted: 0,
        }
    }

    /// Appends a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: Sample) {
        if let Some(cap) = self.capacity {
            while self.samples.len() >= cap.max(1) {
                self.samples.pop_front();
                self.evicted += 1;
            }
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples dropped to respect the capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    /// Per-channel min/max/mean over the retained samples.
    pub fn summary(&self) -> BTreeMap<u8, ChannelSummary> {
        let mut acc: BTreeMap<u8, [Accumulator; 3]> = BTreeMap::new();
        for sample in &self.samples {
            for (&ch, r) in &sample.channels {
                let [i, v, p] = acc.entry(ch).or_default();
                i.add(r.current_a);
                v.add(r.voltage_v);
                p.add(r.power_w);
            }
        }
        acc.into_iter()
            .map(|(ch, [i, v, p])| {
                (
                    ch,
                    ChannelSummary {
                        samples: i.n,
                        current_a: i.summary(),
                        voltage_v: v.summary(),
                        power_w: p.summary(),
                    },
                )
            })
            .collect()
    }
}

/// Progress of a run, as answered to a statistics query or returned at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    /// Successful samples.
    pub total_samples: u64,
    pub failed_samples: u64,
    pub elapsed: Duration,
    pub interval: Duration,
    /// `1 / interval`.
    pub target_rate_hz: f64,
    /// Successful samples per second of elapsed time.
    pub achieved_rate_hz: f64,
    /// `achieved_rate_hz / target_rate_hz`.
    pub timing_accuracy: f64,
    /// Expected sample count of a bounded run.
    pub target_samples: Option<u64>,
    /// Deadlines skipped because a sample overran them.
    pub missed_deadlines: u64,
    pub channels: BTreeMap<u8, ChannelSummary>,
    pub last_failure: Option<String>,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct SamplingReport {
    /// Every sample of a bounded run; the retained tail of a continuous run.
    pub samples: Vec<Sample>,
    pub statistics: Statistics,
    /// The run ended on a stop request (or because every handle was dropped).
    pub stopped: bool,
}

enum Control {
    Stop,
    QueryStats(SyncSender<Statistics>),
}

/// Cloneable remote control for a [`SamplingScheduler`].
///
/// Handles never touch the bus: stop and statistics requests travel over a
/// bounded channel, and the sample log is read under a shared lock.
#[derive(Clone)]
pub struct SamplerHandle {
    control: SyncSender<Control>,
    log: Arc<RwLock<SampleLog>>,
}

impl SamplerHandle {
    /// Asks the sampling loop to stop; it reacts within one poll interval.
    pub fn stop(&self) -> Result<()> {
        self.control
            .send(Control::Stop)
            .map_err(|_| Error::SamplerStopped)
    }

    /// Asks the running loop for its statistics and waits up to `timeout`.
    ///
    /// A loop busy with a slow sample answers late and yields
    /// [`Error::Timeout`]; a finished loop yields [`Error::SamplerStopped`].
    pub fn query_statistics(&self, timeout: Duration) -> Result<Statistics> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.control
            .send(Control::QueryStats(tx))
            .map_err(|_| Error::SamplerStopped)?;
        rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::Timeout,
            RecvTimeoutError::Disconnected => Error::SamplerStopped,
        })
    }

    pub fn latest(&self) -> Option<Sample> {
        self.log.read().latest().cloned()
    }

    /// Consistent copy of the retained samples.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.log.read().to_vec()
    }

    pub fn summary(&self) -> BTreeMap<u8, ChannelSummary> {
        self.log.read().summary()
    }
}

struct RunState {
    start: Instant,
    interval: Duration,
    target_samples: Option<u64>,
    ok: u64,
    failed: u64,
    missed: u64,
    last_failure: Option<String>,
}

impl RunState {
    fn statistics(&self, log: &SampleLog) -> Statistics {
        let elapsed = self.start.elapsed();
        let target_rate_hz = 1.0 / self.interval.as_secs_f64();
        // Failed attempts do not count towards the achieved rate.
        let achieved_rate_hz = if elapsed.is_zero() {
            0.0
        } else {
            self.ok as f64 / elapsed.as_secs_f64()
        };
        Statistics {
            total_samples: self.ok,
            failed_samples: self.failed,
            elapsed,
            interval: self.interval,
            target_rate_hz,
            achieved_rate_hz,
            timing_accuracy: achieved_rate_hz / target_rate_hz,
            target_samples: self.target_samples,
            missed_deadlines: self.missed,
            channels: log.summary(),
            last_failure: self.last_failure.clone(),
        }
    }
}

/// Offset of deadline `k` from the start of the run.
fn deadline_offset(interval: Duration, k: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(k as u128);
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Runs sampling loops; one run at a time.
pub struct SamplingScheduler {
    config: SchedulerConfig,
    control: Receiver<Control>,
    log: Arc<RwLock<SampleLog>>,
    handles_gone: bool,
}

impl SamplingScheduler {
    pub fn new(config: SchedulerConfig) -> (Self, SamplerHandle) {
        let (tx, rx) = mpsc::sync_channel(CONTROL_QUEUE_DEPTH);
        let log = Arc::new(RwLock::new(SampleLog::new(Some(config.log_capacity))));
        let handle = SamplerHandle {
            control: tx,
            log: Arc::clone(&log),
        };
        (
            Self {
                config,
                control: rx,
                log,
                handles_gone: false,
            },
            handle,
        )
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs one sampling loop on the calling thread.
    ///
    /// Configuration problems (bad request, unavailable channels, a source
    /// that is not ready) fail before the first sample. Once running, a
    /// failed sample is logged and counted and the cadence continues.
    pub fn execute<S, F>(
        &mut self,
        source: &mut S,
        request: &SamplingRequest,
        mut on_sample: F,
    ) -> Result<SamplingReport>
    where
        S: SampleSource + ?Sized,
        F: FnMut(&Sample),
    {
        self.config.validate()?;
        let channels = request.validate(&source.available_channels())?;
        source.ensure_ready()?;

        let capacity = match request.mode {
            SamplingMode::Bounded { .. } => None,
            SamplingMode::Continuous => Some(self.config.log_capacity),
        };
        *self.log.write() = SampleLog::new(capacity);
        self.handles_gone = false;

        let start = Instant::now();
        let start_wall = SystemTime::now();
        let end = match request.mode {
            SamplingMode::Bounded { duration } => {
                let end = start.checked_add(duration).ok_or_else(|| {
                    Error::Configuration(format!("sampling duration {:?} is out of range", duration))
                })?;
                Some(end)
            }
            SamplingMode::Continuous => None,
        };
        let continuous = end.is_none();
        let mut state = RunState {
            start,
            interval: request.interval,
            target_samples: request.target_samples(),
            ok: 0,
            failed: 0,
            missed: 0,
            last_failure: None,
        };
        info!(
            "Sampling {:?} every {:?} ({})",
            channels,
            request.interval,
            match request.mode {
                SamplingMode::Bounded { duration } => format!("for {:?}", duration),
                SamplingMode::Continuous => "until stopped".to_string(),
            }
        );

        let mut sequence: u64 = 0;
        let mut k: u64 = 0;
        let mut stopped = false;
        'run: loop {
            if self.poll_control(&state, continuous) {
                stopped = true;
                break;
            }
            let now = Instant::now();
            if end.is_some_and(|end| now >= end) {
                break;
            }

            sequence += 1;
            match source.sample(&channels) {
                Ok(readings) => {
                    let relative_time = now.duration_since(start);
                    let sample = Sample {
                        timestamp: start_wall + relative_time,
                        relative_time,
                        sequence,
                        channels: readings,
                    };
                    on_sample(&sample);
                    self.log.write().push(sample);
                    state.ok += 1;
                    if self.config.progress_every > 0 && state.ok % self.config.progress_every == 0 {
                        info!(
                            "{} samples in {:.1} s ({} failed)",
                            state.ok,
                            start.elapsed().as_secs_f64(),
                            state.failed
                        );
                    }
                }
                Err(e) => {
                    state.failed += 1;
                    warn!("Sample {} failed ({:?}): {}", sequence, e.kind(), e);
                    state.last_failure = Some(e.to_string());
                }
            }

            // Next deadline; skip slots that already passed.
            k += 1;
            let elapsed = start.elapsed();
            if elapsed > deadline_offset(request.interval, k) {
                let due = (elapsed.as_nanos() / request.interval.as_nanos()) as u64 + 1;
                state.missed += due - k;
                debug!("Sample {} overran {} deadline(s)", sequence, due - k);
                k = due;
            }
            // No deadline past the representable range: wait for the end or a stop.
            let deadline = match (start.checked_add(deadline_offset(request.interval, k)), end) {
                (Some(next), Some(end)) => Some(next.min(end)),
                (next, end) => next.or(end),
            };

            loop {
                let now = Instant::now();
                let pause = match deadline {
                    Some(deadline) if now >= deadline => break,
                    Some(deadline) => (deadline - now).min(self.config.poll_interval),
                    None => self.config.poll_interval,
                };
                thread::sleep(pause);
                if self.poll_control(&state, continuous) {
                    stopped = true;
                    break 'run;
                }
            }
        }

        let log = self.log.read();
        let statistics = state.statistics(&log);
        info!(
            "Sampling finished: {} samples, {} failed, {:.2} Hz ({:.1}% of target)",
            statistics.total_samples,
            statistics.failed_samples,
            statistics.achieved_rate_hz,
            statistics.timing_accuracy * 100.0
        );
        Ok(SamplingReport {
            samples: log.to_vec(),
            statistics,
            stopped,
        })
    }

    /// Drains pending control messages; returns true if the run must stop.
    fn poll_control(&mut self, state: &RunState, continuous: bool) -> bool {
        loop {
            match self.control.try_recv() {
                Ok(Control::Stop) => {
                    info!("Stop requested");
                    return true;
                }
                Ok(Control::QueryStats(reply)) => {
                    let stats = state.statistics(&self.log.read());
                    // The asker may have timed out already.
                    let _ = reply.try_send(stats);
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    if continuous {
                        info!("All sampler handles dropped; stopping continuous run");
                        return true;
                    }
                    if !self.handles_gone {
                        debug!("All sampler handles dropped");
                        self.handles_gone = true;
                    }
                    return false;
                }
            }
        }
    }

    /// Runs [`execute`](Self::execute) on a dedicated thread.
    ///
    /// The thread hands the source back together with the outcome.
    pub fn spawn<S, F>(
        mut self,
        mut source: S,
        request: SamplingRequest,
        mut on_sample: F,
    ) -> Result<thread::JoinHandle<(S, Result<SamplingReport>)>>
    where
        S: SampleSource + Send + 'static,
        F: FnMut(&Sample) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || {
                let outcome = self.execute(&mut source, &request, &mut on_sample);
                (source, outcome)
            })?;
        Ok(handle)
    }
}
