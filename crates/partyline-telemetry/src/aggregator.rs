//! The telemetry aggregator: event log, summaries, and health reports.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

use crate::{CpuUsage, EventKind, EventRecord, MemoryUsage, ResourceSampler};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// TelemetryConfig
// ---------------------------------------------------------------------------

/// Limits for the event log and health queries.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Events kept before the oldest fifth is dropped.
    pub max_events: usize,
    /// Smallest bucket a health query may ask for.
    pub min_span_ms: u64,
    /// Most buckets a health query may cover.
    pub max_buckets: u64,
    /// How often the server should call [`Telemetry::sample_cpu`].
    pub cpu_sample_interval: Duration,
    /// Reported as `version` in health reports.
    pub version: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_events: 1_000_000,
            min_span_ms: 1_000,
            max_buckets: 200,
            cpu_sample_interval: Duration::from_secs(2),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Running totals for one summary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentDatum {
    pub count: u64,
    pub sum: u64,
}

/// One labelled column of a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentColumn {
    pub label: String,
    pub data: SegmentDatum,
}

/// All events that fell into one time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    /// Bucket start, in epoch milliseconds.
    pub date: u64,
    pub columns: Vec<SegmentColumn>,
}

/// Current room counts, supplied by the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_count: usize,
    pub active_rooms: usize,
    pub active_users: usize,
}

/// Time since the aggregator was created. Serializes as `D HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uptime {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Uptime {
    pub fn from_duration(elapsed: Duration) -> Self {
        let total = elapsed.as_secs();
        Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

impl Serialize for Uptime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which slice of history a health report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthQuery {
    /// Oldest event time of interest, epoch milliseconds.
    pub earliest_ms: u64,
    /// Bucket width in milliseconds.
    pub span_ms: u64,
    /// Newest event time of interest; `None` means now.
    pub latest_ms: Option<u64>,
}

impl Default for HealthQuery {
    fn default() -> Self {
        Self {
            earliest_ms: 0,
            span_ms: 60_000,
            latest_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub version: String,
    pub uptime: Uptime,
    pub rooms: RoomSummary,
    /// All-time totals, by summary key.
    pub summary: Vec<SegmentColumn>,
    /// Bucketed totals, oldest bucket first.
    pub series: Vec<SeriesPoint>,
    pub cpu_usage: CpuUsage,
    pub memory_usage: MemoryUsage,
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

type Segment = BTreeMap<String, SegmentDatum>;

fn add_to_segment(segment: &mut Segment, ev: &EventRecord) {
    let datum = segment.entry(ev.segment_key()).or_default();
    datum.count += 1;
    datum.sum += ev.value.unwrap_or(0);
}

fn columns(segment: Segment) -> Vec<SegmentColumn> {
    segment
        .into_iter()
        .map(|(label, data)| SegmentColumn { label, data })
        .collect()
}

#[derive(Debug, Default)]
struct State {
    events: VecDeque<EventRecord>,
    summary: Segment,
}

/// Event log and resource sampler shared by the whole server.
///
/// All state sits behind short-lived `std` mutexes; nothing here awaits.
#[derive(Debug)]
pub struct Telemetry {
    config: TelemetryConfig,
    started: Instant,
    state: Mutex<State>,
    sampler: Mutex<ResourceSampler>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

impl Telemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            state: Mutex::new(State::default()),
            sampler: Mutex::new(ResourceSampler::new()),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Records an event stamped with the current time.
    pub fn log_event(&self, kind: EventKind, value: Option<u64>, info: Option<&str>) {
        self.log_event_at(kind, now_ms(), value, info);
    }

    /// Records an event with an explicit timestamp.
    pub fn log_event_at(
        &self,
        kind: EventKind,
        timestamp_ms: u64,
        value: Option<u64>,
        info: Option<&str>,
    ) {
        let record = EventRecord {
            kind,
            timestamp_ms,
            value,
            info: info.map(str::to_owned),
        };

        let mut state = self.lock_state();
        add_to_segment(&mut state.summary, &record);
        state.events.push_back(record);

        if state.events.len() > self.config.max_events {
            let excess = state.events.len() / 5;
            state.events.drain(..excess);
            tracing::debug!(dropped = excess, "telemetry log trimmed");
        }
    }

    pub fn event_count(&self) -> usize {
        self.lock_state().events.len()
    }

    /// All-time totals for one summary key.
    pub fn summary_for(&self, key: &str) -> Option<SegmentDatum> {
        self.lock_state().summary.get(key).copied()
    }

    /// Folds a CPU sample into the running average.
    pub fn sample_cpu(&self) -> CpuUsage {
        self.lock_sampler().sample()
    }

    pub fn uptime(&self) -> Uptime {
        Uptime::from_duration(self.started.elapsed())
    }

    /// Builds a health report for `query`.
    ///
    /// The query is clamped so it can never ask for more than
    /// `max_buckets` buckets or buckets narrower than `min_span_ms`.
    pub fn health_report(&self, query: HealthQuery, rooms: RoomSummary) -> HealthReport {
        let span = query.span_ms.max(self.config.min_span_ms);
        let mut earliest = query.earliest_ms;
        let latest = query.latest_ms.unwrap_or_else(now_ms).max(earliest);
        earliest = earliest.max(latest.saturating_sub(span.saturating_mul(self.config.max_buckets)));

        let (summary, buckets) = {
            let state = self.lock_state();
            let mut buckets: BTreeMap<u64, Segment> = BTreeMap::new();
            for ev in state.events.iter().rev() {
                if ev.timestamp_ms < earliest {
                    break;
                }
                if ev.timestamp_ms <= latest {
                    let start = ev.timestamp_ms / span * span;
                    add_to_segment(buckets.entry(start).or_default(), ev);
                }
            }
            (state.summary.clone(), buckets)
        };

        let series = buckets
            .into_iter()
            .map(|(date, segment)| SeriesPoint {
                date,
                columns: columns(segment),
            })
            .collect();

        let (cpu_usage, memory_usage) = {
            let sampler = self.lock_sampler();
            (sampler.cpu(), sampler.memory())
        };

        HealthReport {
            version: self.config.version.clone(),
            uptime: self.uptime(),
            rooms,
            summary: columns(summary),
            series,
            cpu_usage,
            memory_usage,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic mid-update leaves at worst a half-counted event.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_sampler(&self) -> std::sync::MutexGuard<'_, ResourceSampler> {
        self.sampler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
