//! Range audit consumer.
//!
//! Drains the dispatch sink and implements the sample application shipped
//! with the platform playground: collect ten distinct vehicle-clock samples,
//! then compare the drop in predicted range against the distance actually
//! travelled (odometer) and against the distance integrated from average
//! speed. Every accepted sample is also recorded into plottable series that
//! are written to CSV when the drive cycle ends.
//!
//! The consumer is woken by the sink's level-triggered update condition,
//! drains the most recent value per signal per wake (older queued values
//! are stale), and clears the condition after each drain cycle.

use crate::error::Result;
use crate::signals::SignalName;
use crate::sink::SignalHub;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Power state reported while the vehicle is driving
pub const POWER_STATE_DRIVE: &str = "VEHICLE_POWER_STATE_DRIVE";

/// Distinct clock samples collected per evaluation window
const WINDOW_SAMPLES: usize = 10;

/// Wake poll interval; bounds how late the idle cutoff can fire
const WAKE_POLL: Duration = Duration::from_secs(1);

/// How the range drop compared against the odometer distance in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeVerdict {
    DropHigher,
    DropLower,
    Matched,
}

fn range_verdict(delta_range: f64, window_distance: f64) -> RangeVerdict {
    if delta_range > window_distance {
        RangeVerdict::DropHigher
    } else if window_distance > delta_range {
        RangeVerdict::DropLower
    } else {
        RangeVerdict::Matched
    }
}

/// Recorded signal series, one entry per accepted clock sample
#[derive(Debug, Default, Clone)]
pub struct SignalLog {
    /// Simulator time axis, accumulated clock deltas starting at zero
    pub time: Vec<f64>,
    pub speed: Vec<f64>,
    pub soc: Vec<f64>,
    pub hvac: Vec<String>,
    pub range_km: Vec<f64>,
    /// Cumulative odometer distance since the first sample
    pub distance: Vec<f64>,
}

/// Latest drained value per signal. Every field starts unset so "no sample
/// yet" is explicit rather than a zero default.
#[derive(Debug, Default)]
struct LatestValues {
    speed: Option<f64>,
    clock: Option<f64>,
    odometer: Option<f64>,
    soc: Option<f64>,
    range: Option<f64>,
    power_state: Option<String>,
    hvac: Option<String>,
}

/// Per-window accumulators, reset after each evaluation
#[derive(Debug, Default)]
struct Window {
    /// Distinct clock samples in this window
    seconds: Vec<f64>,
    speed_sum: f64,
    speed_samples: u32,
    /// Odometer reading at the start of the window
    start_odo: Option<f64>,
}

/// The consumer unit: the application thread of the process
pub struct RangeAudit {
    hub: Arc<SignalHub>,
    /// Clock silence after which a finished drive cycle is declared
    idle_cutoff: Duration,

    latest: LatestValues,
    window: Window,
    log: SignalLog,

    /// Previous accepted clock sample, for distinctness and the time axis
    prev_clock: Option<f64>,
    /// Accumulated simulator time for the time axis
    elapsed: f64,
    /// Odometer at the previous accepted sample
    prev_odo: Option<f64>,
    cumulative_distance: f64,

    /// Range and state of charge at the end of the previous window
    prev_range: Option<f64>,
    prev_soc: Option<f64>,
    /// Running distance totals across windows
    dist_calc_total: f64,
    dist_odo_total: f64,

    /// Wall-clock time of the last clock update, for the idle cutoff
    last_clock_at: Option<Instant>,
    last_power_state: Option<String>,
}

impl RangeAudit {
    pub fn new(hub: Arc<SignalHub>) -> Self {
        Self::with_idle_cutoff(hub, Duration::from_secs(45))
    }

    pub fn with_idle_cutoff(hub: Arc<SignalHub>, idle_cutoff: Duration) -> Self {
        Self {
            hub,
            idle_cutoff,
            latest: LatestValues::default(),
            window: Window::default(),
            log: SignalLog::default(),
            prev_clock: None,
            elapsed: 0.0,
            prev_odo: None,
            cumulative_distance: 0.0,
            prev_range: None,
            prev_soc: None,
            dist_calc_total: 0.0,
            dist_odo_total: 0.0,
            last_clock_at: None,
            last_power_state: None,
        }
    }

    /// Drain loop. Returns the recorded series once the drive cycle ends or
    /// the subscriber reports the terminal stopped condition.
    pub fn run(&mut self) -> SignalLog {
        loop {
            let woke = self.hub.wait_update(WAKE_POLL);
            let drained = self.drain();
            if woke {
                self.hub.clear_update();
            }
            if drained {
                self.collect_sample();
            }
            if self.finished() {
                log::info!(
                    "Drive cycle complete, flushing {} recorded samples",
                    self.log.time.len()
                );
                return std::mem::take(&mut self.log);
            }
        }
    }

    /// Pull the most recent value per signal out of the sink. Returns
    /// whether anything new arrived.
    fn drain(&mut self) -> bool {
        let mut drained = false;

        if let Some(v) = self.take_numeric(SignalName::Speed) {
            self.latest.speed = Some(v);
            drained = true;
        }
        if let Some(v) = self.take_numeric(SignalName::ClockSeconds) {
            self.latest.clock = Some(v);
            self.last_clock_at = Some(Instant::now());
            drained = true;
        }
        if let Some(v) = self.take_numeric(SignalName::Odometer) {
            self.latest.odometer = Some(v);
            drained = true;
        }
        if let Some(v) = self.take_numeric(SignalName::StateOfCharge) {
            self.latest.soc = Some(v);
            drained = true;
        }
        if let Some(v) = self.take_numeric(SignalName::Range) {
            self.latest.range = Some(v);
            drained = true;
        }
        if let Some(v) = self.take_text(SignalName::PowerState) {
            self.latest.power_state = Some(v);
            drained = true;
        }
        if let Some(v) = self.take_text(SignalName::HvacActive) {
            self.latest.hvac = Some(v);
            drained = true;
        }

        drained
    }

    fn take_numeric(&self, signal: SignalName) -> Option<f64> {
        self.hub.take_latest(signal).and_then(|v| v.as_numeric())
    }

    fn take_text(&self, signal: SignalName) -> Option<String> {
        self.hub
            .take_latest(signal)
            .and_then(|v| v.as_text().map(String::from))
    }

    /// Accept one sample if the vehicle clock advanced, recording the
    /// series entry and feeding the evaluation window.
    fn collect_sample(&mut self) {
        let Some(clock) = self.latest.clock else {
            return;
        };
        if self.prev_clock == Some(clock) {
            return;
        }

        if let Some(prev) = self.prev_clock {
            self.elapsed += clock - prev;
        }
        self.prev_clock = Some(clock);
        self.window.seconds.push(clock);

        let speed = self.latest.speed.unwrap_or(0.0);
        self.window.speed_sum += speed;
        self.window.speed_samples += 1;
        if self.window.start_odo.is_none() {
            self.window.start_odo = self.latest.odometer;
        }

        if let (Some(prev), Some(odo)) = (self.prev_odo, self.latest.odometer) {
            if prev > 0.0 {
                self.cumulative_distance += odo - prev;
            }
        }
        if self.latest.odometer.is_some() {
            self.prev_odo = self.latest.odometer;
        }

        self.log.time.push(self.elapsed);
        self.log.speed.push(speed);
        self.log.soc.push(self.latest.soc.unwrap_or(0.0));
        self.log.hvac.push(self.latest.hvac.clone().unwrap_or_default());
        self.log
            .range_km
            .push(round3(self.latest.range.unwrap_or(0.0) / 1000.0));
        self.log.distance.push(self.cumulative_distance);

        if let Some(state) = &self.latest.power_state {
            self.last_power_state = Some(state.clone());
        }

        if self.window.seconds.len() >= WINDOW_SAMPLES {
            self.evaluate_window();
        }
    }

    /// Window full: compare range drop against travelled distance and log
    /// the report, then reset the window accumulators.
    fn evaluate_window(&mut self) {
        let window = std::mem::take(&mut self.window);

        let first = window.seconds.first().copied().unwrap_or(0.0);
        let last = window.seconds.last().copied().unwrap_or(first);
        let hours = (last - first) / 3600.0;

        let avg_speed = if window.speed_samples > 0 {
            window.speed_sum / f64::from(window.speed_samples)
        } else {
            0.0
        };
        self.dist_calc_total += hours * avg_speed;

        let window_distance = match (window.start_odo, self.latest.odometer) {
            (Some(start), Some(end)) if start > 0.0 => end - start,
            _ => 0.0,
        };
        self.dist_odo_total += window_distance;

        let range = self.latest.range.unwrap_or(0.0);
        let range_km = round3(range / 1000.0);
        let delta_range = self.prev_range.map(|prev| prev - range).unwrap_or(0.0);
        self.prev_range = Some(range);

        let soc = self.latest.soc.unwrap_or(0.0);
        let delta_soc = self.prev_soc.map(|prev| prev - soc).unwrap_or(0.0);
        self.prev_soc = Some(soc);

        let comparison = match range_verdict(delta_range, window_distance) {
            RangeVerdict::DropHigher => "higher than",
            RangeVerdict::DropLower => "lower than",
            RangeVerdict::Matched => "matched by",
        };
        log::info!(
            "Simulator time {} s: range drop {} prediction, current range {} km",
            self.elapsed,
            comparison,
            range_km
        );
        log::info!(
            "Average speed {:.5} km/h, calculated distance {:.3} km, odometer distance {:.3} km, state of charge change {} %, current state of charge {}",
            avg_speed,
            self.dist_calc_total,
            self.dist_odo_total,
            delta_soc,
            soc
        );
    }

    /// End of the drive cycle: upstream stopped, or the clock has been
    /// silent past the cutoff while the vehicle was last seen driving.
    fn finished(&self) -> bool {
        if self.hub.is_stopped() {
            return true;
        }
        let Some(last) = self.last_clock_at else {
            return false;
        };
        last.elapsed() > self.idle_cutoff
            && self.last_power_state.as_deref() == Some(POWER_STATE_DRIVE)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Render the recorded series as CSV, one row per series (the layout the
/// original playground tooling expects).
pub fn render_csv(log: &SignalLog) -> String {
    let mut out = String::new();
    push_row(&mut out, log.time.iter().map(|v| v.to_string()));
    push_row(&mut out, log.speed.iter().map(|v| v.to_string()));
    push_row(&mut out, log.soc.iter().map(|v| v.to_string()));
    push_row(&mut out, log.hvac.iter().cloned());
    push_row(&mut out, log.range_km.iter().map(|v| v.to_string()));
    push_row(&mut out, log.distance.iter().map(|v| v.to_string()));
    out
}

fn push_row<I: Iterator<Item = String>>(out: &mut String, values: I) {
    let row: Vec<String> = values.collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

/// Write the recorded series to `path`
pub fn write_csv(log: &SignalLog, path: &Path) -> Result<()> {
    fs::write(path, render_csv(log))?;
    log::info!("Wrote {} samples to {}", log.time.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SignalUpdate;
    use crate::signals::SignalValue;

    fn dispatch_numeric(hub: &SignalHub, name: SignalName, value: f64) {
        hub.dispatch(SignalUpdate {
            name,
            value: SignalValue::Numeric(value),
        });
    }

    fn dispatch_text(hub: &SignalHub, name: SignalName, value: &str) {
        hub.dispatch(SignalUpdate {
            name,
            value: SignalValue::Text(value.to_string()),
        });
    }

    fn audit() -> (RangeAudit, Arc<SignalHub>) {
        let hub = Arc::new(SignalHub::new());
        (RangeAudit::new(Arc::clone(&hub)), hub)
    }

    /// Feed one sample's worth of updates and accept it
    fn feed_sample(audit: &mut RangeAudit, hub: &SignalHub, clock: f64, speed: f64, odo: f64) {
        dispatch_numeric(hub, SignalName::ClockSeconds, clock);
        dispatch_numeric(hub, SignalName::Speed, speed);
        dispatch_numeric(hub, SignalName::Odometer, odo);
        audit.drain();
        audit.collect_sample();
    }

    #[test]
    fn test_samples_accepted_only_on_clock_advance() {
        let (mut audit, hub) = audit();

        feed_sample(&mut audit, &hub, 1000.0, 50.0, 12.0);
        assert_eq!(audit.log.time.len(), 1);

        // Same clock value again: speed alone does not make a sample.
        dispatch_numeric(&hub, SignalName::ClockSeconds, 1000.0);
        dispatch_numeric(&hub, SignalName::Speed, 55.0);
        audit.drain();
        audit.collect_sample();
        assert_eq!(audit.log.time.len(), 1);

        feed_sample(&mut audit, &hub, 1001.0, 55.0, 12.02);
        assert_eq!(audit.log.time.len(), 2);
        assert_eq!(audit.log.time, vec![0.0, 1.0]);
    }

    #[test]
    fn test_distance_series_accumulates_odometer_deltas() {
        let (mut audit, hub) = audit();

        feed_sample(&mut audit, &hub, 1000.0, 60.0, 100.0);
        feed_sample(&mut audit, &hub, 1001.0, 60.0, 100.5);
        feed_sample(&mut audit, &hub, 1002.0, 60.0, 101.25);

        assert_eq!(audit.log.distance, vec![0.0, 0.5, 1.25]);
    }

    #[test]
    fn test_window_evaluation_after_ten_samples() {
        let (mut audit, hub) = audit();
        dispatch_numeric(&hub, SignalName::Range, 350_000.0);
        dispatch_numeric(&hub, SignalName::StateOfCharge, 80.0);
        audit.drain();

        for i in 0..10 {
            let clock = 1000.0 + i as f64;
            feed_sample(&mut audit, &hub, clock, 72.0, 10.0 + 0.02 * i as f64);
        }

        // Window evaluated and reset.
        assert!(audit.window.seconds.is_empty());
        assert_eq!(audit.prev_range, Some(350_000.0));
        assert_eq!(audit.prev_soc, Some(80.0));
        // 9 seconds at 72 km/h.
        let expected = 72.0 * 9.0 / 3600.0;
        assert!((audit.dist_calc_total - expected).abs() < 1e-9);
        assert!((audit.dist_odo_total - 0.18).abs() < 1e-9);
    }

    #[test]
    fn test_range_verdict() {
        assert_eq!(range_verdict(2.0, 1.0), RangeVerdict::DropHigher);
        assert_eq!(range_verdict(1.0, 2.0), RangeVerdict::DropLower);
        assert_eq!(range_verdict(1.5, 1.5), RangeVerdict::Matched);
    }

    #[test]
    fn test_stale_values_are_skipped() {
        let (mut audit, hub) = audit();

        // Three speed values queued between wakes: only the newest counts.
        dispatch_numeric(&hub, SignalName::Speed, 10.0);
        dispatch_numeric(&hub, SignalName::Speed, 20.0);
        dispatch_numeric(&hub, SignalName::Speed, 30.0);
        dispatch_numeric(&hub, SignalName::ClockSeconds, 1000.0);
        audit.drain();
        audit.collect_sample();

        assert_eq!(audit.log.speed, vec![30.0]);
    }

    #[test]
    fn test_run_flushes_on_stop() {
        let (mut audit, hub) = audit();
        dispatch_numeric(&hub, SignalName::ClockSeconds, 1000.0);
        dispatch_numeric(&hub, SignalName::Speed, 44.0);
        dispatch_text(&hub, SignalName::PowerState, POWER_STATE_DRIVE);
        hub.mark_stopped();

        let series = audit.run();
        assert_eq!(series.speed, vec![44.0]);
        assert_eq!(series.time, vec![0.0]);
    }

    #[test]
    fn test_render_csv_layout() {
        let log = SignalLog {
            time: vec![0.0, 1.0],
            speed: vec![50.0, 51.5],
            soc: vec![80.0, 79.9],
            hvac: vec!["true".to_string(), "true".to_string()],
            range_km: vec![350.0, 349.9],
            distance: vec![0.0, 0.014],
        };

        let csv = render_csv(&log);
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], "0,1");
        assert_eq!(rows[1], "50,51.5");
        assert_eq!(rows[3], "true,true");
        assert_eq!(rows[5], "0,0.014");
    }
}
