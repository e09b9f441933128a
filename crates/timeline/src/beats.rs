//! Musical beats: the beat map model and live detection.
//!
//! Beat positions come from three places — live bass-energy detection over
//! the host's frequency spectrum, generation from a fixed BPM, and manual
//! placement — all feeding the same ordered [`BeatMap`] the snap engine and
//! clip alignment consume.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::Seconds;

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 200.0;
pub const MIN_BEAT_INTERVAL: Seconds = 0.3;

/// Two beats closer than this are treated as the same beat.
const BEAT_PROXIMITY: Seconds = 0.1;
/// Energy envelope floor for peak picking.
const PEAK_THRESHOLD: f64 = 0.7;
/// Every 4th beat is a downbeat; every 16th starts a section.
const BEATS_PER_BAR: usize = 4;
const BEATS_PER_SECTION: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Beat {
    pub time: Seconds,
    /// Relative intensity in [0, 1].
    pub amplitude: f64,
    #[serde(default)]
    pub downbeat: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BeatSource {
    Detected,
    Manual,
    Bpm,
    Imported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeatMeta {
    pub method: BeatSource,
    pub bpm: Option<f64>,
    pub confidence: f64,
    pub time_signature: String,
    #[serde(default)]
    pub offset: Seconds,
    #[serde(default)]
    pub created_at: i64,
}

impl BeatMeta {
    fn new(method: BeatSource, bpm: Option<f64>, confidence: f64) -> Self {
        Self {
            method,
            bpm,
            confidence,
            time_signature: "4/4".to_string(),
            offset: 0.0,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeatMap {
    pub meta: BeatMeta,
    pub beats: Vec<Beat>,
}

#[derive(Debug, Clone, Copy)]
pub struct AlignOptions {
    /// Max distance a boundary may travel to reach a beat.
    pub threshold: Seconds,
    /// Try downbeats first for clip starts.
    pub prefer_downbeats: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            prefer_downbeats: true,
        }
    }
}

impl BeatMap {
    /// Evenly spaced beats from a fixed tempo. Out-of-range tempi fall back
    /// to the default, like the manual-BPM path they replace.
    pub fn from_bpm(bpm: f64, duration: Seconds, offset: Seconds) -> Self {
        let bpm = if (MIN_BPM..=MAX_BPM).contains(&bpm) {
            bpm
        } else {
            DEFAULT_BPM
        };
        let interval = 60.0 / bpm;
        let mut beats = Vec::new();
        let mut time = offset.max(0.0);
        let mut index = 0usize;
        while time < duration {
            let (amplitude, downbeat) = if index % BEATS_PER_SECTION == 0 {
                (1.0, true)
            } else if index % BEATS_PER_BAR == 0 {
                (0.9, true)
            } else {
                (0.7, false)
            };
            beats.push(Beat {
                time,
                amplitude,
                downbeat,
            });
            index += 1;
            time = offset + index as f64 * interval;
        }
        let mut meta = BeatMeta::new(BeatSource::Bpm, Some(bpm), 1.0);
        meta.offset = offset;
        Self { meta, beats }
    }

    /// Pick beats out of a normalized energy envelope: local maxima above
    /// the threshold, spaced no tighter than the fastest allowed tempo.
    pub fn detect_from_peaks(peaks: &[f64], duration: Seconds) -> Self {
        if peaks.len() < 3 || duration <= 0.0 {
            return Self {
                meta: BeatMeta::new(BeatSource::Detected, None, 0.0),
                beats: Vec::new(),
            };
        }
        let sample_rate = peaks.len() as f64 / duration;
        let min_gap = 60.0 / MAX_BPM;

        let mut beats: Vec<Beat> = Vec::new();
        for i in 1..peaks.len() - 1 {
            let value = peaks[i];
            if value > PEAK_THRESHOLD && value > peaks[i - 1] && value > peaks[i + 1] {
                let time = i as f64 / sample_rate;
                if beats
                    .last()
                    .map(|b| time - b.time >= min_gap)
                    .unwrap_or(true)
                {
                    beats.push(Beat {
                        time,
                        // Lift weak peaks so they stay visible on the ruler
                        amplitude: (0.3 + value * 0.7).min(1.0),
                        downbeat: false,
                    });
                }
            }
        }
        classify_downbeats(&mut beats);
        let bpm = estimate_bpm(&beats);
        Self {
            meta: BeatMeta::new(BeatSource::Detected, bpm, 0.8),
            beats,
        }
    }

    /// Sorted ingest of an externally produced beat list.
    pub fn import(mut beats: Vec<Beat>, bpm: Option<f64>) -> Self {
        beats.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
        Self {
            meta: BeatMeta::new(BeatSource::Imported, bpm, 1.0),
            beats,
        }
    }

    /// Place a beat by hand. Refused when another beat sits within the
    /// proximity guard; the map's BPM is re-estimated afterwards.
    pub fn add_beat(&mut self, time: Seconds, amplitude: f64) -> bool {
        if self
            .beats
            .iter()
            .any(|b| (b.time - time).abs() < BEAT_PROXIMITY)
        {
            return false;
        }
        let index = self
            .beats
            .iter()
            .position(|b| b.time > time)
            .unwrap_or(self.beats.len());
        self.beats.insert(
            index,
            Beat {
                time,
                amplitude: amplitude.clamp(0.0, 1.0),
                downbeat: false,
            },
        );
        self.meta.method = BeatSource::Manual;
        self.meta.bpm = estimate_bpm(&self.beats).or(self.meta.bpm);
        true
    }

    /// Remove the beat nearest `time`, if one is within the proximity guard.
    pub fn remove_beat(&mut self, time: Seconds) -> bool {
        let Some((index, _)) = self
            .beats
            .iter()
            .enumerate()
            .map(|(i, b)| (i, (b.time - time).abs()))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .filter(|(_, distance)| *distance < BEAT_PROXIMITY)
        else {
            return false;
        };
        self.beats.remove(index);
        self.meta.method = BeatSource::Manual;
        self.meta.bpm = estimate_bpm(&self.beats).or(self.meta.bpm);
        true
    }

    pub fn nearest_beat(
        &self,
        time: Seconds,
        max_distance: Seconds,
        downbeats_only: bool,
    ) -> Option<&Beat> {
        self.beats
            .iter()
            .filter(|b| !downbeats_only || b.downbeat)
            .map(|b| (b, (b.time - time).abs()))
            .filter(|(_, distance)| *distance <= max_distance)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(beat, _)| beat)
    }

    pub fn beats_in_range(&self, start: Seconds, end: Seconds) -> Vec<&Beat> {
        self.beats
            .iter()
            .filter(|b| b.time >= start && b.time <= end)
            .collect()
    }

    pub fn positions(&self) -> Vec<Seconds> {
        self.beats.iter().map(|b| b.time).collect()
    }

    /// Pull a clip's boundaries onto nearby beats. Starts prefer downbeats
    /// when asked; either edge stays put if no beat is in reach.
    pub fn align_clip_bounds(
        &self,
        start: Seconds,
        end: Seconds,
        options: AlignOptions,
    ) -> (Seconds, Seconds) {
        let aligned_start = if options.prefer_downbeats {
            self.nearest_beat(start, options.threshold, true)
                .or_else(|| self.nearest_beat(start, options.threshold, false))
        } else {
            self.nearest_beat(start, options.threshold, false)
        }
        .map(|b| b.time)
        .unwrap_or(start);
        let aligned_end = self
            .nearest_beat(end, options.threshold, false)
            .map(|b| b.time)
            .unwrap_or(end);
        (aligned_start, aligned_end)
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }
}

/// Mark every 4th beat as a downbeat and lift its amplitude, the way the
/// offline classifier groups 4/4 bars.
fn classify_downbeats(beats: &mut [Beat]) {
    for (i, beat) in beats.iter_mut().enumerate() {
        if i % BEATS_PER_BAR == 0 {
            beat.downbeat = true;
            beat.amplitude = (beat.amplitude * 1.2).min(1.0);
        }
    }
}

/// Median inter-beat interval, clamped to the supported tempo range.
fn estimate_bpm(beats: &[Beat]) -> Option<f64> {
    if beats.len() < 2 {
        return None;
    }
    let mut intervals: Vec<f64> = beats.windows(2).map(|w| w[1].time - w[0].time).collect();
    intervals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let median = intervals[intervals.len() / 2];
    if median <= f64::EPSILON {
        return None;
    }
    Some((60.0 / median).clamp(MIN_BPM, MAX_BPM))
}

/// One analysis frame from the host audio primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    pub current_time: Seconds,
    pub duration: Seconds,
    pub magnitudes: Vec<f32>,
}

#[derive(Debug, Error)]
#[error("audio source unavailable: {0}")]
pub struct SpectrumError(pub String);

/// The host's audio-analysis primitive: a playback clock plus a
/// frequency-magnitude snapshot per tick.
pub trait SpectrumSource {
    fn sample(&mut self) -> Result<SpectrumFrame, SpectrumError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Bin range of the bass band read from the spectrum.
    pub band: (usize, usize),
    /// Full-scale raw magnitude (255 for byte spectra).
    pub magnitude_ceiling: f64,
    /// Energy floor below which no beat fires.
    pub min_amplitude: f64,
    /// Multiplier on the floor; the effective trigger level.
    pub sensitivity: f64,
    /// Refractory period between beats.
    pub min_interval: Seconds,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            band: (0, 32),
            magnitude_ceiling: 255.0,
            min_amplitude: 0.3,
            sensitivity: 1.2,
            min_interval: MIN_BEAT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Analyzing,
}

/// Summary returned by [`BeatDetector::export`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeatExport {
    pub beats: Vec<Beat>,
    pub count: usize,
    pub average_amplitude: f64,
    pub mean_interval: Option<Seconds>,
    pub bpm: Option<f64>,
}

type BeatListener = Box<dyn FnMut(&Beat)>;

/// Live bass-energy beat detection, ticked by the host playback clock.
pub struct BeatDetector {
    config: DetectorConfig,
    state: DetectorState,
    beats: Vec<Beat>,
    last_beat_time: Seconds,
    last_tick_time: Seconds,
    source: Option<Box<dyn SpectrumSource>>,
    listener: Option<BeatListener>,
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl fmt::Debug for BeatDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeatDetector")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("beats", &self.beats.len())
            .field("last_beat_time", &self.last_beat_time)
            .finish()
    }
}

impl BeatDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Idle,
            beats: Vec::new(),
            last_beat_time: f64::NEG_INFINITY,
            last_tick_time: f64::NEG_INFINITY,
            source: None,
            listener: None,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_analyzing(&self) -> bool {
        self.state == DetectorState::Analyzing
    }

    pub fn set_on_beat(&mut self, listener: impl FnMut(&Beat) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Begin analysis over a fresh beat list. Restarting while analyzing
    /// resets state and swaps the source.
    pub fn start(&mut self, source: Box<dyn SpectrumSource>) {
        self.beats.clear();
        self.last_beat_time = f64::NEG_INFINITY;
        self.last_tick_time = f64::NEG_INFINITY;
        self.source = Some(source);
        self.state = DetectorState::Analyzing;
    }

    /// Halt analysis and release the source. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.state = DetectorState::Idle;
        self.source = None;
    }

    /// One iteration of the sampling loop. The host calls this once per
    /// animation frame; a tick while idle is a no-op. A failing source
    /// stops the loop rather than propagating.
    pub fn tick(&mut self) -> Option<Beat> {
        if self.state != DetectorState::Analyzing {
            return None;
        }
        let frame = match self.source.as_mut()?.sample() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("beat detection stopped: {err}");
                self.stop();
                return None;
            }
        };
        // Ignore clock glitches that run backwards
        if frame.current_time < self.last_tick_time {
            return None;
        }
        self.last_tick_time = frame.current_time;

        let energy = self.bass_energy(&frame.magnitudes);
        let trigger = self.config.min_amplitude * self.config.sensitivity;
        if energy > self.config.min_amplitude
            && energy > trigger
            && frame.current_time - self.last_beat_time > self.config.min_interval
        {
            let beat = Beat {
                time: frame.current_time,
                amplitude: energy,
                downbeat: false,
            };
            self.last_beat_time = beat.time;
            self.beats.push(beat);
            if let Some(listener) = self.listener.as_mut() {
                listener(&beat);
            }
            return Some(beat);
        }
        None
    }

    /// Average magnitude over the bass band, normalized to [0, 1].
    fn bass_energy(&self, magnitudes: &[f32]) -> f64 {
        let (lo, hi) = self.config.band;
        let hi = hi.min(magnitudes.len());
        if lo >= hi || self.config.magnitude_ceiling <= 0.0 {
            return 0.0;
        }
        let sum: f64 = magnitudes[lo..hi].iter().map(|m| *m as f64).sum();
        let average = sum / (hi - lo) as f64;
        (average / self.config.magnitude_ceiling).clamp(0.0, 1.0)
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn export(&self) -> BeatExport {
        let count = self.beats.len();
        let average_amplitude = if count == 0 {
            0.0
        } else {
            self.beats.iter().map(|b| b.amplitude).sum::<f64>() / count as f64
        };
        let mean_interval = if count < 2 {
            None
        } else {
            let span = self.beats[count - 1].time - self.beats[0].time;
            Some(span / (count - 1) as f64)
        };
        BeatExport {
            beats: self.beats.clone(),
            count,
            average_amplitude,
            mean_interval,
            bpm: estimate_bpm(&self.beats),
        }
    }

    pub fn to_beat_map(&self) -> BeatMap {
        BeatMap {
            meta: BeatMeta::new(BeatSource::Detected, estimate_bpm(&self.beats), 0.8),
            beats: self.beats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic source: bass pulses above the trigger at a fixed period,
    /// advancing a 60 Hz clock by one frame per tick.
    struct PulseSource {
        frame: u64,
        pulse_period: Seconds,
        total: Seconds,
    }

    const TICK_RATE: f64 = 60.0;

    impl PulseSource {
        fn new(pulse_period: Seconds, total: Seconds) -> Self {
            Self {
                frame: 0,
                pulse_period,
                total,
            }
        }
    }

    impl SpectrumSource for PulseSource {
        fn sample(&mut self) -> Result<SpectrumFrame, SpectrumError> {
            let time = self.frame as f64 / TICK_RATE;
            if time >= self.total {
                return Err(SpectrumError("playback finished".into()));
            }
            let phase = time % self.pulse_period;
            let loud = phase < 0.5 / TICK_RATE;
            let level = if loud { 230.0 } else { 20.0 };
            self.frame += 1;
            Ok(SpectrumFrame {
                current_time: time,
                duration: self.total,
                magnitudes: vec![level; 64],
            })
        }
    }

    #[test]
    fn test_detects_pulse_train() {
        let mut detector = BeatDetector::default();
        detector.start(Box::new(PulseSource::new(0.5, 10.0)));
        while detector.is_analyzing() {
            detector.tick();
        }
        let export = detector.export();
        assert!(
            (18..=21).contains(&export.count),
            "expected ~20 beats, got {}",
            export.count
        );
        for pair in export.beats.windows(2) {
            assert!(pair[1].time - pair[0].time >= MIN_BEAT_INTERVAL);
        }
        let mean = export.mean_interval.unwrap();
        assert!((mean - 0.5).abs() < 0.05, "mean interval {mean}");
    }

    #[test]
    fn test_min_interval_suppresses_rapid_pulses() {
        let config = DetectorConfig {
            min_interval: 0.3,
            ..DetectorConfig::default()
        };
        let mut detector = BeatDetector::new(config);
        // Pulses every 0.1s, much faster than the refractory period
        detector.start(Box::new(PulseSource::new(0.1, 5.0)));
        while detector.is_analyzing() {
            detector.tick();
        }
        for pair in detector.beats().windows(2) {
            assert!(pair[1].time - pair[0].time >= 0.3);
        }
        assert!(!detector.beats().is_empty());
    }

    #[test]
    fn test_source_failure_stops_without_panic() {
        struct Broken;
        impl SpectrumSource for Broken {
            fn sample(&mut self) -> Result<SpectrumFrame, SpectrumError> {
                Err(SpectrumError("device lost".into()))
            }
        }
        let mut detector = BeatDetector::default();
        detector.start(Box::new(Broken));
        assert!(detector.tick().is_none());
        assert!(!detector.is_analyzing());
        // stop is idempotent
        detector.stop();
        detector.stop();
    }

    #[test]
    fn test_tick_while_idle_is_noop() {
        let mut detector = BeatDetector::default();
        assert!(detector.tick().is_none());
        assert_eq!(detector.state(), DetectorState::Idle);
    }

    #[test]
    fn test_beat_listener_fires() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let hits: Rc<RefCell<usize>> = Rc::default();
        let sink = hits.clone();
        let mut detector = BeatDetector::default();
        detector.set_on_beat(move |_| *sink.borrow_mut() += 1);
        detector.start(Box::new(PulseSource::new(0.5, 2.0)));
        while detector.is_analyzing() {
            detector.tick();
        }
        assert_eq!(*hits.borrow(), detector.beats().len());
    }

    #[test]
    fn test_from_bpm_spacing_and_downbeats() {
        let map = BeatMap::from_bpm(120.0, 10.0, 0.0);
        assert_eq!(map.len(), 20);
        for pair in map.beats.windows(2) {
            assert!((pair[1].time - pair[0].time - 0.5).abs() < 1e-9);
        }
        assert!(map.beats[0].downbeat);
        assert!(!map.beats[1].downbeat);
        assert!(map.beats[4].downbeat);
        assert_eq!(map.beats[0].amplitude, 1.0);
        assert_eq!(map.meta.bpm, Some(120.0));
    }

    #[test]
    fn test_from_bpm_rejects_wild_tempo() {
        let map = BeatMap::from_bpm(500.0, 4.0, 0.0);
        assert_eq!(map.meta.bpm, Some(DEFAULT_BPM));
    }

    #[test]
    fn test_detect_from_peaks_finds_spikes() {
        // 10s envelope sampled at 10Hz with spikes every second
        let mut peaks = vec![0.1; 100];
        for i in (5..100).step_by(10) {
            peaks[i] = 0.9;
        }
        let map = BeatMap::detect_from_peaks(&peaks, 10.0);
        assert_eq!(map.len(), 10);
        assert!(map.beats[0].downbeat);
        let bpm = map.meta.bpm.unwrap();
        assert!((bpm - 60.0).abs() < 5.0, "bpm {bpm}");
    }

    #[test]
    fn test_manual_add_respects_proximity_guard() {
        let mut map = BeatMap::from_bpm(120.0, 4.0, 0.0);
        assert!(!map.add_beat(0.55, 1.0)); // 0.5 already there
        assert!(map.add_beat(0.75, 1.0));
        assert_eq!(map.meta.method, BeatSource::Manual);
        let times = map.positions();
        let mut sorted = times.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(times, sorted);
    }

    #[test]
    fn test_manual_remove_nearest() {
        let mut map = BeatMap::from_bpm(120.0, 4.0, 0.0);
        let before = map.len();
        assert!(map.remove_beat(0.52));
        assert_eq!(map.len(), before - 1);
        assert!(!map.remove_beat(0.52));
    }

    #[test]
    fn test_nearest_beat_filters_downbeats() {
        let map = BeatMap::from_bpm(120.0, 8.0, 0.0);
        // beat 3 at 1.5s is not a downbeat; nearest downbeat is 2.0s
        let any = map.nearest_beat(1.6, 0.5, false).unwrap();
        assert!((any.time - 1.5).abs() < 1e-9);
        let down = map.nearest_beat(1.6, 0.5, true).unwrap();
        assert!((down.time - 2.0).abs() < 1e-9);
        assert!(map.nearest_beat(100.0, 0.5, false).is_none());
    }

    #[test]
    fn test_align_clip_bounds_prefers_downbeats() {
        let map = BeatMap::from_bpm(120.0, 8.0, 0.0);
        let (start, end) = map.align_clip_bounds(1.9, 3.45, AlignOptions::default());
        assert!((start - 2.0).abs() < 1e-9);
        assert!((end - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_import_sorts_positions() {
        let beats = vec![
            Beat { time: 2.0, amplitude: 0.5, downbeat: false },
            Beat { time: 0.5, amplitude: 0.8, downbeat: true },
            Beat { time: 1.0, amplitude: 0.6, downbeat: false },
        ];
        let map = BeatMap::import(beats, Some(120.0));
        assert_eq!(map.positions(), vec![0.5, 1.0, 2.0]);
        assert_eq!(map.meta.method, BeatSource::Imported);
    }
}
