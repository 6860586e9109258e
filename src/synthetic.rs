//! Synthetic session generator
//!
//! Produces a realistic motor-session table for demos and tests. Each
//! participant has a latent ability drawn from N(0, 1); each session perturbs it
//! slightly and derives three rounds of pointer metrics whose difficulty rises
//! with target speed and spawn rate. Device, performance and demographic
//! context columns are drawn independently of ability.
//!
//! Output is fully determined by [`SyntheticConfig::seed`].

use crate::error::MotorError;
use crate::schema::{Column, SessionTable, PARTICIPANT_ID_COLUMN, SESSION_ID_COLUMN};
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Per-round metric names, in column order
pub const ROUND_METRICS: [&str; 33] = [
    "nTargets",
    "nHits",
    "nMisses",
    "hitRate",
    "reactionTime_mean",
    "reactionTime_std",
    "reactionTime_median",
    "movementTime_mean",
    "movementTime_std",
    "movementTime_median",
    "interTap_mean",
    "interTap_std",
    "interTap_cv",
    "errorDist_mean",
    "errorDist_std",
    "pathLength_mean",
    "pathLength_std",
    "straightness_mean",
    "straightness_std",
    "meanSpeed_mean",
    "peakSpeed_mean",
    "speedVar_mean",
    "meanAccel_mean",
    "peakAccel_mean",
    "jerkRMS_mean",
    "jerkRMS_std",
    "submovementCount_mean",
    "submovementCount_std",
    "overshootCount_mean",
    "overshootCount_std",
    "ID_mean",
    "throughput_mean",
    "throughput_std",
];

/// Metrics with cross-round deltas
pub const DELTA_METRICS: [&str; 5] = [
    "hitRate",
    "reactionTime_mean",
    "movementTime_mean",
    "jerkRMS_mean",
    "throughput_mean",
];

/// Round pairs (later, earlier) of each delta
const DELTA_PAIRS: [(usize, usize); 3] = [(2, 1), (3, 1), (3, 2)];

const ROUNDS: [usize; 3] = [1, 2, 3];

/// Target speed per round (px/frame)
const SPEED_PX: [f64; 3] = [2.5, 3.5, 4.8];

/// Target spawn interval per round (ms)
const SPAWN_MS: [f64; 3] = [900.0, 750.0, 600.0];

const CONTEXT_COLUMNS: [&str; 25] = [
    "game_gameVersion",
    "r1_speedPxPerFrame",
    "r2_speedPxPerFrame",
    "r3_speedPxPerFrame",
    "r1_spawnIntervalMs",
    "r2_spawnIntervalMs",
    "r3_spawnIntervalMs",
    "device_pointerPrimary",
    "device_os",
    "device_browser",
    "screen_width",
    "screen_height",
    "screen_dpr",
    "viewportWidth",
    "viewportHeight",
    "perf_samplingHzTarget",
    "perf_samplingHzEstimated",
    "perf_avgFrameMs",
    "perf_p95FrameMs",
    "perf_droppedFrames",
    "perf_inputLagMsEstimate",
    "highContrastMode",
    "reducedMotionPreference",
    "userInfo_ageBucket",
    "userInfo_gender",
];

const AGE_BUCKETS: [&str; 7] = ["18-24", "25-34", "35-44", "45-54", "55-64", "65+", "unknown"];
const AGE_WEIGHTS: [f64; 7] = [0.18, 0.22, 0.18, 0.15, 0.12, 0.10, 0.05];
const GENDERS: [&str; 4] = ["Male", "Female", "Other", "Prefer not to say"];
const GENDER_WEIGHTS: [f64; 4] = [0.48, 0.48, 0.02, 0.02];
const POINTERS: [&str; 4] = ["mouse", "touch", "pen", "unknown"];
const POINTER_WEIGHTS: [f64; 4] = [0.7, 0.2, 0.05, 0.05];
const OSES: [&str; 5] = ["Windows", "macOS", "Linux", "Android", "iOS"];
const OS_WEIGHTS: [f64; 5] = [0.55, 0.18, 0.07, 0.12, 0.08];
const BROWSERS: [&str; 4] = ["Chrome", "Edge", "Firefox", "Safari"];
const BROWSER_WEIGHTS: [f64; 4] = [0.55, 0.18, 0.15, 0.12];

const SCREEN_WIDTHS: [f64; 5] = [1366.0, 1440.0, 1536.0, 1920.0, 2560.0];
const SCREEN_HEIGHTS: [f64; 5] = [768.0, 900.0, 864.0, 1080.0, 1440.0];
const DPRS: [f64; 4] = [1.0, 1.25, 1.5, 2.0];

/// Generator settings
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub participants: usize,
    pub min_sessions: usize,
    pub max_sessions: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            participants: 80,
            min_sessions: 2,
            max_sessions: 5,
            seed: 42,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<(), MotorError> {
        if self.participants == 0 {
            return Err(MotorError::Config("participants must be at least 1".to_string()));
        }
        if self.min_sessions == 0 || self.min_sessions > self.max_sessions {
            return Err(MotorError::Config(format!(
                "session range {}..={} is invalid",
                self.min_sessions, self.max_sessions
            )));
        }
        Ok(())
    }
}

/// Every column name in output order
pub fn column_names() -> Vec<String> {
    let mut names = vec![SESSION_ID_COLUMN.to_string(), PARTICIPANT_ID_COLUMN.to_string()];
    names.extend(CONTEXT_COLUMNS.iter().map(|c| c.to_string()));
    for round in ROUNDS {
        names.extend(ROUND_METRICS.iter().map(|m| format!("r{round}_{m}")));
    }
    names.extend(delta_names());
    names
}

fn delta_names() -> Vec<String> {
    DELTA_METRICS
        .iter()
        .flat_map(|metric| {
            DELTA_PAIRS
                .iter()
                .map(move |(later, earlier)| format!("delta_r{later}_minus_r{earlier}_{metric}"))
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Cell {
    Number(f64),
    Text(String),
}

/// Random draws used by the generator
struct Sampler {
    rng: StdRng,
}

impl Sampler {
    fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        match Normal::new(mean, sd) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => mean,
        }
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..high)
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.rng.gen_range(0..items.len())]
    }

    fn weighted<T: Copy>(&mut self, items: &[T], weights: &[f64]) -> Result<T, MotorError> {
        let dist = WeightedIndex::new(weights)
            .map_err(|e| MotorError::Config(format!("invalid category weights: {e}")))?;
        Ok(items[dist.sample(&mut self.rng)])
    }
}

/// Generate a session table
pub fn generate_sessions(config: &SyntheticConfig) -> Result<SessionTable, MotorError> {
    config.validate()?;
    let mut sampler = Sampler {
        rng: StdRng::seed_from_u64(config.seed),
    };

    let participant_ids: Vec<String> = (1..=config.participants)
        .map(|i| format!("P_{i:03}"))
        .collect();
    let abilities: Vec<f64> = participant_ids
        .iter()
        .map(|_| sampler.normal(0.0, 1.0))
        .collect();

    let mut rows: Vec<HashMap<String, Cell>> = Vec::new();
    let mut session_counter = 1;

    for (participant, base_z) in participant_ids.iter().zip(&abilities) {
        let n_sessions = sampler
            .rng
            .gen_range(config.min_sessions..=config.max_sessions);
        for _ in 0..n_sessions {
            let z = base_z + sampler.normal(0.0, 0.25);
            let session_id = format!("S_{session_counter:05}");
            session_counter += 1;

            let mut row = session_row(&mut sampler, z)?;
            row.insert(SESSION_ID_COLUMN.to_string(), Cell::Text(session_id));
            row.insert(PARTICIPANT_ID_COLUMN.to_string(), Cell::Text(participant.clone()));
            rows.push(row);
        }
    }

    let columns = column_names()
        .into_iter()
        .map(|name| {
            let text = matches!(rows.first().and_then(|r| r.get(&name)), Some(Cell::Text(_)));
            if text {
                let values = rows
                    .iter()
                    .map(|r| match r.get(&name) {
                        Some(Cell::Text(s)) => Some(s.clone()),
                        Some(Cell::Number(v)) => Some(v.to_string()),
                        None => None,
                    })
                    .collect();
                Column::text(name, values)
            } else {
                let values = rows
                    .iter()
                    .map(|r| match r.get(&name) {
                        Some(Cell::Number(v)) => Some(*v),
                        _ => None,
                    })
                    .collect();
                Column::numeric(name, values)
            }
        })
        .collect();

    let table = SessionTable::from_columns(columns)?;
    info!(
        participants = config.participants,
        sessions = table.n_rows(),
        seed = config.seed,
        "generated synthetic sessions"
    );
    Ok(table)
}

/// Generate a session table and write it as CSV, creating parent directories
pub fn write_sessions(path: &Path, config: &SyntheticConfig) -> Result<SessionTable, MotorError> {
    let table = generate_sessions(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    table.write_csv(std::fs::File::create(path)?)?;
    Ok(table)
}

fn session_row(s: &mut Sampler, z: f64) -> Result<HashMap<String, Cell>, MotorError> {
    let mut row = HashMap::new();
    let num = |row: &mut HashMap<String, Cell>, name: &str, value: f64| {
        row.insert(name.to_string(), Cell::Number(value));
    };

    let screen_w = s.pick(&SCREEN_WIDTHS);
    let screen_h = s.pick(&SCREEN_HEIGHTS);
    let dpr = s.pick(&DPRS);
    let viewport_w = (screen_w * s.uniform(0.6, 0.95)).trunc();
    let viewport_h = (screen_h * s.uniform(0.6, 0.95)).trunc();

    let sampling_est = s.normal(55.0, 5.0).clamp(20.0, 60.0);
    let dropped_frames = s.normal(20.0, 15.0).max(0.0).trunc();
    let avg_frame = s.normal(16.7 + dropped_frames * 0.02, 2.0);
    let p95_frame = avg_frame + s.normal(6.0, 3.0).abs();
    let input_lag = s.normal(18.0 + dropped_frames * 0.1, 6.0).max(5.0);

    let high_contrast = s.weighted(&[0.0, 1.0], &[0.85, 0.15])?;
    let reduced_motion = s.weighted(&[0.0, 1.0], &[0.75, 0.25])?;

    let age_bucket = s.weighted(&AGE_BUCKETS, &AGE_WEIGHTS)?;
    let gender = s.weighted(&GENDERS, &GENDER_WEIGHTS)?;
    let pointer = s.weighted(&POINTERS, &POINTER_WEIGHTS)?;
    let os = s.weighted(&OSES, &OS_WEIGHTS)?;
    let browser = s.weighted(&BROWSERS, &BROWSER_WEIGHTS)?;

    row.insert("game_gameVersion".to_string(), Cell::Text("1.0.0".to_string()));
    for (i, round) in ROUNDS.iter().enumerate() {
        num(&mut row, &format!("r{round}_speedPxPerFrame"), SPEED_PX[i]);
        num(&mut row, &format!("r{round}_spawnIntervalMs"), SPAWN_MS[i]);
    }
    for (name, value) in [
        ("device_pointerPrimary", pointer),
        ("device_os", os),
        ("device_browser", browser),
        ("userInfo_ageBucket", age_bucket),
        ("userInfo_gender", gender),
    ] {
        row.insert(name.to_string(), Cell::Text(value.to_string()));
    }
    for (name, value) in [
        ("screen_width", screen_w),
        ("screen_height", screen_h),
        ("screen_dpr", dpr),
        ("viewportWidth", viewport_w),
        ("viewportHeight", viewport_h),
        ("perf_samplingHzTarget", 60.0),
        ("perf_samplingHzEstimated", sampling_est),
        ("perf_avgFrameMs", avg_frame),
        ("perf_p95FrameMs", p95_frame),
        ("perf_droppedFrames", dropped_frames),
        ("perf_inputLagMsEstimate", input_lag),
        ("highContrastMode", high_contrast),
        ("reducedMotionPreference", reduced_motion),
    ] {
        num(&mut row, name, value);
    }

    let mut per_round: Vec<HashMap<&'static str, f64>> = Vec::with_capacity(ROUNDS.len());
    for i in 0..ROUNDS.len() {
        let metrics = round_metrics(s, z, i, dropped_frames);
        for (metric, value) in &metrics {
            num(&mut row, &format!("r{}_{}", ROUNDS[i], metric), *value);
        }
        per_round.push(metrics);
    }

    for metric in DELTA_METRICS {
        for (later, earlier) in DELTA_PAIRS {
            let value = per_round[later - 1].get(metric).copied().unwrap_or(0.0)
                - per_round[earlier - 1].get(metric).copied().unwrap_or(0.0);
            num(
                &mut row,
                &format!("delta_r{later}_minus_r{earlier}_{metric}"),
                value,
            );
        }
    }

    Ok(row)
}

/// Metrics of one round; `round` indexes the condition tables
fn round_metrics(
    s: &mut Sampler,
    z: f64,
    round: usize,
    dropped_frames: f64,
) -> HashMap<&'static str, f64> {
    // Difficulty grows with target speed and spawn rate
    let difficulty = SPEED_PX[round] / SPEED_PX[0] + (SPAWN_MS[0] / SPAWN_MS[round] - 1.0);
    let d = difficulty - 1.0;

    let n_targets = s.rng.gen_range(22..32) as f64;

    let base_hit = 0.86 + 0.08 * (z / 1.2).tanh() - 0.07 * d - 0.01 * (dropped_frames / 50.0);
    let hit_rate = (base_hit + s.normal(0.0, 0.03)).clamp(0.35, 0.98);
    let n_hits = (hit_rate * n_targets).round();

    let rt_mean = (420.0 - 60.0 * z + 40.0 * d + s.normal(0.0, 25.0)).clamp(180.0, 900.0);
    let rt_std = (90.0 - 10.0 * z + 10.0 * d + s.normal(0.0, 8.0)).clamp(30.0, 220.0);
    let rt_median = (rt_mean - s.normal(0.0, 15.0)).clamp(160.0, 900.0);

    let mt_mean = (360.0 - 45.0 * z + 35.0 * d + s.normal(0.0, 20.0)).clamp(160.0, 900.0);
    let mt_std = (85.0 - 8.0 * z + 10.0 * d + s.normal(0.0, 8.0)).clamp(25.0, 220.0);
    let mt_median = (mt_mean - s.normal(0.0, 12.0)).clamp(150.0, 900.0);

    let it_mean = (520.0 - 50.0 * z + 40.0 * d + s.normal(0.0, 35.0)).clamp(200.0, 1500.0);
    let it_std = (160.0 - 15.0 * z + 20.0 * d + s.normal(0.0, 15.0)).clamp(50.0, 450.0);
    let it_cv = (it_std / it_mean.max(1e-6)).clamp(0.05, 0.9);

    let err_mean = (0.18 - 0.03 * z + 0.03 * d + s.normal(0.0, 0.02)).clamp(0.03, 0.6);
    let err_std = (0.12 - 0.02 * z + s.normal(0.0, 0.02)).clamp(0.02, 0.4);

    let path_mean = (0.42 - 0.04 * z + 0.03 * d + s.normal(0.0, 0.03)).clamp(0.15, 1.2);
    let path_std = (0.18 - 0.02 * z + s.normal(0.0, 0.02)).clamp(0.05, 0.6);
    let straight_mean = (0.88 + 0.03 * z - 0.04 * d + s.normal(0.0, 0.02)).clamp(0.35, 0.99);
    let straight_std = (0.08 - 0.01 * z + s.normal(0.0, 0.01)).clamp(0.01, 0.25);

    let mean_speed = (0.70 + 0.08 * z - 0.05 * d + s.normal(0.0, 0.05)).clamp(0.2, 2.0);
    let peak_speed = (mean_speed + s.normal(0.25, 0.12).abs()).clamp(0.3, 3.0);
    let speed_var = (0.12 - 0.02 * z + 0.02 * d + s.normal(0.0, 0.02)).clamp(0.02, 0.5);

    let mean_accel = (0.95 + 0.10 * z - 0.05 * d + s.normal(0.0, 0.07)).clamp(0.2, 3.0);
    let peak_accel = (mean_accel + s.normal(0.35, 0.15).abs()).clamp(0.3, 4.0);

    let jerk_mean = (0.010 - 0.002 * z + 0.002 * d + s.normal(0.0, 0.0015)).clamp(0.002, 0.05);
    let jerk_std = (0.006 - 0.001 * z + s.normal(0.0, 0.001)).clamp(0.001, 0.03);

    let sub_mean = (2.6 - 0.7 * z + 0.4 * d + s.normal(0.0, 0.4)).clamp(0.0, 12.0);
    let sub_std = (1.2 - 0.2 * z + s.normal(0.0, 0.2)).clamp(0.1, 6.0);
    let over_mean = (1.8 - 0.5 * z + 0.3 * d + s.normal(0.0, 0.3)).clamp(0.0, 10.0);
    let over_std = (1.0 - 0.15 * z + s.normal(0.0, 0.2)).clamp(0.1, 5.0);

    let id_mean = (3.2 + 0.2 * d + s.normal(0.0, 0.15)).clamp(1.5, 6.0);
    let tp_mean = (4.2 + 0.8 * z.tanh() - 0.6 * d + s.normal(0.0, 0.35)).clamp(0.5, 10.0);
    let tp_std = (1.1 - 0.15 * z + s.normal(0.0, 0.15)).clamp(0.2, 3.0);

    HashMap::from([
        ("nTargets", n_targets),
        ("nHits", n_hits),
        ("nMisses", n_targets - n_hits),
        ("hitRate", hit_rate),
        ("reactionTime_mean", rt_mean),
        ("reactionTime_std", rt_std),
        ("reactionTime_median", rt_median),
        ("movementTime_mean", mt_mean),
        ("movementTime_std", mt_std),
        ("movementTime_median", mt_median),
        ("interTap_mean", it_mean),
        ("interTap_std", it_std),
        ("interTap_cv", it_cv),
        ("errorDist_mean", err_mean),
        ("errorDist_std", err_std),
        ("pathLength_mean", path_mean),
        ("pathLength_std", path_std),
        ("straightness_mean", straight_mean),
        ("straightness_std", straight_std),
        ("meanSpeed_mean", mean_speed),
        ("peakSpeed_mean", peak_speed),
        ("speedVar_mean", speed_var),
        ("meanAccel_mean", mean_accel),
        ("peakAccel_mean", peak_accel),
        ("jerkRMS_mean", jerk_mean),
        ("jerkRMS_std", jerk_std),
        ("submovementCount_mean", sub_mean),
        ("submovementCount_std", sub_std),
        ("overshootCount_mean", over_mean),
        ("overshootCount_std", over_std),
        ("ID_mean", id_mean),
        ("throughput_mean", tp_mean),
        ("throughput_std", tp_std),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnKind, FeatureSchema, EXCLUDED_CONDITION_COLUMNS};
    use crate::stats::pearson;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            participants: 10,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn test_layout() {
        let names = column_names();
        assert_eq!(names.len(), 2 + 25 + 3 * 33 + 15);
        assert_eq!(names[0], "sessionId");
        assert!(names.contains(&"delta_r3_minus_r2_throughput_mean".to_string()));
    }

    #[test]
    fn test_session_counts() {
        let table = generate_sessions(&small()).unwrap();
        assert!(table.n_rows() >= 20 && table.n_rows() <= 50);
        assert_eq!(table.text("sessionId").unwrap()[0].as_deref(), Some("S_00001"));
        assert_eq!(table.text("participantId").unwrap()[0].as_deref(), Some("P_001"));
    }

    #[test]
    fn test_same_seed_same_table() {
        let a = generate_sessions(&small()).unwrap();
        let b = generate_sessions(&small()).unwrap();
        assert_eq!(a.columns(), b.columns());
    }

    #[test]
    fn test_roles_of_generated_table() {
        let table = generate_sessions(&small()).unwrap();
        let schema = FeatureSchema::infer(&table, 10).unwrap();

        assert_eq!(schema.motor_numeric.len(), 3 * 33 + 15);
        for excluded in EXCLUDED_CONDITION_COLUMNS {
            assert!(!schema.motor_numeric.iter().any(|c| c == excluded));
            assert_eq!(table.kind(excluded), Some(ColumnKind::Numeric));
        }
        assert!(schema.context_categorical.contains(&"device_os".to_string()));
    }

    #[test]
    fn test_conditions_are_fixed() {
        let table = generate_sessions(&small()).unwrap();
        let speeds = table.numeric("r3_speedPxPerFrame").unwrap();
        assert!(speeds.iter().all(|v| *v == Some(4.8)));
    }

    #[test]
    fn test_reaction_time_tracks_hit_rate_inversely() {
        let table = generate_sessions(&SyntheticConfig::default()).unwrap();
        let rt: Vec<f64> = table
            .numeric("r1_reactionTime_mean")
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .collect();
        let hits: Vec<f64> = table
            .numeric("r1_hitRate")
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .collect();
        assert!(pearson(&rt, &hits) < 0.0);
    }

    #[test]
    fn test_invalid_session_range() {
        let config = SyntheticConfig {
            min_sessions: 4,
            max_sessions: 2,
            ..SyntheticConfig::default()
        };
        assert!(matches!(generate_sessions(&config), Err(MotorError::Config(_))));
    }
}
