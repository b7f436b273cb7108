use serde::{Deserialize, Serialize};

use super::rng::{SimRng, Stream};

pub const HISTORICAL_START_YEAR: u32 = 1928;

// Annual nominal total returns of a broad large-cap equity index, 1928-2023.
const HISTORICAL_RETURNS: [f64; 96] = [
    43.81, -8.30, -25.12, -43.84, -8.64, 49.98, -1.19, 46.74, 31.94, -35.34, // 1928
    29.28, -1.10, -10.67, -12.77, 19.17, 25.06, 19.03, 35.82, -8.43, 5.20, // 1938
    5.70, 18.30, 30.81, 23.68, 18.15, -1.21, 52.56, 32.60, 7.44, -10.46, // 1948
    43.72, 12.06, 0.34, 26.64, -8.81, 22.61, 16.42, 12.40, -9.97, 23.80, // 1958
    10.81, -8.24, 3.56, 14.22, 18.76, -14.31, -25.90, 37.00, 23.83, -6.98, // 1968
    6.51, 18.52, 31.74, -4.70, 20.42, 22.34, 6.15, 31.24, 18.49, 5.81, // 1978
    16.54, 31.48, -3.06, 30.23, 7.49, 9.97, 1.33, 37.20, 22.68, 33.10, // 1988
    28.34, 20.89, -9.03, -11.85, -21.97, 28.36, 10.74, 4.83, 15.61, 5.48, // 1998
    -36.55, 25.94, 14.82, 2.10, 15.89, 32.15, 13.52, 1.38, 11.77, 21.61, // 2008
    -4.23, 31.21, 18.02, 28.47, -18.04, 26.06, // 2018
];

const MIN_RETURN_PCT: f64 = -95.0;
const MAX_RETURN_PCT: f64 = 250.0;

pub fn historical_series() -> &'static [f64] {
    &HISTORICAL_RETURNS
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoricalWindow {
    GreatDepression1929,
    PostWarBoom1950,
    Stagflation1973,
    DotCom2000,
    Gfc2008,
    StartYear(u32),
}

impl HistoricalWindow {
    pub fn start_year(self) -> u32 {
        match self {
            HistoricalWindow::GreatDepression1929 => 1929,
            HistoricalWindow::PostWarBoom1950 => 1950,
            HistoricalWindow::Stagflation1973 => 1973,
            HistoricalWindow::DotCom2000 => 2000,
            HistoricalWindow::Gfc2008 => 2008,
            HistoricalWindow::StartYear(year) => year,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapMethod {
    #[default]
    Shuffle,
    OverlappingBlock,
    CompleteBlock,
}

fn default_block_size() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ReturnMode {
    Constant {
        #[serde(rename = "ratePct")]
        rate_pct: f64,
    },
    Historical {
        window: HistoricalWindow,
    },
    MonteCarlo {
        #[serde(rename = "meanPct")]
        mean_pct: f64,
        #[serde(rename = "stdDevPct")]
        std_dev_pct: f64,
    },
    Bootstrap {
        #[serde(default)]
        method: BootstrapMethod,
        #[serde(rename = "blockSize", default = "default_block_size")]
        block_size: usize,
    },
    Sequence {
        returns: Vec<f64>,
    },
}

impl Default for ReturnMode {
    fn default() -> Self {
        ReturnMode::MonteCarlo {
            mean_pct: 7.0,
            std_dev_pct: 12.0,
        }
    }
}

pub fn generate_returns(mode: &ReturnMode, horizon: usize, rng: &mut SimRng) -> Vec<f64> {
    let series = historical_series();
    match mode {
        ReturnMode::Constant { rate_pct } => vec![*rate_pct; horizon],
        ReturnMode::Historical { window } => {
            let start = historical_offset(window.start_year());
            (0..horizon)
                .map(|i| series[(start + i) % series.len()])
                .collect()
        }
        ReturnMode::MonteCarlo {
            mean_pct,
            std_dev_pct,
        } => (0..horizon)
            .map(|_| rng.normal(*mean_pct, *std_dev_pct).clamp(MIN_RETURN_PCT, MAX_RETURN_PCT))
            .collect(),
        ReturnMode::Bootstrap { method, block_size } => match method {
            BootstrapMethod::Shuffle => shuffle_sample(series, horizon, rng),
            BootstrapMethod::OverlappingBlock => {
                overlapping_block_sample(series, horizon, *block_size, rng)
            }
            BootstrapMethod::CompleteBlock => {
                let windows = unique_window_count(series.len(), horizon);
                if windows == 0 {
                    return overlapping_block_sample(series, horizon, series.len(), rng);
                }
                window_sequence(series, rng.below(windows), horizon)
            }
        },
        ReturnMode::Sequence { returns } => (0..horizon)
            .map(|i| returns.get(i).copied().unwrap_or(0.0))
            .collect(),
    }
}

fn historical_offset(start_year: u32) -> usize {
    let last_year = HISTORICAL_START_YEAR + HISTORICAL_RETURNS.len() as u32 - 1;
    (start_year.clamp(HISTORICAL_START_YEAR, last_year) - HISTORICAL_START_YEAR) as usize
}

fn shuffle_sample(series: &[f64], horizon: usize, rng: &mut SimRng) -> Vec<f64> {
    (0..horizon).map(|_| series[rng.below(series.len())]).collect()
}

fn overlapping_block_sample(
    series: &[f64],
    horizon: usize,
    block_size: usize,
    rng: &mut SimRng,
) -> Vec<f64> {
    let block = block_size.clamp(1, series.len());
    let starts = series.len() - block + 1;
    let mut out = Vec::with_capacity(horizon + block);
    while out.len() < horizon {
        let start = rng.below(starts);
        out.extend_from_slice(&series[start..start + block]);
    }
    out.truncate(horizon);
    out
}

fn window_sequence(series: &[f64], start: usize, horizon: usize) -> Vec<f64> {
    series[start..start + horizon].to_vec()
}

pub fn unique_window_count(series_len: usize, horizon: usize) -> usize {
    if horizon == 0 || horizon > series_len {
        0
    } else {
        series_len - horizon + 1
    }
}

pub fn complete_block_starts(
    series_len: usize,
    horizon: usize,
    requested: usize,
    rng: &mut SimRng,
) -> Vec<usize> {
    let windows = unique_window_count(series_len, horizon);
    let mut starts: Vec<usize> = (0..windows).collect();
    if requested >= windows {
        return starts;
    }

    // Partial Fisher-Yates: the first `requested` slots end up distinct.
    for i in 0..requested {
        let j = i + rng.below(windows - i);
        starts.swap(i, j);
    }
    starts.truncate(requested);
    starts
}

pub struct ReturnPlan<'a> {
    mode: &'a ReturnMode,
    horizon: usize,
    seed: u64,
    run_count: u32,
    window_starts: Option<Vec<usize>>,
}

impl<'a> ReturnPlan<'a> {
    pub fn new(mode: &'a ReturnMode, horizon: usize, requested_runs: u32, seed: u64) -> Self {
        let window_starts = match mode {
            ReturnMode::Bootstrap {
                method: BootstrapMethod::CompleteBlock,
                ..
            } => {
                let mut rng = SimRng::for_run(seed, 0, Stream::Plan);
                Some(complete_block_starts(
                    historical_series().len(),
                    horizon,
                    requested_runs as usize,
                    &mut rng,
                ))
            }
            _ => None,
        };
        let run_count = window_starts
            .as_ref()
            .map(|starts| starts.len() as u32)
            .unwrap_or(requested_runs);

        Self {
            mode,
            horizon,
            seed,
            run_count,
            window_starts,
        }
    }

    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    pub fn sequence(&self, run_index: u32) -> Vec<f64> {
        if let Some(starts) = &self.window_starts {
            let start = starts[run_index as usize];
            return window_sequence(historical_series(), start, self.horizon);
        }
        let mut rng = SimRng::for_run(self.seed, run_index, Stream::Returns);
        generate_returns(self.mode, self.horizon, &mut rng)
    }
}
