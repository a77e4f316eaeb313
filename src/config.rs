use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Per-solve settings, passed explicitly into every call to the solver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolveConfig {
    /// Wall-clock limit handed to the MILP engine.
    pub time_limit_secs: f64,
    /// Weight of the penalty for teaching a lesson in separate blocks on the same day.
    pub spread_weight: f64,
    /// Part of the day that lessons are pushed away from, leaving free periods there.
    pub optimal_free_period_time: Option<FreePeriodPreference>,
    pub free_period_weight: f64,
    /// When false, a lesson may only be taught in one contiguous block per day.
    pub allow_split_lessons_within_each_day: bool,
    /// When false, a lesson may have at most one double period per day.
    pub allow_triple_periods_and_above: bool,
    pub threads: u32,
    pub random_seed: u32,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 60.0,
            spread_weight: 1.0,
            optimal_free_period_time: None,
            free_period_weight: 0.1,
            allow_split_lessons_within_each_day: true,
            allow_triple_periods_and_above: true,
            threads: 1, // single thread keeps results reproducible
            random_seed: 1234,
        }
    }
}

impl SolveConfig {
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit_secs = time_limit.as_secs_f64();
        self
    }

    pub fn time_limit(&self) -> Duration {
        let secs = self.time_limit_secs;
        Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }
}

/// Where free periods should preferably fall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FreePeriodPreference {
    /// Halfway between the first slot of the day and noon.
    Morning,
    /// Halfway between noon and the end of the last slot of the day.
    Afternoon,
    At(NaiveTime),
}

impl FreePeriodPreference {
    /// Hour of the day, as a fraction, that lessons are pushed away from.
    ///
    /// `day_start` and `day_end` bound the school day in the same units.
    pub fn repulsive_hour(self, day_start: f64, day_end: f64) -> f64 {
        match self {
            FreePeriodPreference::Morning => (day_start + NOON) / 2.0,
            FreePeriodPreference::Afternoon => (NOON + day_end) / 2.0,
            FreePeriodPreference::At(time) => hour_of_day(time),
        }
    }
}

const NOON: f64 = 12.0;

pub(crate) fn hour_of_day(time: NaiveTime) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0
}

pub const BIND_ADDR_ENV: &str = "TIMETABLE_BIND_ADDR";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Settings for the HTTP service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        let raw = std::env::var(BIND_ADDR_ENV).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let bind_addr = raw
            .parse()
            .map_err(|e| format!("invalid {BIND_ADDR_ENV} '{raw}': {e}"))?;
        Ok(Self { bind_addr })
    }
}
