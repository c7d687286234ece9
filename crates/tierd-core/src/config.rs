use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::activity::{Phase, PhaseThresholds};

/// Idle thresholds in minutes (`[thresholds]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Idle minutes after which a user enters Phase1.
    pub phase1_mins: u64,
    /// Idle minutes after which a user enters Phase2.
    pub phase2_mins: u64,
    /// Idle minutes after which a user enters Phase3.
    pub phase3_mins: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            phase1_mins: 10,
            phase2_mins: 30,
            phase3_mins: 60,
        }
    }
}

fn mins(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}

impl ThresholdConfig {
    pub fn to_thresholds(&self) -> PhaseThresholds {
        PhaseThresholds::new(
            mins(self.phase1_mins),
            mins(self.phase2_mins),
            mins(self.phase3_mins),
        )
    }
}

/// Activity tracker housekeeping (`[activity]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// How often stale activity records are swept.
    pub sweep_interval_secs: u64,
    /// Records idle longer than this are evicted; also the session gap.
    pub stale_after_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            stale_after_secs: 2 * 60 * 60,
        }
    }
}

/// Concurrency budget for one phase.
///
/// `cpu_share` is the percentage of CPU the phase may use when every slot is
/// busy; it only feeds the utilisation estimate, admission is by slot count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBudgetConfig {
    /// Maximum jobs of this phase running at once.
    pub max_concurrent: usize,
    /// Maximum jobs dispatched for this phase per poll tick.
    pub batch_size: usize,
    /// Approximate CPU percentage the phase may consume.
    pub cpu_share: u8,
}

/// Per-phase budgets (`[budgets.phaseN]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetsConfig {
    pub phase1: PhaseBudgetConfig,
    pub phase2: PhaseBudgetConfig,
    pub phase3: PhaseBudgetConfig,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            phase1: PhaseBudgetConfig {
                max_concurrent: 1,
                batch_size: 1,
                cpu_share: 5,
            },
            phase2: PhaseBudgetConfig {
                max_concurrent: 2,
                batch_size: 2,
                cpu_share: 15,
            },
            phase3: PhaseBudgetConfig {
                max_concurrent: 4,
                batch_size: 4,
                cpu_share: 80,
            },
        }
    }
}

impl BudgetsConfig {
    /// Budget for `phase`; `None` for `Active`, which never runs background work.
    pub fn for_phase(&self, phase: Phase) -> Option<&PhaseBudgetConfig> {
        match phase {
            Phase::Active => None,
            Phase::Phase1 => Some(&self.phase1),
            Phase::Phase2 => Some(&self.phase2),
            Phase::Phase3 => Some(&self.phase3),
        }
    }

    /// Sum of the per-phase ceilings.
    pub fn total_concurrent(&self) -> usize {
        self.phase1.max_concurrent + self.phase2.max_concurrent + self.phase3.max_concurrent
    }
}

/// HTTP ingress settings (`[http]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address for `tierd serve`.
    pub bind: String,
    /// Bearer token required on `/api` routes. None disables auth.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7878".to_string(),
            token: None,
        }
    }
}

/// Global configuration loaded from `~/.config/tierd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierdConfig {
    /// Scheduler poll interval in seconds.
    pub poll_interval_secs: u64,
    /// Jobs running longer than this are force-cancelled.
    pub job_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs before force-cancelling.
    pub shutdown_grace_secs: u64,
    /// Attempts per job before it is marked failed.
    pub max_attempts: u32,
    /// Terminal jobs older than this many days are purged by `cleanup`.
    pub retention_days: u32,
    /// Optional global worker cap; defaults to the sum of phase ceilings.
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub budgets: BudgetsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for TierdConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            job_timeout_secs: 120,
            shutdown_grace_secs: 10,
            max_attempts: 3,
            retention_days: 7,
            max_workers: None,
            thresholds: ThresholdConfig::default(),
            activity: ActivityConfig::default(),
            budgets: BudgetsConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl TierdConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.activity.sweep_interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.activity.stale_after_secs)
    }

    /// Effective global worker ceiling.
    pub fn max_workers(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| self.budgets.total_concurrent())
            .max(1)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the scheduler cannot honour.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.phase1_mins < t.phase2_mins && t.phase2_mins < t.phase3_mins) {
            bail!(
                "thresholds must be strictly increasing (got {} / {} / {} minutes)",
                t.phase1_mins,
                t.phase2_mins,
                t.phase3_mins
            );
        }
        for phase in Phase::IDLE_PHASES {
            if let Some(b) = self.budgets.for_phase(phase) {
                if b.max_concurrent == 0 || b.batch_size == 0 {
                    bail!("budget for {} must allow at least one job", phase);
                }
            }
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tierd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TierdConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TierdConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: TierdConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}
