//! World-state domain model.
//!
//! A `WorldState` is the planner's view of the fleet: coverage and quality
//! figures, which agent types are available, remaining resources, execution
//! context and learned patterns. It is a plain value: cloning produces a fully
//! independent copy (every nested collection is owned), which is what lets the
//! planner branch without search paths leaking into each other.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment environment the fleet is analysing for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// Coverage figures, percentages in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoverageMetrics {
    pub line: f64,
    pub branch: f64,
    pub function: f64,
    /// Number of known uncovered regions.
    pub gaps: u32,
}

/// Quality figures reported by the analysis domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QualityMetrics {
    /// Percentage of tests currently passing.
    pub tests_passing: f64,
    pub security_score: f64,
    pub performance_score: f64,
    pub technical_debt: f64,
}

/// Fleet availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FleetState {
    /// Agent types currently idle. Order carries no meaning.
    pub available_agents: Vec<String>,
    pub busy_agents: u32,
}

/// Budget left for the current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResourceState {
    pub time_remaining_secs: f64,
    pub memory_available_mb: f64,
    pub parallel_slots: u32,
}

/// Execution context for the change under analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContextState {
    pub environment: Environment,
    /// Lines touched by the change.
    pub change_size: u32,
    /// Risk estimate in `[0, 1]`.
    pub risk_level: f64,
    pub previous_failures: u32,
    /// Named boolean facts ("tests_generated", "scan_complete", ...).
    pub flags: BTreeMap<String, bool>,
}

/// Patterns learned from earlier runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatternState {
    pub known: Vec<String>,
    pub confidence: f64,
}

/// Planning-relevant snapshot of the fleet and the code under analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorldState {
    pub coverage: CoverageMetrics,
    pub quality: QualityMetrics,
    pub fleet: FleetState,
    pub resources: ResourceState,
    pub context: ContextState,
    pub patterns: PatternState,
}

/// Numeric fields of [`WorldState`] addressable by conditions and effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    LineCoverage,
    BranchCoverage,
    FunctionCoverage,
    CoverageGaps,
    TestsPassing,
    SecurityScore,
    PerformanceScore,
    TechnicalDebt,
    BusyAgents,
    TimeRemaining,
    MemoryAvailable,
    ParallelSlots,
    ChangeSize,
    RiskLevel,
    PreviousFailures,
    PatternConfidence,
}

impl Metric {
    pub const ALL: [Self; 16] = [
        Self::LineCoverage,
        Self::BranchCoverage,
        Self::FunctionCoverage,
        Self::CoverageGaps,
        Self::TestsPassing,
        Self::SecurityScore,
        Self::PerformanceScore,
        Self::TechnicalDebt,
        Self::BusyAgents,
        Self::TimeRemaining,
        Self::MemoryAvailable,
        Self::ParallelSlots,
        Self::ChangeSize,
        Self::RiskLevel,
        Self::PreviousFailures,
        Self::PatternConfidence,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LineCoverage => "line_coverage",
            Self::BranchCoverage => "branch_coverage",
            Self::FunctionCoverage => "function_coverage",
            Self::CoverageGaps => "coverage_gaps",
            Self::TestsPassing => "tests_passing",
            Self::SecurityScore => "security_score",
            Self::PerformanceScore => "performance_score",
            Self::TechnicalDebt => "technical_debt",
            Self::BusyAgents => "busy_agents",
            Self::TimeRemaining => "time_remaining",
            Self::MemoryAvailable => "memory_available",
            Self::ParallelSlots => "parallel_slots",
            Self::ChangeSize => "change_size",
            Self::RiskLevel => "risk_level",
            Self::PreviousFailures => "previous_failures",
            Self::PatternConfidence => "pattern_confidence",
        }
    }

    /// Whether the backing field is an unsigned counter.
    pub const fn is_count(&self) -> bool {
        matches!(
            self,
            Self::CoverageGaps
                | Self::BusyAgents
                | Self::ParallelSlots
                | Self::ChangeSize
                | Self::PreviousFailures
        )
    }

    /// The value `set_metric` would actually store for `value`.
    pub fn stored_value(&self, value: f64) -> f64 {
        if self.is_count() {
            f64::from(to_count(value))
        } else {
            value
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts an arbitrary float into a counter value, saturating at the bounds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_count(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        value.round() as u32
    }
}

impl WorldState {
    /// Read a numeric field.
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::LineCoverage => self.coverage.line,
            Metric::BranchCoverage => self.coverage.branch,
            Metric::FunctionCoverage => self.coverage.function,
            Metric::CoverageGaps => f64::from(self.coverage.gaps),
            Metric::TestsPassing => self.quality.tests_passing,
            Metric::SecurityScore => self.quality.security_score,
            Metric::PerformanceScore => self.quality.performance_score,
            Metric::TechnicalDebt => self.quality.technical_debt,
            Metric::BusyAgents => f64::from(self.fleet.busy_agents),
            Metric::TimeRemaining => self.resources.time_remaining_secs,
            Metric::MemoryAvailable => self.resources.memory_available_mb,
            Metric::ParallelSlots => f64::from(self.resources.parallel_slots),
            Metric::ChangeSize => f64::from(self.context.change_size),
            Metric::RiskLevel => self.context.risk_level,
            Metric::PreviousFailures => f64::from(self.context.previous_failures),
            Metric::PatternConfidence => self.patterns.confidence,
        }
    }

    /// Write a numeric field. Counter fields are rounded and clamped at zero.
    pub fn set_metric(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::LineCoverage => self.coverage.line = value,
            Metric::BranchCoverage => self.coverage.branch = value,
            Metric::FunctionCoverage => self.coverage.function = value,
            Metric::CoverageGaps => self.coverage.gaps = to_count(value),
            Metric::TestsPassing => self.quality.tests_passing = value,
            Metric::SecurityScore => self.quality.security_score = value,
            Metric::PerformanceScore => self.quality.performance_score = value,
            Metric::TechnicalDebt => self.quality.technical_debt = value,
            Metric::BusyAgents => self.fleet.busy_agents = to_count(value),
            Metric::TimeRemaining => self.resources.time_remaining_secs = value,
            Metric::MemoryAvailable => self.resources.memory_available_mb = value,
            Metric::ParallelSlots => self.resources.parallel_slots = to_count(value),
            Metric::ChangeSize => self.context.change_size = to_count(value),
            Metric::RiskLevel => self.context.risk_level = value,
            Metric::PreviousFailures => self.context.previous_failures = to_count(value),
            Metric::PatternConfidence => self.patterns.confidence = value,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        self.context.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.context.flags.insert(name.into(), value);
    }

    pub fn has_agent(&self, agent_type: &str) -> bool {
        self.fleet.available_agents.iter().any(|a| a == agent_type)
    }

    pub fn add_agent(&mut self, agent_type: impl Into<String>) {
        self.fleet.available_agents.push(agent_type.into());
    }

    /// Remove one instance of the given agent type. Returns false if none was available.
    pub fn remove_agent(&mut self, agent_type: &str) -> bool {
        if let Some(pos) = self
            .fleet
            .available_agents
            .iter()
            .position(|a| a == agent_type)
        {
            self.fleet.available_agents.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn knows_pattern(&self, pattern: &str) -> bool {
        self.patterns.known.iter().any(|p| p == pattern)
    }

    pub fn learn_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !self.knows_pattern(&pattern) {
            self.patterns.known.push(pattern);
        }
    }

    /// Order-independent identity of this state, used for duplicate detection.
    ///
    /// Floats are keyed by bit pattern (with `-0.0` folded into `0.0`), and
    /// the agent and pattern lists are sorted, so two states that differ only
    /// in list order map to the same key.
    pub fn canonical_key(&self) -> StateKey {
        let metrics = Metric::ALL
            .iter()
            .map(|m| canonical_bits(self.metric(*m)))
            .collect();

        let mut agents = self.fleet.available_agents.clone();
        agents.sort_unstable();

        let mut patterns = self.patterns.known.clone();
        patterns.sort_unstable();
        patterns.dedup();

        // Unset and false are the same fact.
        let flags = self
            .context
            .flags
            .iter()
            .filter(|(_, v)| **v)
            .map(|(k, _)| k.clone())
            .collect();

        StateKey {
            metrics,
            agents,
            patterns,
            flags,
            environment: self.context.environment,
        }
    }
}

fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

/// Hashable, order-independent identity of a [`WorldState`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    metrics: Vec<u64>,
    agents: Vec<String>,
    patterns: Vec<String>,
    flags: Vec<String>,
    environment: Environment,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> WorldState {
        let mut state = WorldState::default();
        state.coverage.line = 42.5;
        state.fleet.available_agents = vec!["tester".to_string(), "scanner".to_string()];
        state.set_flag("tests_generated", true);
        state.learn_pattern("flaky-network");
        state
    }

    #[test]
    fn test_clone_is_equal_and_independent() {
        let original = sample_state();
        let mut clone = original.clone();
        assert_eq!(clone, original);

        clone.fleet.available_agents.push("fuzzer".to_string());
        clone.context.flags.insert("scan_complete".to_string(), true);
        clone.patterns.known.clear();

        assert_eq!(original.fleet.available_agents.len(), 2);
        assert!(!original.flag("scan_complete"));
        assert!(original.knows_pattern("flaky-network"));
    }

    #[test]
    fn test_canonical_key_ignores_agent_order() {
        let a = sample_state();
        let mut b = sample_state();
        b.fleet.available_agents.reverse();
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_canonical_key_distinguishes_metrics() {
        let a = sample_state();
        let mut b = sample_state();
        b.coverage.line = 43.0;
        assert_ne!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_canonical_key_folds_negative_zero_and_false_flags() {
        let mut a = WorldState::default();
        let mut b = WorldState::default();
        a.coverage.branch = -0.0;
        b.set_flag("scan_complete", false);
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_count_metrics_clamp_at_zero() {
        let mut state = WorldState::default();
        state.set_metric(Metric::CoverageGaps, -3.0);
        assert_eq!(state.coverage.gaps, 0);
        state.set_metric(Metric::CoverageGaps, 2.6);
        assert_eq!(state.coverage.gaps, 3);
        assert!(Metric::CoverageGaps.is_count());
    }

    #[test]
    fn test_remove_agent_removes_single_instance() {
        let mut state = WorldState::default();
        state.add_agent("tester");
        state.add_agent("tester");
        assert!(state.remove_agent("tester"));
        assert!(state.has_agent("tester"));
        assert!(state.remove_agent("tester"));
        assert!(!state.remove_agent("tester"));
    }

    #[test]
    fn test_world_state_parses_from_yaml_with_defaults() {
        let yaml = r"
coverage:
  line: 55.0
fleet:
  available_agents: [tester, scanner]
context:
  environment: production
  flags:
    tests_generated: true
";
        let state: WorldState = serde_yaml::from_str(yaml).unwrap();
        assert!((state.coverage.line - 55.0).abs() < f64::EPSILON);
        assert_eq!(state.context.environment, Environment::Production);
        assert!(state.flag("tests_generated"));
        assert_eq!(state.quality, QualityMetrics::default());
    }
}
