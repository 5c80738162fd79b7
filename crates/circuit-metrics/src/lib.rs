//! Metrics for the light switch and light controller.
//!
//! Every metric is declared once as a [`Metric`] constant in [`metric_defs`], carrying
//! its kind, description, unit and label keys. Recording goes through the `metrics`
//! crate facade, so nothing is collected unless the application installs a recorder.
//!
//! ```rust
//! use circuit_metrics::{metric_defs, MetricLabels};
//!
//! let labels = MetricLabels::new("porch", "switch");
//! metrics::counter!(metric_defs::SWITCH_COMMANDS_SENT.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing.
    Counter,
    /// Goes up and down.
    Gauge,
    /// Distribution of observations.
    Histogram,
}

impl MetricKind {
    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration.
///
/// ```rust
/// use circuit_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter("circuit.switch.retries")
///     .with_description("Commands replayed after a binding came back")
///     .with_unit(Unit::Count)
///     .with_labels(&["node", "role"]);
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name.
    pub name: &'static str,
    /// Counter, gauge or histogram.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Unit of measurement.
    pub unit: Option<Unit>,
    /// Label keys recorded with the metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Set the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Light Controller
    // ========================================================================

    /// Commands applied to the light.
    pub const CONTROLLER_COMMANDS_APPLIED: Metric =
        Metric::counter("circuit.controller.commands_applied")
            .with_description("Remote commands applied to the light")
            .with_unit(Unit::Count)
            .with_labels(&["node", "role"]);

    /// Commands answered with a status report.
    ///
    /// Labels: node, role, status
    pub const CONTROLLER_COMMANDS_REJECTED: Metric =
        Metric::counter("circuit.controller.commands_rejected")
            .with_description("Remote commands rejected with a status report")
            .with_unit(Unit::Count)
            .with_labels(&["node", "role", "status"]);

    /// State changes from any origin.
    ///
    /// Labels: node, role, origin (remote, local)
    pub const CONTROLLER_STATE_CHANGES: Metric =
        Metric::counter("circuit.controller.state_changes")
            .with_description("Light state changes")
            .with_unit(Unit::Count)
            .with_labels(&["node", "role", "origin"]);

    /// Current brightness level.
    pub const CONTROLLER_LEVEL: Metric = Metric::gauge("circuit.controller.level")
        .with_description("Current brightness level")
        .with_unit(Unit::Percent)
        .with_labels(&["node", "role"]);

    // ========================================================================
    // Light Switch
    // ========================================================================

    /// Commands handed to the binding.
    pub const SWITCH_COMMANDS_SENT: Metric = Metric::counter("circuit.switch.commands_sent")
        .with_description("SetLogicalCircuitState commands sent")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role"]);

    /// Commands that failed to encode or send.
    ///
    /// Labels: node, role, reason
    pub const SWITCH_SEND_FAILURES: Metric = Metric::counter("circuit.switch.send_failures")
        .with_description("Commands that failed before or during delivery")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role", "reason"]);

    /// Set requests equal to the desired state.
    pub const SWITCH_SETS_SUPPRESSED: Metric = Metric::counter("circuit.switch.sets_suppressed")
        .with_description("Set requests dropped because nothing changed")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role"]);

    /// Pending changes overwritten by a newer one before being sent.
    pub const SWITCH_CHANGES_COALESCED: Metric =
        Metric::counter("circuit.switch.changes_coalesced")
            .with_description("Pending changes replaced before the binding became ready")
            .with_unit(Unit::Count)
            .with_labels(&["node", "role"]);

    /// Binding state transitions.
    ///
    /// Labels: node, role, to
    pub const SWITCH_BINDING_TRANSITIONS: Metric =
        Metric::counter("circuit.switch.binding_transitions")
            .with_description("Binding state transitions")
            .with_unit(Unit::Count)
            .with_labels(&["node", "role", "to"]);

    /// Replies received from the controller.
    ///
    /// Labels: node, role, status
    pub const SWITCH_REPLIES: Metric = Metric::counter("circuit.switch.replies")
        .with_description("Controller replies received")
        .with_unit(Unit::Count)
        .with_labels(&["node", "role", "status"]);

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Loopback messages delivered per pump.
    pub const SIM_MESSAGES_PER_PUMP: Metric = Metric::histogram("circuit.sim.messages_per_pump")
        .with_description("Loopback deliveries made by one pump of the simulation")
        .with_unit(Unit::Count);

    /// Every defined metric.
    pub const ALL: &[&Metric] = &[
        &CONTROLLER_COMMANDS_APPLIED,
        &CONTROLLER_COMMANDS_REJECTED,
        &CONTROLLER_STATE_CHANGES,
        &CONTROLLER_LEVEL,
        &SWITCH_COMMANDS_SENT,
        &SWITCH_SEND_FAILURES,
        &SWITCH_SETS_SUPPRESSED,
        &SWITCH_CHANGES_COALESCED,
        &SWITCH_BINDING_TRANSITIONS,
        &SWITCH_REPLIES,
        &SIM_MESSAGES_PER_PUMP,
    ];
}

/// Labels identifying the node a metric is recorded for.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Node name.
    pub node: String,
    /// Node role (switch, controller).
    pub role: String,
}

impl MetricLabels {
    /// Labels for `node` acting as `role`.
    pub fn new(node: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            role: role.into(),
        }
    }

    /// Labels in the `metrics` crate format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("node", self.node.clone()), ("role", self.role.clone())]
    }

    /// Labels with extra key-value pairs appended.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions of every metric. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
