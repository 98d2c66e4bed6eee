//! Step and lock instrumentation
//!
//! With the `metrics` feature the upgrader records OpenTelemetry counters and
//! histograms on the global meter; exporting them is left to the host. With
//! the `tracing` feature steps, statements and lock waits get spans.

use std::time::Duration;

#[cfg(feature = "metrics")]
pub use otel::{MigrationMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<MigrationMetrics> = Lazy::new(MigrationMetrics::init);

    pub struct MigrationMetrics {
        pub steps_total: Counter<u64>,
        pub step_failures_total: Counter<u64>,
        pub step_duration: Histogram<f64>,
        pub lock_wait_duration: Histogram<f64>,
    }

    impl MigrationMetrics {
        pub fn init() -> Self {
            let meter = global::meter("tidemark");

            let steps_total = meter
                .u64_counter("tidemark_steps_total")
                .with_description("Migration steps completed")
                .build();

            let step_failures_total = meter
                .u64_counter("tidemark_step_failures_total")
                .with_description("Migration steps that failed")
                .build();

            let step_duration = meter
                .f64_histogram("tidemark_step_duration_seconds")
                .with_description("Duration of migration steps")
                .build();

            let lock_wait_duration = meter
                .f64_histogram("tidemark_lock_wait_seconds")
                .with_description("Time spent waiting for the migration lock")
                .build();

            Self {
                steps_total,
                step_failures_total,
                step_duration,
                lock_wait_duration,
            }
        }

        pub fn record_step(&self, plan: &str, elapsed: Duration, succeeded: bool) {
            let attributes = [KeyValue::new("plan", plan.to_string())];
            if succeeded {
                self.steps_total.add(1, &attributes);
            } else {
                self.step_failures_total.add(1, &attributes);
            }
            self.step_duration.record(elapsed.as_secs_f64(), &attributes);
        }

        pub fn record_lock_wait(&self, plan: &str, waited: Duration) {
            self.lock_wait_duration
                .record(waited.as_secs_f64(), &[KeyValue::new("plan", plan.to_string())]);
        }
    }
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub(crate) fn record_step(plan: &str, elapsed: Duration, succeeded: bool) {
    #[cfg(feature = "metrics")]
    METRICS.record_step(plan, elapsed, succeeded);
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub(crate) fn record_lock_wait(plan: &str, waited: Duration) {
    #[cfg(feature = "metrics")]
    METRICS.record_lock_wait(plan, waited);
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    pub fn step_span(plan: &str, step: &str, from: &str, to: &str) -> Span {
        tracing::info_span!("tidemark.step", plan, step, from, to)
    }

    pub fn statement_span(sql: &str) -> Span {
        tracing::debug_span!("tidemark.statement", sql)
    }

    pub fn lock_span(plan: &str) -> Span {
        tracing::debug_span!("tidemark.lock", plan)
    }
}
