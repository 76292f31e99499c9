// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Abstract span + metric sink.
//!
//! The store and memory engine report timing through this interface rather
//! than depending on a concrete telemetry exporter.  [`NoopTracer`] is the
//! default; [`LogTracer`] bridges spans and metrics onto `tracing` events for
//! deployments that only want structured logs.

use std::sync::Arc;
use std::time::Instant;

/// A span attribute: key plus rendered value.
pub type Attr = (&'static str, String);

/// Span + metric sink.
///
/// Implementations must be cheap; `span` is called on every store operation.
pub trait Tracer: Send + Sync {
    /// Called when a span opens.
    fn on_span_start(&self, name: &str, attrs: &[Attr]);
    /// Called when a span closes, with its wall-clock duration.
    fn on_span_end(&self, name: &str, attrs: &[Attr], duration_ms: f64);
    /// Record a standalone metric value.
    fn on_metric(&self, name: &str, value: f64);
}

/// RAII guard for one span.  Dropping the guard closes the span and records
/// the metric `<name>.duration_ms` on the owning tracer.
pub struct Span {
    tracer: Arc<dyn Tracer>,
    name: String,
    attrs: Vec<Attr>,
    started: Instant,
}

impl Span {
    /// Open a span on `tracer`.
    pub fn start(tracer: Arc<dyn Tracer>, name: impl Into<String>, attrs: Vec<Attr>) -> Self {
        let name = name.into();
        tracer.on_span_start(&name, &attrs);
        Self {
            tracer,
            name,
            attrs,
            started: Instant::now(),
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.tracer.on_span_end(&self.name, &self.attrs, elapsed_ms);
        self.tracer
            .on_metric(&format!("{}.duration_ms", self.name), elapsed_ms);
    }
}

/// Discards everything.  The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn on_span_start(&self, _name: &str, _attrs: &[Attr]) {}
    fn on_span_end(&self, _name: &str, _attrs: &[Attr], _duration_ms: f64) {}
    fn on_metric(&self, _name: &str, _value: f64) {}
}

/// Forwards spans and metrics to `tracing` debug events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn on_span_start(&self, name: &str, attrs: &[Attr]) {
        tracing::debug!(span = %name, ?attrs, "span start");
    }

    fn on_span_end(&self, name: &str, attrs: &[Attr], duration_ms: f64) {
        tracing::debug!(span = %name, ?attrs, duration_ms, "span end");
    }

    fn on_metric(&self, name: &str, value: f64) {
        tracing::debug!(metric = %name, value, "metric");
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
