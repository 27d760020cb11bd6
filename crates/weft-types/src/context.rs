//! Per-request execution context threaded through a primitive graph.
//!
//! `ExecutionContext` identifies one logical request: a stable correlation
//! id, W3C trace-context identity, caller-supplied metadata read by routing
//! and condition functions, and an append-only checkpoint log. Parallel
//! branches run against value-copied child contexts so no mutable structure
//! is ever shared across branches; the cancellation token is the one
//! deliberate exception, since cancelling a parent must reach its children.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Trace context
// ---------------------------------------------------------------------------

/// W3C trace-context identity carried by an execution.
///
/// `trace_id` is 32 lowercase hex chars, `span_id` 16, `trace_flags` one
/// byte -- the textual encoding used by the `traceparent` header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceContext {
    /// Identity of the whole trace (stable across child spans).
    pub trace_id: String,
    /// Identity of the current span.
    pub span_id: String,
    /// Back-reference to the parent span, if any.
    pub parent_span_id: Option<String>,
    /// W3C trace flags byte (bit 0 = sampled).
    pub trace_flags: u8,
}

/// Malformed `traceparent` input.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("malformed traceparent '{0}'")]
pub struct TraceParseError(pub String);

impl TraceContext {
    /// Generate a fresh root trace context.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            parent_span_id: None,
            trace_flags: 0,
        }
    }

    /// Derive a child span: same trace, fresh span id, parent back-reference.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            trace_flags: self.trace_flags,
        }
    }

    /// Render as a W3C `traceparent` value (version 00).
    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id, self.span_id, self.trace_flags
        )
    }

    /// Parse a W3C `traceparent` value.
    pub fn parse_traceparent(value: &str) -> Result<Self, TraceParseError> {
        let mut parts = value.split('-');
        let (version, trace_id, span_id, flags) = match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some(v), Some(t), Some(s), Some(f), None) => (v, t, s, f),
            _ => return Err(TraceParseError(value.to_string())),
        };

        if version != "00"
            || trace_id.len() != 32
            || span_id.len() != 16
            || flags.len() != 2
            || !is_lower_hex(trace_id)
            || !is_lower_hex(span_id)
        {
            return Err(TraceParseError(value.to_string()));
        }

        let trace_flags = u8::from_str_radix(flags, 16)
            .map_err(|_| TraceParseError(value.to_string()))?;

        Ok(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_span_id: None,
            trace_flags,
        })
    }
}

/// Generate a 16-lowercase-hex span id from UUID entropy.
fn new_span_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..16].to_string()
}

fn is_lower_hex(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// One entry in the write-once diagnostic checkpoint log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Dotted checkpoint name, e.g. `sequential.step_0.start`.
    pub name: String,
    /// When the checkpoint was written.
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Identity, metadata, and diagnostics for one logical request.
///
/// Created once at the boundary, threaded through the whole primitive graph,
/// and discarded when the root call returns. Mutation is limited to span
/// updates and checkpoint appends; everything else is read-only after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Stable across the whole request.
    pub correlation_id: String,
    /// Optional owning workflow identity.
    pub workflow_id: Option<String>,
    /// W3C trace identity for this execution.
    pub trace: TraceContext,
    /// Caller-supplied ordered metadata, read by router/condition functions.
    pub metadata: BTreeMap<String, String>,
    /// Append-only diagnostic log of (name, timestamp) pairs.
    pub checkpoints: Vec<Checkpoint>,
    /// Cooperative cancellation signal, checked at suspension points.
    #[serde(skip, default)]
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Create a root context for a new request.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            workflow_id: None,
            trace: TraceContext::new_root(),
            metadata: BTreeMap::new(),
            checkpoints: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach a workflow id.
    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Derive a child context for a parallel branch.
    ///
    /// Correlation id, trace id, and metadata are copied by value; the child
    /// gets a fresh span whose parent is this context's current span, and an
    /// empty checkpoint log of its own. The cancellation token is shared so
    /// an outer timeout reaches every branch.
    pub fn child(&self) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            workflow_id: self.workflow_id.clone(),
            trace: self.trace.child(),
            metadata: self.metadata.clone(),
            checkpoints: Vec::new(),
            cancellation: self.cancellation.clone(),
        }
    }

    /// Append a named checkpoint with the current timestamp.
    pub fn checkpoint(&mut self, name: impl Into<String>) {
        self.checkpoints.push(Checkpoint {
            name: name.into(),
            at: Utc::now(),
        });
    }

    /// Merge a finished child's checkpoint log into this context.
    pub fn absorb(&mut self, child: ExecutionContext) {
        self.checkpoints.extend(child.checkpoints);
    }

    /// Whether cancellation has been requested for this execution.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Names of all checkpoints written so far, in order.
    pub fn checkpoint_names(&self) -> Vec<&str> {
        self.checkpoints.iter().map(|c| c.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
