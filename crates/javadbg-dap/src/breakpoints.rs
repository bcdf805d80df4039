//! Per-source breakpoint bookkeeping.
//!
//! The client always sends the complete set of breakpoints for one source.
//! [`BreakpointManager::set_breakpoints`] diffs that set against the previous
//! one: a breakpoint on a line that was already known keeps its id and its
//! verification state; everything else is new. The manager never talks to the
//! debuggee itself. It reports what must be installed, removed or updated and
//! the caller performs those operations asynchronously.

use std::collections::{BTreeMap, HashMap};

use javadbg_vm::{BreakpointRequestId, BreakpointSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRecord {
    /// Client-visible id, stable while the `(source, line)` pair persists.
    pub id: i64,
    /// Source URI in the debugger's convention.
    pub source: String,
    /// Line in the debugger's numbering.
    pub line: i64,
    pub condition: Option<String>,
    pub hit_count: u32,
    pub class_names: Vec<String>,
    pub verified: bool,
    /// Debuggee request backing this breakpoint once installed.
    pub request: Option<BreakpointRequestId>,
}

impl BreakpointRecord {
    pub fn spec(&self) -> BreakpointSpec {
        BreakpointSpec {
            class_names: self.class_names.clone(),
            line: self.line,
            condition: self.condition.clone(),
            hit_count: self.hit_count,
        }
    }
}

/// One breakpoint as requested by the client, already converted to the
/// debugger's line numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedBreakpoint {
    pub line: i64,
    pub condition: Option<String>,
    pub hit_count: u32,
    pub class_names: Vec<String>,
}

/// Outcome of one reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// One record per requested breakpoint, in request order.
    pub breakpoints: Vec<BreakpointRecord>,
    /// Newly created records. Not yet installed.
    pub to_install: Vec<BreakpointRecord>,
    /// Records that are gone and must be uninstalled.
    pub removed: Vec<BreakpointRecord>,
    /// Reused, installed records whose hit count changed.
    pub hit_count_changed: Vec<BreakpointRecord>,
    /// Reused, installed records whose condition changed.
    pub condition_changed: Vec<BreakpointRecord>,
}

#[derive(Debug)]
pub struct BreakpointManager {
    sources: HashMap<String, BTreeMap<i64, BreakpointRecord>>,
    next_id: i64,
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn set_breakpoints(
        &mut self,
        source: &str,
        requested: Vec<RequestedBreakpoint>,
        source_modified: bool,
    ) -> Reconciliation {
        let mut out = Reconciliation::default();
        let mut previous = self.sources.remove(source).unwrap_or_default();
        if source_modified {
            // Line numbers of a modified file no longer mean the same thing.
            out.removed.extend(std::mem::take(&mut previous).into_values());
        }

        let mut current: BTreeMap<i64, BreakpointRecord> = BTreeMap::new();
        for bp in requested {
            if let Some(record) = current.get(&bp.line) {
                // Same line listed twice in one request.
                out.breakpoints.push(record.clone());
                continue;
            }

            let record = match previous.remove(&bp.line) {
                Some(mut record) => {
                    let installed = record.request.is_some();
                    if record.hit_count != bp.hit_count {
                        record.hit_count = bp.hit_count;
                        if installed {
                            out.hit_count_changed.push(record.clone());
                        }
                    }
                    if record.condition != bp.condition {
                        record.condition = bp.condition;
                        if installed {
                            out.condition_changed.push(record.clone());
                        }
                    }
                    record
                }
                None => {
                    let record = BreakpointRecord {
                        id: self.next_id,
                        source: source.to_string(),
                        line: bp.line,
                        condition: bp.condition,
                        hit_count: bp.hit_count,
                        class_names: bp.class_names,
                        verified: false,
                        request: None,
                    };
                    self.next_id += 1;
                    out.to_install.push(record.clone());
                    record
                }
            };
            out.breakpoints.push(record.clone());
            current.insert(record.line, record);
        }

        out.removed.extend(previous.into_values());
        if !current.is_empty() {
            self.sources.insert(source.to_string(), current);
        }
        out
    }

    /// Records a successful installation. Returns the updated record, or
    /// `None` when the breakpoint was removed while the install was running.
    pub fn mark_installed(
        &mut self,
        source: &str,
        id: i64,
        request: BreakpointRequestId,
    ) -> Option<BreakpointRecord> {
        let record = self
            .sources
            .get_mut(source)?
            .values_mut()
            .find(|record| record.id == id)?;
        record.verified = true;
        record.request = Some(request);
        Some(record.clone())
    }

    /// Records that a request was replaced (for example after a condition
    /// change).
    pub fn replace_request(
        &mut self,
        source: &str,
        id: i64,
        request: Option<BreakpointRequestId>,
    ) -> Option<BreakpointRecord> {
        let record = self
            .sources
            .get_mut(source)?
            .values_mut()
            .find(|record| record.id == id)?;
        record.verified = request.is_some();
        record.request = request;
        Some(record.clone())
    }

    /// The current state of breakpoint `id` in `source`.
    pub fn record(&self, source: &str, id: i64) -> Option<BreakpointRecord> {
        self.sources
            .get(source)?
            .values()
            .find(|record| record.id == id)
            .cloned()
    }

    pub fn breakpoints(&self, source: &str) -> Vec<BreakpointRecord> {
        self.sources
            .get(source)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every known breakpoint, ordered by id.
    pub fn all_breakpoints(&self) -> Vec<BreakpointRecord> {
        let mut all: Vec<_> = self
            .sources
            .values()
            .flat_map(|records| records.values().cloned())
            .collect();
        all.sort_by_key(|record| record.id);
        all
    }

    /// Forgets every record. Ids start again at 1.
    pub fn reset(&mut self) {
        self.sources.clear();
        self.next_id = 1;
    }
}
