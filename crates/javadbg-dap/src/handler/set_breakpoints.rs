use std::sync::Arc;

use async_trait::async_trait;
use javadbg_vm::DebuggeeSession;

use super::{client_source, unexpected_arguments};
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::breakpoints::{BreakpointRecord, RequestedBreakpoint};
use crate::context::{normalize_drive_letter, SessionContext};
use crate::dap::messages::Event;
use crate::dap::requests::{Arguments, Command, SetBreakpointArguments};
use crate::dap::types::{Breakpoint, Source};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

pub struct SetBreakpointsHandler;

#[async_trait]
impl DebugRequestHandler for SetBreakpointsHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::SetBreakpoints]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::SetBreakpoints(args) = arguments else {
            return Err(unexpected_arguments(command));
        };

        let uri = debugger_uri_for(context, &args.source)?;
        let requested = requested_breakpoints(context, &uri, args);
        let reconciliation =
            context
                .breakpoints()
                .set_breakpoints(&uri, requested, args.source_modified);

        let breakpoints: Vec<Breakpoint> = reconciliation
            .breakpoints
            .iter()
            .map(|record| client_breakpoint(context, record))
            .collect();
        response.set_body(&serde_json::json!({ "breakpoints": breakpoints }));

        // Without a debuggee the records stay pending until launch/attach.
        let Some(session) = context.session() else {
            return Ok(());
        };

        for record in &reconciliation.removed {
            if let Some(request) = record.request {
                if let Err(err) = session.remove_breakpoint(request).await {
                    tracing::warn!(target: "javadbg.dap", id = record.id, error = %err, "failed to remove breakpoint");
                }
            }
        }
        for record in &reconciliation.hit_count_changed {
            if let Some(request) = record.request {
                if let Err(err) = session.set_hit_count(request, record.hit_count).await {
                    tracing::warn!(target: "javadbg.dap", id = record.id, error = %err, "failed to update hit count");
                }
            }
        }
        for record in &reconciliation.condition_changed {
            reinstall(context, session.as_ref(), record).await;
        }

        let context = context.clone();
        let to_install = reconciliation.to_install;
        response.defer_task(async move {
            for record in to_install {
                let Some(installed) = install(&context, session.as_ref(), &record).await else {
                    continue;
                };
                let body = serde_json::to_value(client_breakpoint(&context, &installed))
                    .unwrap_or_default();
                if let Err(err) = context.sender().send_event(Event::breakpoint("new", body)).await {
                    tracing::debug!(target: "javadbg.dap", error = %err, "failed to report breakpoint");
                    return;
                }
            }
        });
        Ok(())
    }
}

fn debugger_uri_for(context: &SessionContext, source: &Source) -> HandlerResult<String> {
    if source.source_reference != 0 {
        if let Some(uri) = context.source_refs().get(source.source_reference) {
            return Ok(uri.clone());
        }
    }

    let path = source.path.as_deref().unwrap_or_default();
    context
        .client_path_to_debugger_uri(&normalize_drive_letter(path))
        .ok_or_else(|| {
            AdapterError::new(
                ErrorCode::SetBreakpointFailure,
                "Failed to setBreakpoint. Reason: the source path cannot be resolved.",
            )
        })
}

fn requested_breakpoints(
    context: &SessionContext,
    uri: &str,
    args: &SetBreakpointArguments,
) -> Vec<RequestedBreakpoint> {
    // (client line, condition, hit condition); `lines` is the legacy form.
    let raw: Vec<(i64, Option<String>, Option<String>)> = if args.breakpoints.is_empty() {
        args.lines.iter().map(|line| (*line, None, None)).collect()
    } else {
        args.breakpoints
            .iter()
            .map(|bp| (bp.line, bp.condition.clone(), bp.hit_condition.clone()))
            .collect()
    };

    let lines: Vec<i64> = raw
        .iter()
        .map(|(line, _, _)| context.client_line_to_debugger(*line))
        .collect();
    let class_names = context.source_lookup().fully_qualified_names(uri, &lines);

    raw.into_iter()
        .zip(lines)
        .enumerate()
        .map(|(index, ((_, condition, hit_condition), line))| RequestedBreakpoint {
            line,
            condition: condition.filter(|condition| !condition.trim().is_empty()),
            hit_count: parse_hit_count(hit_condition.as_deref()),
            class_names: class_names
                .get(index)
                .filter(|name| !name.is_empty())
                .cloned()
                .into_iter()
                .collect(),
        })
        .collect()
}

/// `hitCondition` is a plain positive integer; anything else disables it.
fn parse_hit_count(hit_condition: Option<&str>) -> u32 {
    hit_condition
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(0)
}

pub(crate) fn client_breakpoint(context: &SessionContext, record: &BreakpointRecord) -> Breakpoint {
    Breakpoint {
        id: record.id,
        verified: record.verified,
        line: context.debugger_line_to_client(record.line),
        source: Some(client_source(context, &record.source, None)),
        message: None,
    }
}

/// Installs `record` in the debuggee. Returns the verified record, or `None`
/// when the install failed or the breakpoint was removed meanwhile.
///
/// A later `setBreakpoints` may change the record while the install is in
/// flight; the debuggee request is brought in line with the final record.
pub(crate) async fn install(
    context: &SessionContext,
    session: &dyn DebuggeeSession,
    record: &BreakpointRecord,
) -> Option<BreakpointRecord> {
    let mut spec = record.spec();
    if let Some(current) = context.breakpoints().record(&record.source, record.id) {
        spec.condition = current.condition;
        spec.hit_count = current.hit_count;
    }

    let request = match session.install_breakpoint(&spec).await {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(
                target: "javadbg.dap",
                id = record.id,
                line = record.line,
                error = %err,
                "breakpoint not installed"
            );
            return None;
        }
    };

    let installed = context
        .breakpoints()
        .mark_installed(&record.source, record.id, request);
    let Some(installed) = installed else {
        // Removed by a later setBreakpoints while we were installing.
        if let Err(err) = session.remove_breakpoint(request).await {
            tracing::debug!(target: "javadbg.dap", error = %err, "failed to remove stale breakpoint");
        }
        return None;
    };

    if installed.condition != spec.condition {
        let current = BreakpointRecord {
            class_names: spec.class_names,
            ..installed
        };
        reinstall(context, session, &current).await;
        return context.breakpoints().record(&current.source, current.id);
    }
    if installed.hit_count != spec.hit_count {
        if let Err(err) = session.set_hit_count(request, installed.hit_count).await {
            tracing::warn!(target: "javadbg.dap", id = installed.id, error = %err, "failed to update hit count");
        }
    }
    Some(installed)
}

/// Replaces the debuggee request of `record`, keeping its id.
async fn reinstall(
    context: &SessionContext,
    session: &dyn DebuggeeSession,
    record: &BreakpointRecord,
) {
    if let Some(request) = record.request {
        if let Err(err) = session.remove_breakpoint(request).await {
            tracing::warn!(target: "javadbg.dap", id = record.id, error = %err, "failed to remove breakpoint");
        }
    }
    let request = match session.install_breakpoint(&record.spec()).await {
        Ok(request) => Some(request),
        Err(err) => {
            tracing::debug!(target: "javadbg.dap", id = record.id, error = %err, "breakpoint not reinstalled");
            None
        }
    };
    context
        .breakpoints()
        .replace_request(&record.source, record.id, request);
}

/// Installs every breakpoint recorded before the debuggee existed and queues
/// a `changed` event for each one that verifies.
pub(crate) async fn install_pending(
    context: &SessionContext,
    session: &dyn DebuggeeSession,
    response: &mut ResponseBuilder,
) {
    let pending: Vec<BreakpointRecord> = context
        .breakpoints()
        .all_breakpoints()
        .into_iter()
        .filter(|record| record.request.is_none())
        .collect();

    for mut record in pending {
        // Recorded before `sourcePaths` were known.
        if record.class_names.is_empty() {
            record.class_names = context
                .source_lookup()
                .fully_qualified_names(&record.source, &[record.line])
                .into_iter()
                .filter(|name| !name.is_empty())
                .collect();
        }
        if let Some(installed) = install(context, session, &record).await {
            let body = serde_json::to_value(client_breakpoint(context, &installed))
                .unwrap_or_default();
            response.defer_event(Event::breakpoint("changed", body));
        }
    }
}
