use std::sync::Arc;

use async_trait::async_trait;
use javadbg_vm::{FrameInfo, FrameRef};
use serde_json::json;

use super::{client_source, require_session, unexpected_arguments};
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{PoolObject, SessionContext};
use crate::dap::requests::{Arguments, Command};
use crate::dap::types::{Source, StackFrame};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

pub struct StackTraceHandler;

#[async_trait]
impl DebugRequestHandler for StackTraceHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::StackTrace]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::StackTrace(args) = arguments else {
            return Err(unexpected_arguments(command));
        };
        let session = require_session(context)?;

        let frames = session.frames(args.thread_id).await.map_err(|err| {
            AdapterError::vm(ErrorCode::GetStackTraceFailure, "Failed to get stack frames", err)
        })?;
        let total = frames.len();

        let start = args.start_frame.unwrap_or(0);
        let levels = args.levels.unwrap_or(0);
        let mut stack_frames = Vec::new();
        if start >= 0 && levels >= 0 {
            let start = usize::try_from(start).unwrap_or(usize::MAX).min(total);
            let end = match usize::try_from(levels).unwrap_or(usize::MAX) {
                0 => total,
                levels => start.saturating_add(levels).min(total),
            };
            for (depth, info) in frames.iter().enumerate().take(end).skip(start) {
                let frame = FrameRef {
                    thread_id: args.thread_id,
                    depth,
                };
                stack_frames.push(stack_frame(context, frame, info));
            }
        }

        response.set_body(&json!({
            "stackFrames": stack_frames,
            "totalFrames": total,
        }));
        Ok(())
    }
}

fn stack_frame(context: &SessionContext, frame: FrameRef, info: &FrameInfo) -> StackFrame {
    let options = context.format_options(false);
    let type_name = context
        .formatter()
        .type_to_string(&info.declaring_type, &options);

    StackFrame {
        id: context.add_handle(PoolObject::Frame(frame)),
        name: format!("{type_name}.{}", info.method_name),
        source: frame_source(context, info),
        line: if info.line > 0 {
            context.debugger_line_to_client(info.line)
        } else {
            0
        },
        column: 0,
    }
}

fn frame_source(context: &SessionContext, info: &FrameInfo) -> Option<Source> {
    let uri = info.source_path.as_deref().and_then(|relative| {
        context
            .source_lookup()
            .source_file_uri(&info.declaring_type, relative)
    });
    match uri {
        Some(uri) => Some(client_source(context, &uri, info.source_name.clone())),
        None => info.source_name.clone().map(|name| Source {
            name: Some(name),
            path: None,
            source_reference: 0,
        }),
    }
}
