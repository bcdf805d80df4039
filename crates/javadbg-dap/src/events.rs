//! Forwarding of debuggee events to the client.

use std::sync::Arc;

use javadbg_vm::{DebuggeeSession, VmEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::context::{SessionContext, ThrownException};
use crate::dap::messages::Event;

/// Maps one debuggee event to the notification the client sees.
pub fn notification_for(event: &VmEvent) -> Option<Event> {
    match *event {
        VmEvent::VmStart => None,
        VmEvent::VmDeath => Some(Event::exited(0)),
        VmEvent::VmDisconnect => Some(Event::terminated()),
        VmEvent::ThreadStart { thread_id } => Some(Event::thread("started", thread_id)),
        VmEvent::ThreadDeath { thread_id } => Some(Event::thread("exited", thread_id)),
        VmEvent::Breakpoint { thread_id } => Some(Event::stopped("breakpoint", thread_id, false)),
        VmEvent::StepComplete { thread_id } => Some(Event::stopped("step", thread_id, false)),
        VmEvent::Exception { thread_id, .. } => {
            Some(Event::stopped("exception", thread_id, false))
        }
    }
}

/// Subscribes to `session` and spawns the task that forwards its events.
///
/// The subscription is taken before this function returns, so events emitted
/// by a subsequent `start` are never missed.
pub fn spawn_event_task(
    context: Arc<SessionContext>,
    session: &Arc<dyn DebuggeeSession>,
) -> JoinHandle<()> {
    let mut events = session.subscribe_events();
    let shutdown = context.server().shutdown_token();

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                received = events.recv() => received,
            };

            let event = match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "javadbg.vm", skipped, "debuggee event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => VmEvent::VmDisconnect,
            };
            tracing::debug!(target: "javadbg.vm", ?event, "debuggee event");

            // The session is gone before the client learns about it. After a
            // death the stream stays open for the disconnect that follows.
            let disconnected = event == VmEvent::VmDisconnect;
            if disconnected || event == VmEvent::VmDeath {
                context.end_session();
            }
            match &event {
                VmEvent::Exception {
                    thread_id,
                    exception,
                    uncaught,
                } => context.record_exception(
                    *thread_id,
                    ThrownException {
                        exception: exception.clone(),
                        uncaught: *uncaught,
                    },
                ),
                VmEvent::ThreadDeath { thread_id } => context.clear_exceptions(Some(*thread_id)),
                _ => {}
            }

            if let Some(notification) = notification_for(&event) {
                if let Err(err) = context.sender().send_event(notification).await {
                    tracing::debug!(target: "javadbg.vm", error = %err, "client went away");
                    return;
                }
            }
            if disconnected {
                return;
            }
        }
    })
}
