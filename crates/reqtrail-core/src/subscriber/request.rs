//! Maps request-lifecycle notifications onto aggregator operations.

use super::notification::{Notification, NotificationKind};
use crate::aggregator::EventAggregator;
use crate::record::{CacheEntry, FieldValue, Fields};
use crate::registry::ContextId;
use crate::utils::config::INTERNAL_PARAMS;
use crate::utils::error::AggregatorError;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

const CONTROLLER_SPAN: &str = "controller";
const SEND_DATA_SPAN: &str = "send_data";
const SEND_FILE_SPAN: &str = "send_file";

/// Feeds one aggregator from a stream of framework notifications
///
/// `handle` never fails: problems are logged by the aggregator (and here at
/// `debug!`), and the request being observed carries on.
#[derive(Clone)]
pub struct RequestSubscriber {
    aggregator: Arc<EventAggregator>,
}

impl RequestSubscriber {
    pub fn new(aggregator: Arc<EventAggregator>) -> Self {
        Self { aggregator }
    }

    pub fn aggregator(&self) -> &Arc<EventAggregator> {
        &self.aggregator
    }

    /// Apply one notification
    pub fn handle(&self, notification: &Notification) {
        if let Err(e) = self.apply(notification.context, &notification.event) {
            debug!("Ignored {}: {}", notification, e);
        }
    }

    fn apply(&self, context: ContextId, event: &NotificationKind) -> Result<(), AggregatorError> {
        let aggregator = self.aggregator.as_ref();

        match event {
            NotificationKind::RequestStarted => aggregator.begin(context),
            NotificationKind::StartProcessing {
                controller,
                action,
                format,
                params,
            } => {
                aggregator.set_field(context, "controller", controller.as_str())?;
                aggregator.set_field(context, "action", action.as_str())?;
                if let Some(format) = format {
                    aggregator.set_field(context, "format", format.as_str())?;
                }
                if let Some(params) = request_parameters(params) {
                    aggregator.set_field(context, "parameters", params)?;
                }
                aggregator.start_span(context, CONTROLLER_SPAN).map(drop)
            }
            NotificationKind::ProcessAction {
                status,
                view_runtime,
                db_runtime,
            } => {
                // A halted request may never have opened the span
                let span = aggregator.finish_span(context, CONTROLLER_SPAN);
                if let Some(status) = status {
                    aggregator.set_field(context, "status", *status)?;
                }
                for (name, runtime) in [("view_runtime", view_runtime), ("db_runtime", db_runtime)] {
                    if let Some(duration) = runtime.and_then(millis_to_duration) {
                        aggregator.set_field(context, name, duration)?;
                    }
                }
                span.map(drop)
            }
            NotificationKind::HaltedCallback { filter } => aggregator.record_halt(context, filter),
            NotificationKind::RedirectTo { location } => {
                aggregator.set_field(context, "redirect_to", location.as_str())
            }
            NotificationKind::SendDataStarted { filename } => {
                aggregator.set_field(context, SEND_DATA_SPAN, filename.as_str())?;
                aggregator.start_span(context, SEND_DATA_SPAN).map(drop)
            }
            NotificationKind::SendDataFinished => {
                aggregator.finish_span(context, SEND_DATA_SPAN).map(drop)
            }
            NotificationKind::SendFileStarted { path } => {
                aggregator.set_field(context, SEND_FILE_SPAN, path.as_str())?;
                aggregator.start_span(context, SEND_FILE_SPAN).map(drop)
            }
            NotificationKind::SendFileFinished => {
                aggregator.finish_span(context, SEND_FILE_SPAN).map(drop)
            }
            NotificationKind::Cache {
                operation,
                key_or_path,
            } => aggregator.record_cache(context, &CacheEntry::new(*operation, key_or_path.as_str())),
            NotificationKind::Exception { kind, rescued } => {
                aggregator.record_exception(context, kind, *rescued)
            }
            NotificationKind::RequestFinished => aggregator.end(context).map(drop),
        }
    }
}

/// Request parameters minus the ones the framework adds itself
///
/// Returns `None` when nothing is left, so parameter-less requests carry no
/// `parameters` field at all.
fn request_parameters(params: &serde_json::Value) -> Option<Fields> {
    let FieldValue::Map(mut fields) = FieldValue::from(params.clone()) else {
        if !params.is_null() {
            warn!("Ignoring non-object request parameters: {}", params);
        }
        return None;
    };

    fields.retain(|name, _| !INTERNAL_PARAMS.contains(&name.as_str()));
    (!fields.is_empty()).then_some(fields)
}

fn millis_to_duration(millis: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(millis / 1000.0).ok()
}
