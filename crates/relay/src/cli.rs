use relay_core::event::{Event, Manager, SubscriberInterface, SubscriberKey, SubscriberRecord, SubscriptionSpec};
use relay_core::kernel::Result as KernelResult;
use relay_core::RelayConfig;
use serde_json::{Value, json};

/// Subscriber object backing the command line.
///
/// Its subscriptions come from the `subscriptions` table of the loaded
/// configuration; without one it only logs `bootstrap` and `shutdown`.
#[derive(Debug)]
pub struct ConsoleSubscriber {
    subscriptions: Vec<(String, SubscriptionSpec)>,
}

impl ConsoleSubscriber {
    pub fn from_config(config: &RelayConfig) -> KernelResult<Self> {
        let mut subscriptions = config.subscription_specs()?;
        if subscriptions.is_empty() {
            subscriptions = vec![
                ("bootstrap".to_string(), SubscriptionSpec::from("log")),
                ("shutdown".to_string(), SubscriptionSpec::from("log")),
            ];
        }
        Ok(Self { subscriptions })
    }
}

impl SubscriberInterface for ConsoleSubscriber {
    fn name(&self) -> &str {
        "console"
    }

    fn subscriptions(&self) -> Vec<(String, SubscriptionSpec)> {
        self.subscriptions.clone()
    }

    fn handle(&self, method: &str, event: &mut Event, event_name: &str, manager: &Manager) -> KernelResult<Option<Value>> {
        match method {
            "log" => {
                log::info!("Event '{}' published ({} value(s))", event_name, event.len());
                Ok(None)
            }
            "stop" => {
                log::debug!("Stopping propagation of '{}'", event_name);
                event.stop_propagation();
                Ok(None)
            }
            "reply" => Ok(Some(json!(format!("handled {}", event_name)))),
            "count" => {
                let count = event.get_as::<i64>("count").unwrap_or(0);
                event.set_value("count", count + 1);
                Ok(None)
            }
            "stamp" => {
                event.set_value("depth", manager.dispatch_depth());
                event.set_value("handled_by", self.name());
                Ok(None)
            }
            other => Err(relay_core::event::EventSystemError::UnknownMethod {
                owner: self.name().to_string(),
                method: other.to_string(),
            }
            .into()),
        }
    }
}

/// One line per subscriber, in dispatch order
pub fn describe(event_name: &str, record: &SubscriberRecord) -> String {
    let target = match record.key() {
        SubscriberKey::Method { method, .. } => format!("method '{}'", method),
        SubscriberKey::Callback(_) => "callback".to_string(),
        SubscriberKey::Factory(_) => "closure factory".to_string(),
    };
    let once = if record.only_once { " (once)" } else { "" };
    format!("{}: {} priority={}{}", event_name, target, record.priority, once)
}
