use std::sync::Arc;

use serde_json::json;

use crate::config::RelayConfig;
use crate::event::{Event, EventComponent, LifecycleEvent, Manager, Payload, Subject};
use crate::kernel::component::KernelComponent;
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::promise::{QueueComponent, TaskQueue};

/// Main application struct owning the event manager and the task queue
pub struct Application {
    config: RelayConfig,
    manager: Arc<Manager>,
    queue: Arc<TaskQueue>,
    // Started in order, stopped in reverse
    components: Vec<Arc<dyn KernelComponent>>,
    initialized: bool,
}

impl Application {
    /// Creates a new application instance with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Creates a new application instance from `config`.
    ///
    /// The application gets its own [`TaskQueue`], so promises built for it
    /// should use [`Application::queue`].
    pub fn with_config(config: RelayConfig) -> Self {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);

        let manager = Arc::new(Manager::new());
        let queue = Arc::new(TaskQueue::new());
        if !config.drain_on_shutdown {
            queue.disable_shutdown();
        }

        let components: Vec<Arc<dyn KernelComponent>> = vec![
            Arc::new(QueueComponent::new(queue.clone())),
            Arc::new(EventComponent::new(manager.clone())),
        ];

        Self {
            config,
            manager,
            queue,
            components,
            initialized: false,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Returns whether the application has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initializes and starts every component, then publishes `bootstrap`.
    pub async fn run(&mut self) -> Result<Event> {
        if self.initialized {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::RunPreCheck,
                component_name: None,
                message: "Application already initialized".to_string(),
                source: None,
            });
        }

        self.initialize().await?;
        self.start().await?;
        self.initialized = true;
        log::info!("Application initialized and started successfully.");

        let mut payload = Payload::new();
        payload.insert("app".to_string(), json!(constants::APP_NAME));
        payload.insert("version".to_string(), json!(constants::APP_VERSION));
        self.publish(LifecycleEvent::Bootstrap.name(), None, payload)
    }

    /// Publishes `event_name` with the configured defaults beneath `payload`.
    pub fn publish(&self, event_name: &str, subject: Option<Subject>, payload: Payload) -> Result<Event> {
        let mut values: Payload = self.config.defaults.clone();
        values.extend(payload);
        self.manager.publish(event_name, subject, values)
    }

    /// Publishes a prepared event; configured defaults fill keys it lacks.
    pub fn publish_event(&self, event_name: &str, mut event: Event) -> Result<Event> {
        for (key, value) in &self.config.defaults {
            if !event.has_raw_value(key) {
                event.set_value(key, value.clone());
            }
        }
        self.manager.publish_event(event_name, event)
    }

    async fn initialize(&mut self) -> Result<()> {
        log::info!("Initializing components...");
        for component in &self.components {
            log::debug!("Initializing component: {}", component.name());
            component
                .initialize()
                .await
                .map_err(|e| lifecycle_error(KernelLifecyclePhase::Initialize, component.name(), e))?;
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        log::info!("Starting components...");
        for component in &self.components {
            log::debug!("Starting component: {}", component.name());
            component
                .start()
                .await
                .map_err(|e| lifecycle_error(KernelLifecyclePhase::Start, component.name(), e))?;
        }
        Ok(())
    }

    /// Stops components in reverse order: `shutdown` is published before
    /// the task queue drains.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.initialized {
            log::debug!("Shutdown requested for an application that is not running");
            return Ok(());
        }
        log::info!("Shutting down components...");
        for component in self.components.iter().rev() {
            log::debug!("Stopping component: {}", component.name());
            if let Err(e) = component.stop().await {
                log::error!("Error stopping component {}: {}", component.name(), e);
                return Err(lifecycle_error(KernelLifecyclePhase::Shutdown, component.name(), e));
            }
        }
        self.initialized = false;
        log::info!("Component shutdown complete.");
        Ok(())
    }
}

fn lifecycle_error(phase: KernelLifecyclePhase, component: &str, source: Error) -> Error {
    let message = match &phase {
        KernelLifecyclePhase::Shutdown => "Component failed to stop".to_string(),
        other => format!("Component failed during {}", other),
    };
    Error::KernelLifecycleError {
        phase,
        component_name: Some(component.to_string()),
        message,
        source: Some(Box::new(source)),
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("components", &self.components)
            .field("initialized", &self.initialized)
            .finish()
    }
}

