//! Demo binary for grantflow.
//!
//! Runs one request against a scripted host on a tokio runtime. The scripted
//! "user" grants every capability except those passed with `--deny`, and the
//! final outcome is printed to stdout as JSON.
//!
//! ```text
//! grantflow-demo [--config PATH] [--deny CAPABILITY]... [CAPABILITY]...
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use grantflow::capability::names;
use grantflow::{
    ActivationDescriptor, Capability, CoordinatorConfig, GrantStore, HostContext, LaunchError,
    LauncherProvider, PermissionCoordinator, PlatformClassifier, RequestId, SharedGrantStore,
    SpecialLauncher, outcome_channel,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A round trip the scripted host was asked to perform.
#[derive(Debug)]
enum HostEvent {
    Batch {
        request_id: RequestId,
        capabilities: Vec<Capability>,
    },
    Special {
        request_id: RequestId,
        capability: Capability,
    },
}

/// Host that forwards every launch to the scripted user task.
struct ScriptedHost {
    events: mpsc::UnboundedSender<HostEvent>,
}

impl HostContext for ScriptedHost {
    fn is_torn_down(&self) -> bool {
        self.events.is_closed()
    }

    fn launch_batch(
        &self,
        request_id: &RequestId,
        capabilities: &[Capability],
    ) -> Result<(), LaunchError> {
        self.events
            .send(HostEvent::Batch {
                request_id: request_id.clone(),
                capabilities: capabilities.to_vec(),
            })
            .map_err(|_| LaunchError::HostUnavailable("scripted user has exited".into()))
    }
}

impl LauncherProvider for ScriptedHost {
    fn special_launcher(&self, capability: &Capability) -> Option<Arc<dyn SpecialLauncher>> {
        let events = self.events.clone();
        let capability = capability.clone();
        Some(Arc::new(
            move |request_id: &RequestId, activation: &ActivationDescriptor| {
                info!(capability = %capability, action = %activation.action, "opening settings screen");
                events
                    .send(HostEvent::Special {
                        request_id: request_id.clone(),
                        capability: capability.clone(),
                    })
                    .map_err(|_| LaunchError::HostUnavailable("scripted user has exited".into()))
            },
        ))
    }
}

struct Args {
    config: Option<PathBuf>,
    deny: Vec<Capability>,
    capabilities: Vec<Capability>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        deny: Vec::new(),
        capabilities: Vec::new(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--deny" => {
                let name = iter.next().context("--deny needs a capability")?;
                args.deny.push(Capability::from(name));
            }
            "-h" | "--help" => {
                println!(
                    "Usage: grantflow-demo [--config PATH] [--deny CAPABILITY]... [CAPABILITY]..."
                );
                std::process::exit(0);
            }
            other => args.capabilities.push(Capability::from(other)),
        }
    }
    if args.capabilities.is_empty() {
        args.capabilities = grantflow::capability::capabilities([
            names::CAMERA,
            names::RECORD_AUDIO,
            names::SYSTEM_ALERT_WINDOW,
            names::WRITE_SETTINGS,
        ]);
    }
    Ok(args)
}

/// Answer every round trip: grant unless the capability is in `deny`.
async fn scripted_user(
    coordinator: PermissionCoordinator,
    store: SharedGrantStore,
    deny: Vec<Capability>,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            HostEvent::Batch {
                request_id,
                capabilities,
            } => {
                let mut results = HashMap::new();
                {
                    let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
                    for capability in capabilities {
                        let granted = !deny.contains(&capability);
                        if granted {
                            store.grant(capability.clone());
                        }
                        results.insert(capability, granted);
                    }
                }
                coordinator.on_batch_result(&request_id, &results);
            }
            HostEvent::Special {
                request_id,
                capability,
            } => {
                if !deny.contains(&capability) {
                    store
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .grant(capability.clone());
                }
                coordinator.on_special_step_result(&request_id, &capability);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grantflow=info")),
        )
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => CoordinatorConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CoordinatorConfig::default(),
    };
    info!(
        platform_version = config.platform.version,
        app = %config.platform.app_identity,
        "starting demo"
    );

    let store = GrantStore::default_shared();
    let coordinator = PermissionCoordinator::builder(
        store.clone(),
        Arc::new(PlatformClassifier::new(config.platform.version)),
    )
    .with_config(config)
    .build()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let scripted = Arc::new(ScriptedHost { events: tx });
    let host: Arc<dyn HostContext> = scripted.clone();
    let provider: Arc<dyn LauncherProvider> = scripted;

    let user = tokio::spawn(scripted_user(
        coordinator.clone(),
        store.clone(),
        args.deny,
        rx,
    ));

    let request_id = RequestId::generate();
    let handle = coordinator.register_delegate(&request_id, &provider);
    let (callback, outcome) = outcome_channel();
    coordinator.submit_with_id(request_id, &host, args.capabilities, callback);

    let outcome = outcome.await.context("coordinator dropped the request")?;
    coordinator.release_delegate(&handle);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    drop(host);
    drop(provider);
    drop(coordinator);
    user.abort();
    Ok(())
}
