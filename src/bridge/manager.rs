//! Watch-driven controller manager
//!
//! One named controller per reconcilable kind, driven by the kube
//! controller runtime over dynamic objects. The runtime distributes change
//! events onto its worker pool and serializes reconciliation per object
//! key; this module only maps between the runtime's actions and the crate's
//! reconciliation outcomes.

use std::sync::Arc;

use futures::StreamExt;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::reconcile::{Reconcile, ReconcileOutcome, ReconcileRequest};

fn to_action(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
    }
}

// =============================================================================
// Named Controller
// =============================================================================

struct ControllerCtx {
    reconciler: Arc<dyn Reconcile>,
}

/// One watch-driven controller, bound to a kind's wire descriptor and
/// reconciler
#[derive(Clone)]
pub struct NamedController {
    name: String,
    client: Client,
    resource: ApiResource,
    reconciler: Arc<dyn Reconcile>,
}

impl NamedController {
    pub fn new(
        name: impl Into<String>,
        client: Client,
        resource: ApiResource,
        reconciler: Arc<dyn Reconcile>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            resource,
            reconciler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drive the controller until its watch stream ends or `shutdown` fires.
    ///
    /// Reconciliation errors are logged and requeued by the runtime; they
    /// never terminate the controller.
    async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.resource);
        let ctx = Arc::new(ControllerCtx {
            reconciler: self.reconciler.clone(),
        });

        info!(controller = %self.name, kind = %self.resource.kind, "starting controller");

        let mut stream = Controller::new_with(api, watcher::Config::default(), self.resource.clone())
            .run(Self::reconcile_object, Self::requeue_on_error, ctx)
            .boxed();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                item = stream.next() => match item {
                    Some(Ok((obj, _action))) => {
                        debug!(controller = %self.name, object = %obj.name, "reconciled");
                    }
                    Some(Err(err)) => {
                        warn!(controller = %self.name, error = %err, "reconciliation failed");
                    }
                    None => break,
                },
            }
        }

        info!(controller = %self.name, "controller stopped");
        Ok(())
    }

    async fn reconcile_object(
        obj: Arc<DynamicObject>,
        ctx: Arc<ControllerCtx>,
    ) -> std::result::Result<Action, Error> {
        let req = ReconcileRequest::new(obj.namespace().unwrap_or_default(), obj.name_any());
        let outcome = ctx.reconciler.reconcile(req).await?;
        Ok(to_action(outcome))
    }

    fn requeue_on_error(_obj: Arc<DynamicObject>, err: &Error, ctx: Arc<ControllerCtx>) -> Action {
        to_action(ctx.reconciler.error_outcome(err))
    }
}

// =============================================================================
// Controller Manager
// =============================================================================

/// Owns all registered controllers for the bridge's process lifetime
#[derive(Default)]
pub struct ControllerManager {
    controllers: Vec<NamedController>,
}

impl ControllerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named controller. Names must be unique.
    pub fn register(&mut self, controller: NamedController) -> Result<()> {
        if self.controllers.iter().any(|c| c.name == controller.name) {
            return Err(Error::ControllerRegistration {
                name: controller.name,
                reason: "a controller with this name is already registered".into(),
            });
        }
        self.controllers.push(controller);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Controller names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.controllers.iter().map(|c| c.name()).collect()
    }

    /// Run every controller until shutdown or the first terminal error.
    ///
    /// A terminal error cancels the remaining controllers and is propagated
    /// to the caller.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        if self.controllers.is_empty() {
            shutdown.cancelled().await;
            return Ok(());
        }

        let stop = shutdown.child_token();
        let mut tasks = JoinSet::new();
        for controller in &self.controllers {
            let controller = controller.clone();
            let stop = stop.clone();
            tasks.spawn(async move { controller.run(stop).await });
        }

        let mut terminal: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|err| Error::Internal(format!("controller task panicked: {}", err)));
            if let Err(err) | Ok(Err(err)) = result {
                if terminal.is_none() {
                    terminal = Some(err);
                    stop.cancel();
                }
            }
        }

        match terminal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
