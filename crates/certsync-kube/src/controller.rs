//! Controller wiring
//!
//! One kube-runtime [`Controller`] per reconciled kind. Each controller is
//! driven by its own reflector-backed watch stream plus a [`ChannelQueue`]
//! receiver, so handlers can ask for another kind to be reconciled without
//! calling into it. Secrets have no controller of their own: their watch only
//! keeps the cache warm and re-delivers the owning Services.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use certsync_core::{ControllerConfig, ServiceIndex};
use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::runtime::controller::Action;
use kube::runtime::reflector;
use kube::runtime::{Controller, WatchStreamExt, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::{KubeError, Result};
use crate::manager::{CertSettings, TLS_SECRET_TYPE};
use crate::reconcile::{Handlers, Stores, WebhookTarget, service_keys};
use crate::store::{ChannelQueue, KubeStore};

/// Watch timeout (seconds); must stay below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// State shared by every reconcile call
pub struct Context {
    handlers: Handlers,
    config: ControllerConfig,
}

impl Context {
    pub fn new(handlers: Handlers, config: ControllerConfig) -> Self {
        Self { handlers, config }
    }
}

/// Delay before a healthy Service is looked at again
///
/// The earlier of the resync interval and the moment its certificate enters
/// the renewal window, never less than one second.
pub fn next_check(until_renewal: Option<Duration>, resync: Duration) -> Duration {
    until_renewal
        .map_or(resync, |until| until.min(resync))
        .max(Duration::from_secs(1))
}

async fn reconcile_service(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action> {
    let secret = ctx.handlers.on_service_change(Some(service.as_ref())).await?;
    Ok(match secret {
        Some(secret) => {
            let until_renewal = ctx.handlers.certs().time_until_renewal(&secret);
            Action::requeue(next_check(until_renewal, ctx.config.resync_interval))
        }
        None => Action::await_change(),
    })
}

async fn reconcile_mutating(
    config: Arc<MutatingWebhookConfiguration>,
    ctx: Arc<Context>,
) -> Result<Action> {
    ctx.handlers.on_mutating_config_change(Some(config.as_ref())).await?;
    Ok(Action::await_change())
}

async fn reconcile_validating(
    config: Arc<ValidatingWebhookConfiguration>,
    ctx: Arc<Context>,
) -> Result<Action> {
    ctx.handlers.on_validating_config_change(Some(config.as_ref())).await?;
    Ok(Action::await_change())
}

async fn reconcile_crd(crd: Arc<CustomResourceDefinition>, ctx: Arc<Context>) -> Result<Action> {
    ctx.handlers.on_crd_change(Some(crd.as_ref())).await?;
    Ok(Action::await_change())
}

fn error_policy<K>(obj: Arc<K>, error: &KubeError, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    error!(
        kind = %K::kind(&()),
        name = %obj.name_any(),
        namespace = ?obj.namespace(),
        "Reconciliation failed: {}",
        error
    );
    Action::requeue(ctx.config.error_requeue)
}

fn log_reconcile_result<T: Debug, E: Debug>(
    controller_name: &'static str,
) -> impl Fn(std::result::Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

fn watch_config() -> watcher::Config {
    watcher::Config::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Apply one watch event of a dependent kind to `index`
///
/// A relist clears the kind's table first, so entries of objects deleted
/// while the watch was down do not survive.
fn apply_event<T: WebhookTarget>(index: &ServiceIndex, event: &watcher::Event<T>) {
    match event {
        watcher::Event::Init => index.clear(T::KIND),
        watcher::Event::InitApply(obj) | watcher::Event::Apply(obj) => {
            index.observe(T::KIND, &obj.object_name(), service_keys(obj))
        }
        watcher::Event::Delete(obj) => index.forget(T::KIND, &obj.object_name()),
        watcher::Event::InitDone => {}
    }
}

/// Watch stream for a dependent kind that keeps `index` in step with the cache
fn dependent_stream<T>(
    api: Api<T>,
    writer: reflector::store::Writer<T>,
    index: Arc<ServiceIndex>,
) -> impl Stream<Item = std::result::Result<T, watcher::Error>> + Send + 'static
where
    T: WebhookTarget + Resource<DynamicType = ()> + Debug + DeserializeOwned,
{
    watcher(api, watch_config())
        .default_backoff()
        .reflect(writer)
        .inspect_ok(move |event| apply_event(&index, event))
        .applied_objects()
}

fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Build the combined controller future; it finishes on SIGINT/SIGTERM
pub fn build_controllers(client: Client, config: ControllerConfig) -> impl Future<Output = ()> + Send {
    let namespace = config.namespace.as_deref();
    let services_api: Api<Service> = scoped_api(client.clone(), namespace);
    let secrets_api: Api<Secret> = scoped_api(client.clone(), namespace);
    let mutating_api: Api<MutatingWebhookConfiguration> = Api::all(client.clone());
    let validating_api: Api<ValidatingWebhookConfiguration> = Api::all(client.clone());
    let crds_api: Api<CustomResourceDefinition> = Api::all(client.clone());

    let (services_cache, services_writer) = reflector::store::<Service>();
    let (secrets_cache, secrets_writer) = reflector::store::<Secret>();
    let (mutating_cache, mutating_writer) = reflector::store::<MutatingWebhookConfiguration>();
    let (validating_cache, validating_writer) = reflector::store::<ValidatingWebhookConfiguration>();
    let (crds_cache, crds_writer) = reflector::store::<CustomResourceDefinition>();

    let index = Arc::new(ServiceIndex::new());
    let (queue, receivers) = ChannelQueue::new();

    let stores = Stores {
        services: Arc::new(KubeStore::namespaced(client.clone(), services_cache.clone())),
        secrets: Arc::new(KubeStore::namespaced(client.clone(), secrets_cache)),
        mutating: Arc::new(KubeStore::cluster(client.clone(), mutating_cache.clone())),
        validating: Arc::new(KubeStore::cluster(client.clone(), validating_cache.clone())),
        crds: Arc::new(KubeStore::cluster(client, crds_cache.clone())),
    };
    let handlers = Handlers::new(
        stores,
        CertSettings::from(&config),
        index.clone(),
        Arc::new(queue),
    );
    let ctx = Arc::new(Context::new(handlers, config));

    let services_stream = watcher(services_api, watch_config())
        .default_backoff()
        .reflect(services_writer)
        .applied_objects();
    let services_ctrl = Controller::for_stream(services_stream, services_cache)
        .reconcile_on(receivers.services)
        .shutdown_on_signal()
        .run(reconcile_service, error_policy, ctx.clone())
        .for_each(log_reconcile_result("Service"));

    let secrets_ctx = ctx.clone();
    let secrets_watch = watcher(secrets_api, watch_config().fields(&format!("type={TLS_SECRET_TYPE}")))
        .default_backoff()
        .reflect(secrets_writer)
        .applied_objects()
        .for_each(move |secret| {
            match secret {
                Ok(secret) => secrets_ctx.handlers.on_secret_change(Some(&secret)),
                Err(e) => error!(error = ?e, "Secret watch error"),
            }
            std::future::ready(())
        });

    let mutating_ctrl = Controller::for_stream(
        dependent_stream(mutating_api, mutating_writer, index.clone()),
        mutating_cache,
    )
    .reconcile_on(receivers.mutating)
    .shutdown_on_signal()
    .run(reconcile_mutating, error_policy, ctx.clone())
    .for_each(log_reconcile_result("MutatingWebhookConfiguration"));

    let validating_ctrl = Controller::for_stream(
        dependent_stream(validating_api, validating_writer, index.clone()),
        validating_cache,
    )
    .reconcile_on(receivers.validating)
    .shutdown_on_signal()
    .run(reconcile_validating, error_policy, ctx.clone())
    .for_each(log_reconcile_result("ValidatingWebhookConfiguration"));

    let crds_ctrl = Controller::for_stream(dependent_stream(crds_api, crds_writer, index), crds_cache)
        .reconcile_on(receivers.crds)
        .shutdown_on_signal()
        .run(reconcile_crd, error_policy, ctx)
        .for_each(log_reconcile_result("CustomResourceDefinition"));

    info!("- Service controller");
    info!("- MutatingWebhookConfiguration controller");
    info!("- ValidatingWebhookConfiguration controller");
    info!("- CustomResourceDefinition controller");

    // The secret watch never ends on its own; stop it with the controllers.
    let controllers = futures::future::join4(services_ctrl, mutating_ctrl, validating_ctrl, crds_ctrl);
    async move {
        tokio::select! {
            _ = controllers => {}
            _ = secrets_watch => {}
        }
    }
}

/// Run all controllers until shutdown
pub async fn run(client: Client, config: ControllerConfig) -> Result<()> {
    config.validate()?;
    info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        "Starting certsync controllers"
    );

    build_controllers(client, config).await;

    info!("Controllers stopped");
    Ok(())
}
