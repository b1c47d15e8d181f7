//! Re-delivery queues

use certsync_core::DependentKind;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::runtime::reflector::ObjectRef;
use std::sync::Mutex;

use super::{Enqueue, ObjectKey};

/// Feeds controller trigger streams
///
/// Each kind gets an unbounded channel; the receiving ends are handed to
/// `Controller::reconcile_on`, which deduplicates pending keys.
#[derive(Clone)]
pub struct ChannelQueue {
    services: UnboundedSender<ObjectRef<Service>>,
    mutating: UnboundedSender<ObjectRef<MutatingWebhookConfiguration>>,
    validating: UnboundedSender<ObjectRef<ValidatingWebhookConfiguration>>,
    crds: UnboundedSender<ObjectRef<CustomResourceDefinition>>,
}

/// Receiving ends of a [`ChannelQueue`]
pub struct QueueReceivers {
    pub services: UnboundedReceiver<ObjectRef<Service>>,
    pub mutating: UnboundedReceiver<ObjectRef<MutatingWebhookConfiguration>>,
    pub validating: UnboundedReceiver<ObjectRef<ValidatingWebhookConfiguration>>,
    pub crds: UnboundedReceiver<ObjectRef<CustomResourceDefinition>>,
}

impl ChannelQueue {
    pub fn new() -> (Self, QueueReceivers) {
        let (services, services_rx) = unbounded();
        let (mutating, mutating_rx) = unbounded();
        let (validating, validating_rx) = unbounded();
        let (crds, crds_rx) = unbounded();

        (
            Self {
                services,
                mutating,
                validating,
                crds,
            },
            QueueReceivers {
                services: services_rx,
                mutating: mutating_rx,
                validating: validating_rx,
                crds: crds_rx,
            },
        )
    }
}

impl Enqueue for ChannelQueue {
    fn enqueue(&self, key: ObjectKey) {
        // A closed channel means the controller is shutting down.
        let sent = match &key {
            ObjectKey::Service { namespace, name } => self
                .services
                .unbounded_send(ObjectRef::new(name).within(namespace))
                .is_ok(),
            ObjectKey::Dependent { kind, name } => match kind {
                DependentKind::MutatingWebhookConfiguration => {
                    self.mutating.unbounded_send(ObjectRef::new(name)).is_ok()
                }
                DependentKind::ValidatingWebhookConfiguration => {
                    self.validating.unbounded_send(ObjectRef::new(name)).is_ok()
                }
                DependentKind::CustomResourceDefinition => {
                    self.crds.unbounded_send(ObjectRef::new(name)).is_ok()
                }
            },
        };

        if sent {
            tracing::debug!("Enqueued {}", key);
        } else {
            tracing::debug!("Dropped {}: queue closed", key);
        }
    }
}

/// Records enqueued keys for testing assertions
#[derive(Debug, Default)]
pub struct RecordingQueue {
    keys: Mutex<Vec<ObjectKey>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys enqueued so far, in order
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.keys.lock().unwrap().clone()
    }

    /// Drain recorded keys
    pub fn take(&self) -> Vec<ObjectKey> {
        std::mem::take(&mut *self.keys.lock().unwrap())
    }
}

impl Enqueue for RecordingQueue {
    fn enqueue(&self, key: ObjectKey) {
        self.keys.lock().unwrap().push(key);
    }
}
