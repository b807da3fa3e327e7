//! The immutable set of attributes describing the entity producing
//! telemetry, attached to every exported span batch and metric
//! collection.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Key, KeyValue, Value};

/// Well-known resource attribute: the logical service name.
pub const SERVICE_NAME: Key = Key::from_static_str("service.name");
/// Well-known resource attribute: the service version.
pub const SERVICE_VERSION: Key = Key::from_static_str("service.version");
/// Well-known resource attribute: the deployment environment, e.g.
/// `production` or `staging`.
pub const DEPLOYMENT_ENVIRONMENT: Key = Key::from_static_str("deployment.environment");

const DEFAULT_SERVICE_NAME: &str = "unknown_service";

/// An immutable representation of the entity producing telemetry.
///
/// Cheap to clone; the attribute map is shared behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

#[derive(Debug, PartialEq)]
struct ResourceInner {
    attrs: BTreeMap<Key, Value>,
}

impl Resource {
    /// A resource with no attributes.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: BTreeMap::new(),
            }),
        }
    }

    /// Start building a resource. The builder seeds `service.name` with
    /// `unknown_service` until overridden.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    /// Retrieve the value for `key`, if present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.inner.attrs.get(key)
    }

    /// Iterate over attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.inner.attrs.iter()
    }

    /// The number of attributes.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Whether the resource carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Merge `other` into this resource. On key collision the value
    /// from `other` wins.
    pub fn merge(&self, other: &Resource) -> Resource {
        let mut attrs = self.inner.attrs.clone();
        for (k, v) in other.iter() {
            attrs.insert(k.clone(), v.clone());
        }
        Resource {
            inner: Arc::new(ResourceInner { attrs }),
        }
    }
}

impl Default for Resource {
    fn default() -> Self {
        Resource::builder().build()
    }
}

/// Builder for [`Resource`].
#[derive(Debug)]
pub struct ResourceBuilder {
    attrs: BTreeMap<Key, Value>,
}

impl Default for ResourceBuilder {
    fn default() -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert(SERVICE_NAME, Value::from(DEFAULT_SERVICE_NAME));
        ResourceBuilder { attrs }
    }
}

impl ResourceBuilder {
    /// Set the `service.name` attribute.
    pub fn with_service_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.attrs.insert(SERVICE_NAME, Value::String(name.into()));
        self
    }

    /// Set the `service.version` attribute.
    pub fn with_service_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.attrs
            .insert(SERVICE_VERSION, Value::String(version.into()));
        self
    }

    /// Set the `deployment.environment` attribute.
    pub fn with_environment(mut self, environment: impl Into<Cow<'static, str>>) -> Self {
        self.attrs
            .insert(DEPLOYMENT_ENVIRONMENT, Value::String(environment.into()));
        self
    }

    /// Add a single attribute, replacing any previous value for the key.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.attrs.insert(kv.key, kv.value);
        self
    }

    /// Add several attributes at once.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attrs: T) -> Self {
        for kv in attrs {
            self.attrs.insert(kv.key, kv.value);
        }
        self
    }

    /// Finish building the resource.
    pub fn build(self) -> Resource {
        Resource {
            inner: Arc::new(ResourceInner { attrs: self.attrs }),
        }
    }
}
