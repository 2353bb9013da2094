//! Capability registry the plugins decorate.
//!
//! A plugin names the plugins it depends on and the decorators it needs;
//! [`Host::register`] checks both before the plugin's setup runs, so a
//! misconfigured application fails at startup rather than on first use.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::PluginError;

type Decoration = Arc<dyn Any + Send + Sync>;

pub trait Plugin
{
    type Options;

    fn name(&self) -> &'static str;

    /// Plugins that must be registered first.
    fn dependencies(&self) -> &'static [&'static str]
    {
        &[]
    }

    /// Decorators that must already be present on the host.
    fn decorators(&self) -> &'static [&'static str]
    {
        &[]
    }

    fn register(&self, host: &mut Host, opts: Self::Options)
        -> Result<(), PluginError>;
}

#[derive(Default)]
pub struct Host
{
    decorations: HashMap<String, Decoration>,
    plugins: Vec<&'static str>,
}

impl Host
{
    pub fn new() -> Host
    {
        Host::default()
    }

    /// Attaches `value` under `name`. A later decoration with the same
    /// name replaces the earlier one.
    pub fn decorate<T>(&mut self, name: &str, value: T) -> &mut Self
        where T: Any + Send + Sync
    {
        if self.decorations.insert(name.to_string(), Arc::new(value)).is_some() {
            tracing::debug!(decorator = name, "decorator replaced");
        }
        self
    }

    pub fn has_decorator(&self, name: &str) -> bool
    {
        self.decorations.contains_key(name)
    }

    pub fn decorator<T>(&self, name: &str) -> Result<Arc<T>, PluginError>
        where T: Any + Send + Sync
    {
        let value = self.decorations.get(name)
            .ok_or_else(|| PluginError::UnknownDecorator(name.to_string()))?;
        value.clone().downcast::<T>()
            .map_err(|_| PluginError::DecoratorType(name.to_string()))
    }

    pub fn has_plugin(&self, name: &str) -> bool
    {
        self.plugins.iter().any(|p| *p == name)
    }

    pub fn plugins(&self) -> &[&'static str]
    {
        &self.plugins
    }

    pub fn register<P: Plugin>(&mut self, plugin: P, opts: P::Options)
        -> Result<&mut Self, PluginError>
    {
        let name = plugin.name();
        for dependency in plugin.dependencies() {
            if !self.has_plugin(dependency) {
                return Err(PluginError::MissingDependency {
                    plugin: name.to_string(),
                    dependency: dependency.to_string(),
                });
            }
        }
        for decorator in plugin.decorators() {
            if !self.has_decorator(decorator) {
                return Err(PluginError::MissingDecorator {
                    plugin: name.to_string(),
                    decorator: decorator.to_string(),
                });
            }
        }
        plugin.register(self, opts)?;
        self.plugins.push(name);
        tracing::info!(plugin = name, "plugin registered");
        Ok(self)
    }
}
