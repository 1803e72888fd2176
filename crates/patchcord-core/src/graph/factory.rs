//! Module construction and teardown.

use std::rc::Rc;

use crate::deferred::Deferred;
use crate::server::AudioServer;

use super::module::Module;
use super::template::ModuleTemplate;

/// Builds modules from templates and releases them.
///
/// The canvas only asks the factory for the module object; bus and instance
/// allocation happen afterwards on the canvas side.
pub trait ModuleFactory {
    /// Builds a module for `template`.
    fn create_instance(&self, template: &ModuleTemplate) -> Deferred<Module>;

    /// Releases a module that has already been detached from the graph.
    fn destroy_instance(&self, module: Module) -> Deferred<()>;
}

/// Factory that builds modules straight from their template and frees the
/// server instance on destroy.
pub struct TemplateFactory {
    server: Rc<dyn AudioServer>,
}

impl TemplateFactory {
    /// Creates a factory that releases instances on `server`.
    pub fn new(server: Rc<dyn AudioServer>) -> Self {
        Self { server }
    }
}

impl ModuleFactory for TemplateFactory {
    fn create_instance(&self, template: &ModuleTemplate) -> Deferred<Module> {
        Deferred::resolved(Module::from_template(template))
    }

    fn destroy_instance(&self, module: Module) -> Deferred<()> {
        match module.instance() {
            Some(instance) => {
                tracing::debug!(%instance, template = module.template(), "factory_destroy");
                self.server.destroy_instance(instance)
            }
            None => Deferred::resolved(()),
        }
    }
}
