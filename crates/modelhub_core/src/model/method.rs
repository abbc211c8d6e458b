//! Computed, read-only attribute descriptor.

use super::entity::Instance;
use crate::error::RuntimeResult;
use crate::registry::Registry;
use crate::value::Value;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub type MethodFn = Rc<dyn Fn(&Registry, &Instance) -> RuntimeResult<Value>>;

#[derive(Clone)]
pub struct Method {
    name: String,
    private: bool,
    on_lazy: bool,
    function: MethodFn,
}

impl Debug for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("private", &self.private)
            .field("on_lazy", &self.on_lazy)
            .finish_non_exhaustive()
    }
}

impl Method {
    pub fn new(
        name: impl Into<String>,
        function: impl Fn(&Registry, &Instance) -> RuntimeResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            private: false,
            on_lazy: false,
            function: Rc::new(function),
        }
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn on_lazy(mut self) -> Self {
        self.on_lazy = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_on_lazy(&self) -> bool {
        self.on_lazy
    }

    /// Binds the function to `instance`.
    pub fn get(&self, registry: &Registry, instance: &Instance) -> BoundMethod {
        BoundMethod {
            registry: registry.clone(),
            instance: instance.clone(),
            function: Rc::clone(&self.function),
        }
    }
}

/// Zero-argument callable produced by [`Method::get`].
pub struct BoundMethod {
    registry: Registry,
    instance: Instance,
    function: MethodFn,
}

impl BoundMethod {
    pub fn call(&self) -> RuntimeResult<Value> {
        (self.function)(&self.registry, &self.instance)
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}
