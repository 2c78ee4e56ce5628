use std::collections::HashMap;
use std::sync::Arc;

use super::base::Tool;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::ToolSpec;

/// Tools by name, listed in registration order.
///
/// Registering a name twice replaces the earlier tool in place.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, returning the one it replaced if the name was taken
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.spec().name;
        match self.index.get(&name) {
            Some(&position) => Some(std::mem::replace(&mut self.tools[position], tool)),
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = ToolRegistry::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

/// The registry a single run dispatches through: the shared static tools
/// plus whatever the run registers, which shadows static tools by name.
#[derive(Clone)]
pub struct EffectiveRegistry {
    statics: Arc<ToolRegistry>,
    dynamic: ToolRegistry,
}

impl EffectiveRegistry {
    pub fn new(statics: Arc<ToolRegistry>) -> Self {
        Self {
            statics,
            dynamic: ToolRegistry::new(),
        }
    }

    pub fn register_dynamic(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        if self.statics.contains(&name) {
            tracing::info!(tool = %name, "dynamic tool shadows a static tool");
        }
        if self.dynamic.register(tool).is_some() {
            tracing::info!(tool = %name, "dynamic tool replaced an earlier registration");
        }
    }

    /// Dynamic tools first, then static ones
    pub fn resolve(&self, name: &str) -> AgentResult<Arc<dyn Tool>> {
        self.dynamic
            .get(name)
            .or_else(|| self.statics.get(name))
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Static specs in order with dynamic replacements in place, then the
    /// dynamic tools that have no static counterpart.
    pub fn effective_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .statics
            .specs()
            .into_iter()
            .map(|spec| match self.dynamic.get(&spec.name) {
                Some(tool) => tool.spec(),
                None => spec,
            })
            .collect();

        specs.extend(
            self.dynamic
                .specs()
                .into_iter()
                .filter(|spec| !self.statics.contains(&spec.name)),
        );
        specs
    }

    pub fn dynamic_names(&self) -> Vec<String> {
        self.dynamic.names()
    }

    pub fn statics(&self) -> &Arc<ToolRegistry> {
        &self.statics
    }
}
