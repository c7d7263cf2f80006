// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use orka_model::ToolSchema;
use tracing::warn;

use crate::Tool;

/// Central registry mapping tool name to implementation.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool under its own name. Idempotent: registering the same
    /// name twice replaces the previous entry and logs a warning.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "tool registration overwrote an existing entry");
        }
    }

    /// Register a tool discovered from `server_name`, applying the name
    /// sanitization and collision-disambiguation rule: invalid characters
    /// become `_`; a name collision with an already-registered tool is
    /// resolved by prefixing `server_name__`; names over 63 characters are
    /// collapsed to a `head___tail` form.
    pub fn register_discovered(&mut self, server_name: &str, raw_name: &str, tool: Arc<dyn Tool>) {
        let mut name = sanitize_tool_name(raw_name);
        if self.tools.contains_key(&name) {
            name = format!("{server_name}__{name}");
        }
        name = truncate_tool_name(&name);
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, server = %server_name, "discovered tool overwrote an existing entry");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas for every registered tool, sorted by name for deterministic
    /// prompt assembly.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn sanitize_tool_name(raw_name: &str) -> String {
    raw_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Collapse a name over 63 characters to its first 28 and last 32
/// characters joined by `___`, matching the length limit most model
/// providers place on function names.
pub fn truncate_tool_name(name: &str) -> String {
    if name.len() <= 63 {
        return name.to_string();
    }
    let chars: Vec<char> = name.chars().collect();
    let head: String = chars[..28].iter().collect();
    let tail: String = chars[chars.len() - 32..].iter().collect();
    format!("{head}___{tail}")
}

/// Remove `default` from any schema node that also has `anyOf`, recursively.
/// Some model providers reject a `default` sibling to `anyOf`.
pub fn sanitize_schema(schema: &mut serde_json::Value) {
    let Some(obj) = schema.as_object_mut() else { return };
    if obj.contains_key("anyOf") {
        obj.remove("default");
    }
    if let Some(any_of) = obj.get_mut("anyOf").and_then(|v| v.as_array_mut()) {
        for item in any_of {
            sanitize_schema(item);
        }
    }
    if let Some(items) = obj.get_mut("items") {
        sanitize_schema(items);
    }
    if let Some(props) = obj.get_mut("properties").and_then(|v| v.as_object_mut()) {
        for (_, v) in props.iter_mut() {
            sanitize_schema(v);
        }
    }
}
