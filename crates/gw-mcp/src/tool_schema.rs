//! A tool discovered from an MCP server's `tools/list` response, and its
//! conversion into the gateway's unified [`ToolSchema`].

use gw_core::request::ToolSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl McpTool {
    /// Name as it appears on the wire to the upstream provider: prefixed by
    /// the owning client so tool-call results can be routed back without
    /// ambiguity when two MCP clients expose tools with the same name.
    pub fn qualified_name(&self, client_name: &str) -> String {
        format!("{client_name}__{}", self.name)
    }

    pub fn to_tool_schema(&self, client_name: &str) -> ToolSchema {
        ToolSchema {
            name: self.qualified_name(client_name),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// Split a qualified tool name (`{client}__{tool}`) back into its parts.
pub fn split_qualified_name(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_round_trips() {
        let tool = McpTool {
            name: "list_directory".into(),
            description: "lists files".into(),
            input_schema: default_schema(),
        };
        let qualified = tool.qualified_name("fs");
        let (client, name) = split_qualified_name(&qualified).unwrap();
        assert_eq!(client, "fs");
        assert_eq!(name, "list_directory");
    }
}
