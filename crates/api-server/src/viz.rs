//! Graphviz rendering of agent networks

use std::process::Stdio;

use agent_runner::AgentNetwork;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum VizError {
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to start Graphviz '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Graphviz exited with {status}: {stderr}")]
    Render { status: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VizError {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "Use one of: png, svg, dot.",
            Self::Spawn { .. } => {
                "Install Graphviz and make sure `dot` is on PATH, or set GRAPHVIZ_DOT to its location."
            }
            Self::Render { .. } | Self::Io(_) => "Request output_format=dot to inspect the graph source.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Svg,
    Dot,
}

impl OutputFormat {
    pub fn parse(raw: Option<&str>) -> Result<Self, VizError> {
        match raw.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("png") => Ok(Self::Png),
            Some("svg") => Ok(Self::Svg),
            Some("dot") => Ok(Self::Dot),
            Some(other) => Err(VizError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Dot => "dot",
        }
    }
}

fn quote(id: &str) -> String {
    format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
}

/// DOT source for a network. `root` is highlighted and wired from the start
/// marker.
pub fn network_dot(network: &AgentNetwork, root: &str) -> String {
    let mut out = String::new();
    out.push_str("digraph agents {\n");
    out.push_str("  graph [rankdir=LR, splines=true, fontname=\"Arial\"];\n");
    out.push_str("  node [fontname=\"Arial\", fontsize=11];\n");
    out.push_str("  edge [penwidth=1.4];\n");
    out.push_str("  \"__start__\" [shape=circle, label=\"start\", style=filled, fillcolor=\"#d9ead3\"];\n");
    out.push_str("  \"__end__\" [shape=doublecircle, label=\"end\", style=filled, fillcolor=\"#f4cccc\"];\n");

    for agent in network.agents() {
        let fill = if agent.name == root {
            "#fff2cc"
        } else if network.orchestrator.as_deref() == Some(agent.name.as_str()) {
            "#cfe2f3"
        } else {
            "#ffffff"
        };
        out.push_str(&format!(
            "  {} [shape=box, style=\"rounded,filled\", fillcolor=\"{}\", label=\"{}\\n({})\"];\n",
            quote(&agent.name),
            fill,
            agent.name,
            agent.role
        ));
    }

    out.push_str(&format!("  \"__start__\" -> {};\n", quote(root)));

    for agent in network.agents() {
        for tool in &agent.tools {
            let tool_id = format!("tool:{}", tool.name);
            out.push_str(&format!(
                "  {} [shape=ellipse, style=filled, fillcolor=\"#eeeeee\", label=\"{}\"];\n",
                quote(&tool_id),
                tool.name
            ));
            out.push_str(&format!("  {} -> {} [style=dashed];\n", quote(&agent.name), quote(&tool_id)));
        }
        for edge in &agent.handoffs {
            out.push_str(&format!("  {} -> {};\n", quote(&edge.from), quote(&edge.target)));
        }
        for wrapper in &agent.agent_tools {
            out.push_str(&format!(
                "  {} -> {} [style=dotted, label=\"{}\"];\n",
                quote(&agent.name),
                quote(&wrapper.agent),
                wrapper.name
            ));
        }
        if agent.handoffs.is_empty() {
            out.push_str(&format!("  {} -> \"__end__\";\n", quote(&agent.name)));
        }
    }

    out.push_str("}\n");
    out
}

/// Pipe DOT source through Graphviz and return the rendered bytes.
pub async fn render(binary: &str, dot: &str, format: OutputFormat) -> Result<Vec<u8>, VizError> {
    let mut child = Command::new(binary)
        .arg(format!("-T{}", format.as_str()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| VizError::Spawn {
            binary: binary.to_string(),
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(dot.as_bytes()).await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(VizError::Render {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agent_runner::{AgentSpec, HandoffRecorder, NetworkBuilder};
    use convo_core::scenario::ScenarioRegistry;
    use convo_core::session::EventStore;
    use convo_core::tool::ToolRegistry;
    use serde_json::Map;

    use super::*;

    fn network() -> AgentNetwork {
        NetworkBuilder::new(
            Arc::new(ScenarioRegistry::builtin()),
            Arc::new(ToolRegistry::builtin()),
        )
        .build(
            Some("default"),
            &Map::new(),
            &AgentSpec::default(),
            HandoffRecorder::new(Arc::new(EventStore::new()), "viz"),
        )
    }

    #[test]
    fn test_dot_contains_agents_tools_and_edges() {
        let dot = network_dot(&network(), "general");

        assert!(dot.starts_with("digraph agents {"));
        assert!(dot.contains("\"__start__\" -> \"general\";"));
        assert!(dot.contains("\"general\" -> \"sales\";"));
        assert!(dot.contains("\"sales\" -> \"tool:product_search\" [style=dashed];"));
        assert!(dot.contains("label=\"sales_agent_tool\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse(None).unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::parse(Some("SVG")).unwrap(), OutputFormat::Svg);
        assert!(matches!(OutputFormat::parse(Some("gif")), Err(VizError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let err = render("/nonexistent/graphviz-dot", "digraph {}", OutputFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(err, VizError::Spawn { .. }));
        assert!(err.hint().contains("GRAPHVIZ_DOT"));
    }
}
