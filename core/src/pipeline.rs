use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::fs;

// One named role in the pipeline. Sub-agents are offered to their parent as
// callable tools; the parent decides when to delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instruction: String,

    // Falls back to the runtime's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    // Session key the agent's final text is stored under, so downstream
    // instructions can read it back as `{key}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_agents: Vec<AgentSpec>,
}

impl AgentSpec {
    pub fn define(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: instruction.into(),
            model: None,
            output_key: None,
            sub_agents: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_tools(mut self, agents: Vec<AgentSpec>) -> Self {
        self.sub_agents.extend(agents);
        self
    }

    /// Direct sub-agent by name.
    pub fn find(&self, name: &str) -> Option<&AgentSpec> {
        self.sub_agents.iter().find(|a| a.name == name)
    }

    /// Names must be usable as function names and unique across the tree.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        self.validate_into(&mut seen)
    }

    fn validate_into<'a>(&'a self, seen: &mut HashSet<&'a str>) -> Result<()> {
        if !is_valid_name(&self.name) {
            bail!(
                "Agent name '{}' must be 1-64 characters of [A-Za-z0-9_-]",
                self.name
            );
        }
        if !seen.insert(self.name.as_str()) {
            bail!("Agent name '{}' is used more than once", self.name);
        }
        if self.instruction.trim().is_empty() {
            bail!("Agent '{}' has an empty instruction", self.name);
        }
        for agent in &self.sub_agents {
            agent.validate_into(seen)?;
        }
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

const COORDINATOR_INSTRUCTION: &str = "You coordinate a small research team. \
For every user question, first call the `researcher` tool with the question to gather facts. \
Then call the `summarizer` tool so it can condense the findings. \
Reply to the user with the summarizer's answer, lightly edited for clarity.";

const RESEARCHER_INSTRUCTION: &str = "You are a careful researcher. \
Collect the key facts, figures and open points that answer the request. \
Return them as a concise bullet list. Say so plainly when you are unsure.";

const SUMMARIZER_INSTRUCTION: &str = "You write short, accurate summaries. \
Summarize these research findings in a few sentences for a non-expert reader:\n\n\
{research_findings}";

pub struct Pipeline;

impl Pipeline {
    /// Built-in coordinator -> researcher -> summarizer pipeline.
    pub fn research() -> AgentSpec {
        let researcher = AgentSpec::define("researcher", RESEARCHER_INSTRUCTION)
            .describe("Gathers facts relevant to a question.")
            .output_key("research_findings");

        let summarizer = AgentSpec::define("summarizer", SUMMARIZER_INSTRUCTION)
            .describe("Condenses the research findings into a short answer.")
            .output_key("final_summary");

        AgentSpec::define("coordinator", COORDINATOR_INSTRUCTION)
            .describe("Routes a question through research and summarization.")
            .with_tools(vec![researcher, summarizer])
    }

    // Reads a pipeline JSON file, or hands back the built-in one
    pub async fn load(path: Option<&str>) -> Result<AgentSpec> {
        let Some(path) = path else {
            return Ok(Self::research());
        };

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read pipeline at '{}': {}", path, e))?;

        let root: AgentSpec = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid pipeline JSON in '{}': {}", path, e))?;
        root.validate()?;

        tracing::info!(
            "Pipeline '{}' loaded from {} ({} sub-agents)",
            root.name,
            path,
            root.sub_agents.len()
        );
        Ok(root)
    }
}

/// Replaces `{key}` with the session value for `key`. Placeholders with no
/// value, and braces that don't wrap an identifier, are kept as written.
pub fn render_instruction(template: &str, state: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let substituted = after.find('}').and_then(|close| {
            let key = &after[..close];
            let is_ident = !key.is_empty()
                && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !is_ident {
                return None;
            }
            state.get(key).map(|value| (value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
