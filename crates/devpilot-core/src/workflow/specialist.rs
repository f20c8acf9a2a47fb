//! Specialist catalog — role context for each capability id.
//!
//! Built-in specialists cover the capability ids used by the built-in
//! workflows. Extra specialists can be dropped into a directory as YAML
//! (or Markdown with YAML frontmatter):
//!
//! ```yaml
//! id: "release-noter"
//! name: "Release Noter"
//! role: "WRITER"
//! roleReminder: "Group changes by user impact."
//! systemPrompt: |
//!   You turn merged changes into release notes.
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistDef {
    /// Capability id this specialist serves (e.g. "code-reviewer")
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_role")]
    pub role: String,

    pub system_prompt: String,

    /// Short reminder appended after the step input
    #[serde(default)]
    pub role_reminder: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_role() -> String {
    "SPECIALIST".to_string()
}

impl SpecialistDef {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse specialist YAML: {}", e))
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read specialist file '{}': {}", path.display(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse a Markdown file whose YAML frontmatter holds everything but the
    /// system prompt; the body becomes the prompt and the file stem the id.
    pub fn from_markdown(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read specialist markdown '{}': {}", path.display(), e))?;

        let parts: Vec<&str> = content.splitn(3, "---").collect();
        if parts.len() < 3 {
            return Err(format!(
                "Invalid specialist markdown '{}': missing YAML frontmatter",
                path.display()
            ));
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct FrontMatter {
            name: String,
            description: Option<String>,
            role: Option<String>,
            role_reminder: Option<String>,
        }

        let fm: FrontMatter = serde_yaml::from_str(parts[1].trim())
            .map_err(|e| format!("Failed to parse frontmatter in '{}': {}", path.display(), e))?;

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            id,
            name: fm.name,
            description: fm.description,
            role: fm.role.unwrap_or_else(default_role),
            system_prompt: parts[2].trim().to_string(),
            role_reminder: fm.role_reminder,
            metadata: HashMap::new(),
        })
    }

    /// Role context for a capability id with no specialist.
    pub fn generic(capability_id: &str) -> Self {
        Self {
            id: capability_id.to_string(),
            name: capability_id.to_string(),
            description: None,
            role: default_role(),
            system_prompt: format!(
                "You are the '{}' capability in an automated workflow. \
                 Complete the step using the provided input and return a structured result.",
                capability_id
            ),
            role_reminder: None,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpecialistCatalog {
    specialists: HashMap<String, SpecialistDef>,
}

impl SpecialistCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog pre-populated with the built-in specialists.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for def in builtin_specialists() {
            catalog.insert(def);
        }
        catalog
    }

    pub fn insert(&mut self, def: SpecialistDef) {
        self.specialists.insert(def.id.clone(), def);
    }

    /// Load every `.yaml`/`.yml`/`.md` file in `dir`, replacing same-id entries.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, String> {
        if !dir.is_dir() {
            return Err(format!("Specialist directory '{}' does not exist", dir.display()));
        }

        let mut count = 0;
        for entry in std::fs::read_dir(dir)
            .map_err(|e| format!("Failed to read directory '{}': {}", dir.display(), e))?
        {
            let path = entry.map_err(|e| format!("Directory entry error: {}", e))?.path();
            let specialist = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => SpecialistDef::from_file(&path)?,
                Some("md") => SpecialistDef::from_markdown(&path)?,
                _ => continue,
            };
            tracing::info!(
                "[SpecialistCatalog] Loaded specialist: {} ({})",
                specialist.id,
                specialist.name
            );
            self.insert(specialist);
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<&SpecialistDef> {
        self.specialists.get(id)
    }

    /// The specialist for `capability_id`, or a generic role context.
    pub fn resolve(&self, capability_id: &str) -> SpecialistDef {
        self.get(capability_id)
            .cloned()
            .unwrap_or_else(|| SpecialistDef::generic(capability_id))
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.specialists.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn specialist(id: &str, name: &str, role: &str, prompt: &str, reminder: &str) -> SpecialistDef {
    SpecialistDef {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        role: role.to_string(),
        system_prompt: prompt.to_string(),
        role_reminder: Some(reminder.to_string()),
        metadata: HashMap::new(),
    }
}

pub fn builtin_specialists() -> Vec<SpecialistDef> {
    vec![
        specialist(
            "researcher",
            "Researcher",
            "RESEARCHER",
            "You gather facts relevant to the task from the provided material. \
             Cite where each finding came from and separate facts from assumptions.",
            "Report findings with sources; do not draw conclusions yet.",
        ),
        specialist(
            "analyst",
            "Analyst",
            "ANALYST",
            "You analyze findings and data, identify patterns and quantify them where possible.",
            "Back every claim with the data you were given.",
        ),
        specialist(
            "planner",
            "Planner",
            "PLANNER",
            "You break a goal into ordered, verifiable tasks with clear acceptance criteria.",
            "Keep tasks small and independently checkable.",
        ),
        specialist(
            "critic",
            "Critic",
            "CRITIC",
            "You review the previous step's output for errors, gaps and weak reasoning.",
            "Be specific: point at the exact problem and suggest a fix.",
        ),
        specialist(
            "synthesizer",
            "Synthesizer",
            "SYNTHESIZER",
            "You merge the outputs of several steps into one coherent result.",
            "Resolve contradictions explicitly instead of averaging them away.",
        ),
        specialist(
            "writer",
            "Writer",
            "WRITER",
            "You turn structured material into clear prose for the stated audience.",
            "Match the requested format and length.",
        ),
        specialist(
            "editor",
            "Editor",
            "EDITOR",
            "You tighten and correct a draft without changing its meaning.",
            "Return the edited text, not commentary about it.",
        ),
        specialist(
            "code-reviewer",
            "Code Reviewer",
            "REVIEWER",
            "You review code changes for correctness, readability and risk. \
             Report issues with file and line references and an overall verdict.",
            "Return `approved`, `summary` and a list of `issues`.",
        ),
        specialist(
            "commit-writer",
            "Commit Writer",
            "WRITER",
            "You write a conventional commit message describing the reviewed change.",
            "Subject line under 72 characters, imperative mood.",
        ),
        specialist(
            "git-operator",
            "Git Operator",
            "OPERATOR",
            "You perform git operations (stage, commit, push, branch) as instructed.",
            "Never force-push or rewrite published history.",
        ),
        specialist(
            "test-runner",
            "Test Runner",
            "OPERATOR",
            "You run the project's test suite and report pass/fail counts and failures.",
            "Report failing test names and the first error line of each.",
        ),
        specialist(
            "debugger",
            "Debugger",
            "DEBUGGER",
            "You diagnose an error from its message, stack trace and context, \
             and propose the smallest fix.",
            "State the root cause before the fix.",
        ),
        specialist(
            "document-parser",
            "Document Parser",
            "PARSER",
            "You extract structured sections, entities and metadata from a document.",
            "Preserve original headings and ordering.",
        ),
        specialist(
            "indexer",
            "Indexer",
            "INDEXER",
            "You turn parsed content into index entries with titles, tags and summaries.",
            "One entry per concept; reuse existing tags where possible.",
        ),
        specialist(
            "python-runner",
            "Python Runner",
            "OPERATOR",
            "You execute Python code in the prepared environment and return its results.",
            "Return stdout, stderr and any produced values.",
        ),
    ]
}
