//! Rule code to remediation command table
//!
//! Built once at startup and shared read-only with the code action synthesizer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FORMAT_DOCUMENT_TITLE: &str = "Run document formatting";
pub const FORMAT_DOCUMENT_COMMAND: &str = "editor.action.formatDocument";

/// Whitespace and comment rules that a document formatter fixes
const FORMATTING_RULES: [&str; 26] = [
    "E201", "E202", "E203", "E211", "E221", "E222", "E223", "E224", "E225", "E226", "E227", "E228",
    "E231", "E241", "E242", "E251", "E252", "E261", "E262", "E265", "E266", "E271", "E272", "E273",
    "E274", "E275",
];

/// Client command offered as the fix for a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub title: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<Value>>,
}

impl CommandDescriptor {
    pub fn new(title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            command: command.into(),
            arguments: None,
        }
    }

    pub fn format_document() -> Self {
        Self::new(FORMAT_DOCUMENT_TITLE, FORMAT_DOCUMENT_COMMAND)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    commands: IndexMap<String, CommandDescriptor>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default pycodestyle table: every formatting rule maps to document formatting.
    pub fn pycodestyle() -> Self {
        FORMATTING_RULES
            .iter()
            .map(|code| (code.to_string(), CommandDescriptor::format_document()))
            .collect()
    }

    /// Adds or replaces the command for `code`.
    pub fn with_rule(mut self, code: impl Into<String>, command: CommandDescriptor) -> Self {
        self.commands.insert(code.into(), command);
        self
    }

    pub fn get(&self, code: &str) -> Option<&CommandDescriptor> {
        self.commands.get(code)
    }
}

impl FromIterator<(String, CommandDescriptor)> for RuleTable {
    fn from_iter<I: IntoIterator<Item = (String, CommandDescriptor)>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}
