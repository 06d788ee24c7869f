//! Quick-fix synthesis from code action request context

use std::borrow::Cow;
use std::sync::Arc;

use tower_lsp::lsp_types::{
    CodeAction, CodeActionKind, Command, Diagnostic, NumberOrString, Range, Url,
};
use tracing::trace;

use crate::lsp::rules::{CommandDescriptor, RuleTable};

/// Builds quick fixes for the diagnostics a client sends with a code action request
#[derive(Debug, Clone)]
pub struct CodeActionSynthesizer {
    rules: Arc<RuleTable>,
    source: String,
}

impl CodeActionSynthesizer {
    pub fn new(rules: Arc<RuleTable>, source: impl Into<String>) -> Self {
        Self {
            rules,
            source: source.into(),
        }
    }

    /// Returns one quick fix per context diagnostic whose range equals `range`
    /// and whose code has a rule table entry, in context order.
    ///
    /// Ranges match only when structurally identical. Diagnostics without a
    /// mapped code are skipped, and duplicates each get their own action.
    pub fn synthesize(&self, uri: &Url, range: &Range, context: &[Diagnostic]) -> Vec<CodeAction> {
        context
            .iter()
            .filter(|diagnostic| diagnostic.range == *range)
            .filter_map(|diagnostic| {
                let code = rule_code(diagnostic)?;
                let Some(command) = self.rules.get(&code) else {
                    trace!("No quick fix for {} in {}", code, uri);
                    return None;
                };
                Some(self.quick_fix(diagnostic, command))
            })
            .collect()
    }

    fn quick_fix(&self, diagnostic: &Diagnostic, command: &CommandDescriptor) -> CodeAction {
        CodeAction {
            title: format!("{}: {}", self.source, command.title),
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: Some(vec![diagnostic.clone()]),
            command: Some(Command {
                title: command.title.clone(),
                command: command.command.clone(),
                arguments: command.arguments.clone(),
            }),
            ..Default::default()
        }
    }
}

fn rule_code(diagnostic: &Diagnostic) -> Option<Cow<'_, str>> {
    match diagnostic.code.as_ref()? {
        NumberOrString::String(code) => Some(Cow::Borrowed(code.as_str())),
        NumberOrString::Number(code) => Some(Cow::Owned(code.to_string())),
    }
}
