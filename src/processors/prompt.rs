//! Prompt resolution for one message.

use crate::pipeline::message::Message;
use crate::pipeline::processor::ProcessError;
use crate::processors::template::{Template, TemplateError};

/// System and user prompts resolved for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    /// Empty when no system template is configured.
    pub system: String,
    pub user: String,
}

/// Derives prompts from compiled templates and the message.
#[derive(Debug, Clone)]
pub struct PromptResolver {
    user: Option<Template>,
    system: Option<Template>,
}

impl PromptResolver {
    /// Compile both templates up front.
    pub fn new(user: Option<&str>, system: Option<&str>) -> Result<Self, TemplateError> {
        Ok(Self {
            user: user.map(Template::compile).transpose()?,
            system: system.map(Template::compile).transpose()?,
        })
    }

    /// Resolve prompts for `msg`. Pure.
    ///
    /// A configured user template always wins, even when it renders empty.
    /// Without one the raw payload is used and must be valid UTF-8.
    pub fn resolve(&self, msg: &Message) -> Result<ResolvedPrompt, ProcessError> {
        let system = match &self.system {
            Some(tmpl) => tmpl.render(msg)?,
            None => String::new(),
        };

        let user = match &self.user {
            Some(tmpl) => tmpl.render(msg)?,
            None => std::str::from_utf8(msg.as_bytes())
                .map_err(|_| {
                    ProcessError::Validation("message payload contained invalid UTF8".into())
                })?
                .to_string(),
        };

        Ok(ResolvedPrompt { system, user })
    }
}
