//! Built-in help listener.
//!
//! [`HelpPlugin`] answers `help` (when the bot is mentioned or messaged
//! directly) and `!help` with a listing of every message listener registered
//! on the [`PluginManager`](crate::PluginManager), grouped by plugin.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::listener::{Gates, ListenerEntry, listen_to};
use crate::plugin::{Plugin, PluginListeners};
use parley_core::ChatMessage;

const INDENT: &str = "    ";
const DOC_INDENT: &str = "        ";

#[derive(Debug, Clone)]
struct HelpLine {
    pattern: String,
    description: Option<String>,
    usage: Option<String>,
    gates: Gates,
}

impl HelpLine {
    fn from_entry(entry: &ListenerEntry<ChatMessage>) -> Self {
        Self {
            pattern: entry.source().to_string(),
            description: entry.description().map(str::to_string),
            usage: entry.usage().map(str::to_string),
            gates: entry.gates().clone(),
        }
    }

    fn write_to(&self, out: &mut fmt::Formatter<'_>, bot_username: &str) -> fmt::Result {
        writeln!(out, "- `{}`:", self.pattern)?;
        let doc = self
            .description
            .as_deref()
            .unwrap_or("No description provided.");
        writeln!(out, "{DOC_INDENT}{doc}")?;
        if let Some(usage) = &self.usage {
            for line in usage.lines() {
                writeln!(out, "{DOC_INDENT}{line}")?;
            }
        }

        if !self.gates.is_restricted() {
            return Ok(());
        }

        writeln!(out, "{INDENT}Additional information:")?;
        if self.gates.needs_mention {
            writeln!(
                out,
                "{INDENT}- Needs to either mention @{bot_username} or be a direct message."
            )?;
        }
        if self.gates.direct_only {
            writeln!(out, "{INDENT}- Needs to be a direct message.")?;
        }
        if !self.gates.allowed_users.is_empty() {
            writeln!(out, "{INDENT}- Restricted to certain users.")?;
        }
        Ok(())
    }
}

/// Help text source: the message listeners of every registered plugin.
#[derive(Debug, Clone, Default)]
pub struct HelpIndex {
    sections: Vec<(String, Vec<HelpLine>)>,
}

impl HelpIndex {
    /// Records a plugin's message listeners.
    pub fn add_plugin<'a>(
        &mut self,
        plugin: &str,
        entries: impl IntoIterator<Item = &'a ListenerEntry<ChatMessage>>,
    ) {
        let lines = entries.into_iter().map(HelpLine::from_entry).collect();
        self.sections.push((plugin.to_string(), lines));
    }

    /// Renders the help text.
    pub fn render(&self, bot_username: &str) -> String {
        HelpText {
            index: self,
            bot_username,
        }
        .to_string()
    }
}

struct HelpText<'a> {
    index: &'a HelpIndex,
    bot_username: &'a str,
}

impl fmt::Display for HelpText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (plugin, lines) in &self.index.sections {
            writeln!(f, "Plugin {plugin} has the following functions:")?;
            f.write_str("----\n")?;
            for line in lines {
                line.write_to(f, self.bot_username)?;
                f.write_str("----\n")?;
            }
        }
        Ok(())
    }
}

/// Replies with the rendered [`HelpIndex`].
#[derive(Debug, Clone)]
pub struct HelpPlugin {
    index: Arc<RwLock<HelpIndex>>,
}

impl HelpPlugin {
    /// Creates a help plugin reading from a shared index.
    pub fn new(index: Arc<RwLock<HelpIndex>>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Plugin for HelpPlugin {
    fn name(&self) -> &str {
        "HelpPlugin"
    }

    fn listeners(self: Arc<Self>) -> PluginListeners {
        PluginListeners::new().with(
            listen_to("^help$")
                .needs_mention()
                .or(listen_to("^!help$"))
                .description("Prints the list of functions registered on every active plugin.")
                .inline(move |ctx, msg, _| {
                    let text = self.index.read().render(&ctx.identity().username);
                    async move {
                        ctx.reply(&msg, &text).await?;
                        Ok(())
                    }
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_gates() {
        let registries = PluginListeners::new()
            .with(
                listen_to("^admin$")
                    .direct_only()
                    .allowed_users(["root"])
                    .description("Admin only.")
                    .threaded(|_, _, _| Ok(())),
            )
            .with(listen_to("^ping$").needs_mention().threaded(|_, _, _| Ok(())))
            .with(listen_to("^hello$").threaded(|_, _, _| Ok(())))
            .build()
            .unwrap();

        let mut index = HelpIndex::default();
        index.add_plugin("Example", registries.messages.iter());
        let text = index.render("parley");

        assert!(text.starts_with("Plugin Example has the following functions:\n----\n"));
        assert!(text.contains("- `^admin$`:\n        Admin only.\n    Additional information:\n"));
        assert!(text.contains("    - Needs to be a direct message.\n    - Restricted to certain users.\n"));
        assert!(text.contains("- Needs to either mention @parley or be a direct message."));
        assert!(text.contains("- `^hello$`:\n        No description provided.\n----\n"));
    }

    #[test]
    fn test_render_keeps_plugin_order_and_usage_lines() {
        let mut remind = listen_to("^remind (.+)$").description("Sets a reminder.");
        remind.usage = Some("remind <text>\nremind list".to_string());
        let first = PluginListeners::new()
            .with(remind.threaded(|_, _, _| Ok(())))
            .build()
            .unwrap();
        let second = PluginListeners::new()
            .with(listen_to("^roll$").threaded(|_, _, _| Ok(())))
            .build()
            .unwrap();

        let mut index = HelpIndex::default();
        index.add_plugin("Reminders", first.messages.iter());
        index.add_plugin("Dice", second.messages.iter());
        let text = index.render("parley");

        assert_eq!(
            text,
            "Plugin Reminders has the following functions:\n----\n\
             - `^remind (.+)$`:\n        Sets a reminder.\n        remind <text>\n        remind list\n----\n\
             Plugin Dice has the following functions:\n----\n\
             - `^roll$`:\n        No description provided.\n----\n"
        );
    }
}
