//! Clap-backed command listeners.
//!
//! A command listener names a command instead of matching free text. The
//! rest of the message is split shell-style and parsed into a
//! [`clap::Parser`] type before the handler runs:
//!
//! ```rust,ignore
//! use clap::Parser;
//!
//! #[derive(Parser)]
//! #[command(name = "calc", about = "Adds two numbers")]
//! struct Calc {
//!     a: i64,
//!     b: i64,
//! }
//!
//! listen_to("calc").command(|ctx, msg, calc: Calc| {
//!     ctx.reply_blocking(&msg, &(calc.a + calc.b).to_string())?;
//!     Ok(())
//! })
//! ```
//!
//! `calc 2 3` replies `5`. `calc two` replies with clap's error and the
//! command help instead of calling the handler.

use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::{debug, error};

use crate::context::BotContext;
use crate::error::{HandlerResult, ListenerError};
use crate::listener::{ListenSpec, ListenerGroup};
use parley_core::ChatMessage;

impl ListenSpec<ChatMessage> {
    /// Finishes the declaration with a command handler parsing `T`.
    ///
    /// The pattern names the command and is rewritten to `^{pattern} (.*)?`.
    /// A pattern containing `$` fails registration. Command handlers always
    /// run on the worker pool.
    pub fn command<T, H>(self, handler: H) -> ListenerGroup<ChatMessage>
    where
        T: Parser + 'static,
        H: Fn(Arc<BotContext>, Arc<ChatMessage>, T) -> HandlerResult + Send + Sync + 'static,
    {
        let mut command = T::command();
        let name = command.get_name().to_string();
        let about = command.get_about().map(|about| about.to_string());
        let usage = command.render_help().to_string();

        let mut group = self.threaded(move |ctx, msg, groups| {
            let args = groups.first().map(|s| shell_split(s)).unwrap_or_default();
            match T::try_parse_from(std::iter::once(name.clone()).chain(args)) {
                Ok(parsed) => handler(ctx, msg, parsed),
                Err(e) => {
                    debug!(command = %name, kind = ?e.kind(), "Command arguments rejected");
                    let reply = parse_error_reply::<T>(&e);
                    if let Err(e) = ctx.reply_blocking(&msg, &reply) {
                        error!(command = %name, error = %e, "Failed to send command usage");
                    }
                    Ok(())
                }
            }
        });

        for spec in &mut group.specs {
            if spec.pattern.contains('$') {
                group
                    .error
                    .get_or_insert_with(|| ListenerError::CommandPattern(spec.pattern.clone()));
            }
            spec.pattern = format!("^{} (.*)?", spec.pattern.trim_start_matches('^'));
            if spec.description.is_none() {
                spec.description.clone_from(&about);
            }
            spec.usage = Some(usage.clone());
        }

        group
    }
}

/// Clap's message, followed by the full help unless it already is the help.
fn parse_error_reply<T: Parser>(e: &clap::Error) -> String {
    let mut reply = e.render().to_string();
    if !matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        reply.push('\n');
        reply.push_str(&T::command().render_help().to_string());
    }
    reply
}

/// Simple shell-like argument splitting.
///
/// Handles:
/// - Space-separated arguments
/// - Quoted strings (single and double quotes)
/// - Escape sequences within double quotes
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;
    // Distinguishes `""` (an empty argument) from no argument at all.
    let mut quoted = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                quoted = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                quoted = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{ExecutionMode, Handler, listen_to, match_groups};
    use crate::testing::{message, test_context};

    #[derive(Parser, Debug)]
    #[command(name = "calc", about = "Adds two numbers")]
    struct Calc {
        a: i64,
        b: i64,
        #[arg(long)]
        negate: bool,
    }

    fn calc_group() -> ListenerGroup<ChatMessage> {
        listen_to("calc").command(|ctx, msg, calc: Calc| {
            let sum = calc.a + calc.b;
            let sum = if calc.negate { -sum } else { sum };
            ctx.reply_blocking(&msg, &sum.to_string())?;
            Ok(())
        })
    }

    async fn run_command(text: &str) -> Vec<String> {
        let (ctx, client) = test_context();
        let entry = calc_group().compile().unwrap().remove(0);
        let groups = match_groups(entry.pattern(), text).unwrap();
        let Handler::Threaded(handler) = entry.handler().clone() else {
            panic!("command handlers are threaded");
        };

        let msg = Arc::new(message(text));
        let task_ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || handler(task_ctx, msg, groups))
            .await
            .unwrap()
            .unwrap();
        ctx.pool().stop();
        client.replies()
    }

    #[test]
    fn test_shell_split_basic() {
        assert_eq!(shell_split("2 3 --negate"), vec!["2", "3", "--negate"]);
    }

    #[test]
    fn test_shell_split_quotes() {
        let args = shell_split(r#"say "hello world" 'it''s'"#);
        assert_eq!(args, vec!["say", "hello world", "its"]);
    }

    #[test]
    fn test_shell_split_mixed_quotes() {
        let args = shell_split(r#"cmd "double's quote" 'single"s quote'"#);
        assert_eq!(args, vec!["cmd", "double's quote", r#"single"s quote"#]);
    }

    #[test]
    fn test_shell_split_escape_in_double_quotes() {
        let args = shell_split(r#""a \"b\" c""#);
        assert_eq!(args, vec![r#"a "b" c"#]);
    }

    #[test]
    fn test_shell_split_empty_quoted_argument() {
        assert_eq!(shell_split(r#"x "" y"#), vec!["x", "", "y"]);
    }

    #[test]
    fn test_shell_split_whitespace_only() {
        assert!(shell_split("").is_empty());
        assert!(shell_split("   \t  ").is_empty());
    }

    #[test]
    fn test_command_declaration() {
        let group = calc_group();
        assert!(group.error.is_none());

        let entries = group.compile().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.source(), "^calc (.*)?");
        assert_eq!(entry.mode(), ExecutionMode::Threaded);
        assert_eq!(entry.description(), Some("Adds two numbers"));
        assert!(entry.usage().unwrap().contains("--negate"));

        assert!(match_groups(entry.pattern(), "calc 2 3").is_some());
        assert!(match_groups(entry.pattern(), "calculate 2 3").is_none());
    }

    #[test]
    fn test_dollar_in_command_pattern_is_rejected() {
        let err = listen_to("^calc$")
            .command(|_, _, _: Calc| Ok(()))
            .compile()
            .unwrap_err();
        assert!(matches!(err, ListenerError::CommandPattern(ref p) if p == "^calc$"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_command_parses_arguments() {
        assert_eq!(run_command("calc 2 3").await, vec!["5"]);
        assert_eq!(run_command("calc 2 3 --negate").await, vec!["-5"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_parse_error_replies_with_help() {
        let replies = run_command("calc two 3").await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("invalid value 'two'"));
        assert!(replies[0].contains("Adds two numbers"));
    }
}
