//! Examples of listeners, gates and scheduled jobs.

use std::time::{Duration, SystemTime};

use clap::Parser;
use parley::prelude::*;
use time::macros::format_description;
use time::{PrimitiveDateTime, UtcOffset};
use tracing::info;

/// Arguments of the `add` command.
#[derive(Debug, Parser)]
#[command(name = "add", about = "Adds up a list of integers.")]
pub struct AddArgs {
    /// Numbers to add.
    #[arg(required = true, allow_negative_numbers = true)]
    numbers: Vec<i64>,

    /// Print the sum in hexadecimal.
    #[arg(long)]
    hex: bool,
}

/// Demonstrates the common listener shapes.
#[derive(Debug, Default)]
pub struct ExamplePlugin;

#[async_trait]
impl Plugin for ExamplePlugin {
    fn listeners(self: Arc<Self>) -> PluginListeners {
        PluginListeners::new()
            .with(
                listen_to("^admin$")
                    .direct_only()
                    .allowed_users(["admin", "root"])
                    .description("Only answers admins, in a direct message.")
                    .inline(|ctx, msg, _| async move {
                        ctx.reply(&msg, "Access allowed!").await?;
                        Ok(())
                    }),
            )
            .with(
                listen_to("^busy|jobs$")
                    .ignore_case()
                    .needs_mention()
                    .description("Show the number of busy worker threads.")
                    .inline(|ctx, msg, _| async move {
                        let busy = ctx.pool().busy_count();
                        ctx.reply(&msg, &format!("Number of busy worker threads: {busy}"))
                            .await?;
                        Ok(())
                    }),
            )
            .with(
                listen_to("^hello_channel$")
                    .needs_mention()
                    .inline(|ctx, msg, _| async move {
                        ctx.create_post(&msg.channel_id, "hello channel!").await?;
                        Ok(())
                    }),
            )
            .with(
                listen_to("^hello_react$")
                    .ignore_case()
                    .needs_mention()
                    .inline(|ctx, msg, _| async move {
                        ctx.react(&msg, "+1").await?;
                        Ok(())
                    }),
            )
            .with(
                listen_to("^!info$")
                    .description("Show what the bot knows about you and this message.")
                    .inline(|ctx, msg, _| async move {
                        let user = ctx.get_user_info(&msg.user_id).await?;
                        let email = user["email"].as_str().unwrap_or("unknown");
                        let mut mentions: Vec<_> = msg.mentions.iter().cloned().collect();
                        mentions.sort();
                        let reply = format!(
                            "TEAM-ID: {}\nUSERNAME: {}\nEMAIL: {email}\nUSER-ID: {}\n\
                             IS-DIRECT: {}\nMENTIONS: {mentions:?}\nMESSAGE: {}",
                            msg.team_id, msg.sender_name, msg.user_id, msg.is_direct, msg.text
                        );
                        ctx.reply(&msg, &reply).await?;
                        Ok(())
                    }),
            )
            .with(
                listen_to("^ping$")
                    .ignore_case()
                    .needs_mention()
                    .inline(|ctx, msg, _| async move {
                        ctx.reply(&msg, "pong").await?;
                        Ok(())
                    }),
            )
            .with(
                listen_to("^reply at (.*)$")
                    .ignore_case()
                    .needs_mention()
                    .description(
                        "Schedules a reply at the given local time, \
                         formatted like 20-02-2021_20:22:01.",
                    )
                    .threaded(|ctx, msg, groups| {
                        let trigger = groups.first().map(String::as_str).unwrap_or_default();
                        let fire_at = match parse_trigger_time(trigger) {
                            Ok(fire_at) => fire_at,
                            Err(e) => {
                                ctx.reply_blocking(&msg, &e.to_string())?;
                                return Ok(());
                            }
                        };

                        ctx.reply_blocking(&msg, &format!("Scheduled message at {trigger}!"))?;
                        let job_ctx = Arc::clone(&ctx);
                        ctx.scheduler().schedule_once(fire_at, move || {
                            job_ctx
                                .reply_blocking(&msg, "This is the scheduled message!")
                                .map(|_| ())
                        });
                        Ok(())
                    }),
            )
            .with(
                listen_to("^schedule every ([0-9]+)$")
                    .ignore_case()
                    .needs_mention()
                    .description(
                        "Schedules a reply every x seconds. Use `cancel jobs` to stop.",
                    )
                    .threaded(|ctx, msg, groups| {
                        let seconds: u64 = groups
                            .first()
                            .map(String::as_str)
                            .unwrap_or_default()
                            .parse()?;
                        let job_ctx = Arc::clone(&ctx);
                        let text = format!("Scheduled message every {seconds} seconds!");
                        let handle = ctx.scheduler().schedule_every(
                            Duration::from_secs(seconds.max(1)),
                            move || job_ctx.reply_blocking(&msg, &text).map(|_| JobOutcome::Continue),
                        );
                        info!(job_id = handle.id(), seconds, "Recurring reply scheduled");
                        Ok(())
                    }),
            )
            .with(
                listen_to("^cancel jobs$")
                    .ignore_case()
                    .needs_mention()
                    .description("Cancels all scheduled jobs, recurring and one-time.")
                    .threaded(|ctx, msg, _| {
                        ctx.scheduler().clear();
                        ctx.reply_blocking(&msg, "Canceled all jobs.")?;
                        Ok(())
                    }),
            )
            .with(
                listen_to("^sleep ([0-9]+)$")
                    .needs_mention()
                    .description("Waits without blocking other handlers.")
                    .inline(|ctx, msg, groups| async move {
                        let seconds: u64 = groups
                            .first()
                            .map(String::as_str)
                            .unwrap_or_default()
                            .parse()?;
                        ctx.reply(&msg, &format!("Okay, I will be waiting {seconds} seconds."))
                            .await?;
                        tokio::time::sleep(Duration::from_secs(seconds)).await;
                        ctx.reply(&msg, "Done!").await?;
                        Ok(())
                    }),
            )
            .with(listen_to("add").command::<AddArgs, _>(|ctx, msg, args| {
                let sum: i64 = args.numbers.iter().sum();
                let text = if args.hex {
                    format!("{sum:#x}")
                } else {
                    sum.to_string()
                };
                ctx.reply_blocking(&msg, &text)?;
                Ok(())
            }))
    }
}

/// Parses `dd-mm-YYYY_HH:MM:SS` as local time.
///
/// Falls back to UTC when the local offset cannot be determined.
pub fn parse_trigger_time(input: &str) -> Result<SystemTime, time::error::Parse> {
    let format = format_description!("[day]-[month]-[year]_[hour]:[minute]:[second]");
    let naive = PrimitiveDateTime::parse(input.trim(), format)?;
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    Ok(naive.assume_offset(offset).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley::framework::PluginManager;

    #[test]
    fn test_parse_trigger_time() {
        let fire_at = parse_trigger_time("20-02-2021_20:22:01").unwrap();
        let since_epoch = fire_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        // 2021-02-20 20:22:01 give or take a day of offset.
        assert!((1_613_852_521 - 86_400..=1_613_852_521 + 86_400).contains(&since_epoch));
    }

    #[test]
    fn test_parse_trigger_time_rejects_other_formats() {
        assert!(parse_trigger_time("2021-02-20 20:22:01").is_err());
        assert!(parse_trigger_time("tomorrow").is_err());
    }

    #[test]
    fn test_add_args() {
        let args = AddArgs::try_parse_from(["add", "1", "-2", "--hex"]).unwrap();
        assert_eq!(args.numbers, vec![1, -2]);
        assert!(args.hex);
    }

    #[test]
    fn test_plugin_registers() {
        let mut manager = PluginManager::new();
        manager.register(ExamplePlugin).unwrap();
        assert_eq!(manager.message_listeners().len(), 11);
        assert!(manager.webhook_listeners().is_empty());
    }
}
