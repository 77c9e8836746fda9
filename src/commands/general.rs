use tracing::{info, warn};

use crate::messages;
use crate::{Context, Error};

/// Longest reply Discord accepts, minus room for the code fence
const MAX_LOG_REPLY: usize = 1900;
const DEFAULT_LOG_LINES: usize = 20;

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    ctx.send(
        poise::CreateReply::default()
            .content("Pong! Bot is working!")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// How to connect and renew
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(messages::help_text())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show recent log lines (operators only)
#[poise::command(prefix_command, slash_command)]
pub async fn logs(
    ctx: Context<'_>,
    #[description = "Number of lines to show"] count: Option<u32>,
) -> Result<(), Error> {
    let data = ctx.data();
    if !data.workflow.is_operator(ctx.author().id.get()) {
        warn!("Non-operator {} requested logs", ctx.author().id);
        ctx.send(
            poise::CreateReply::default()
                .content("This command is for operators only.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let lines: Vec<String> = data
        .log_buffer
        .get_recent(count.map_or(DEFAULT_LOG_LINES, |c| c as usize))
        .iter()
        .map(|entry| entry.format())
        .collect();

    let content = if lines.is_empty() {
        "No log entries yet.".to_string()
    } else {
        format!("```\n{}\n```", tail_within(&lines, MAX_LOG_REPLY))
    };
    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Join the newest lines that fit in `limit` bytes, keeping chronological order
fn tail_within(lines: &[String], limit: usize) -> String {
    let mut used = 0;
    let mut kept = Vec::new();
    for line in lines.iter().rev() {
        if used + line.len() + 1 > limit {
            // An oversized newest line is cut rather than dropped
            if kept.is_empty() {
                kept.push(truncate_at_char(line, limit));
            }
            break;
        }
        used += line.len() + 1;
        kept.push(line.as_str());
    }
    kept.reverse();
    kept.join("\n")
}

fn truncate_at_char(line: &str, limit: usize) -> &str {
    let mut end = limit.min(line.len());
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_newest_lines() {
        let lines: Vec<String> = (1..=5).map(|i| format!("line {}", i)).collect();
        assert_eq!(tail_within(&lines, 14), "line 4\nline 5");
        assert_eq!(tail_within(&lines, 1000).lines().count(), 5);
    }

    #[test]
    fn test_oversized_line_is_truncated() {
        let lines = vec!["short".to_string(), "x".repeat(2000)];
        let tail = tail_within(&lines, MAX_LOG_REPLY);
        assert_eq!(tail.len(), MAX_LOG_REPLY);
        assert!(tail.chars().all(|c| c == 'x'));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let lines = vec!["é".repeat(10)];
        assert_eq!(tail_within(&lines, 5), "éé");
    }
}
