//! Text returned to the agent by the `your_turn` tool

use std::time::Duration;
use yourturn_session::CollectionResult;

use crate::config::ToolConfig;

const HEADER: &str = "🔔 Notification sent! The user has been alerted.";
const FALLBACK_REASON: &str = "The agent needs your input";

/// Fill the question template with the tool's reason
pub fn render_question(template: &str, reason: &str) -> String {
    let reason = reason.trim();
    let reason = if reason.is_empty() {
        FALLBACK_REASON
    } else {
        reason
    };
    template.replace("${reason}", reason)
}

fn describe_timeout(timeout: Duration) -> Option<String> {
    match timeout.as_secs() {
        0 => None,
        secs if secs % 60 == 0 => Some(format!("{} minute timeout", secs / 60)),
        secs => Some(format!("{} second timeout", secs)),
    }
}

/// Build the tool result text for a finished collection
pub fn build_reply(
    reason: &str,
    result: &CollectionResult,
    tool: &ToolConfig,
    timeout: Duration,
) -> String {
    let mut message = HEADER.to_string();

    if !reason.trim().is_empty() {
        message.push_str(&format!("\n\n📝 Reason: {}", reason.trim()));
    }

    match (&result.response, &result.error) {
        (Some(response), _) => {
            message.push_str(&format!("\n\n✅ User Response: \"{}\"", response));
        }
        (None, Some(error)) => {
            message.push_str(&format!("\n\n❌ Reply channel error: {}", error));
        }
        (None, None) if result.attempted => match describe_timeout(timeout) {
            Some(timeout) => {
                message.push_str(&format!("\n\n⏰ No user response received ({})", timeout))
            }
            None => message.push_str("\n\n⏰ No user response received"),
        },
        (None, None) => {
            message.push_str("\n\n🔊 Alert only (no reply channel configured)");
        }
    }

    if !tool.post_instructions.trim().is_empty() {
        message.push_str("\n\n");
        message.push_str(tool.post_instructions.trim());
    }

    message
}
