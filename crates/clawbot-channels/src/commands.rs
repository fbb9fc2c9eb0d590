//! Bot commands and access control, independent of any bot library.

/// A slash command the adapter answers itself instead of the agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Reset,
    Unknown(String),
}

/// Parse `/command@botname args` into a [`Command`]. `None` for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let first = text.trim_start().split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    Some(match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "status" => Command::Status,
        "reset" => Command::Reset,
        other => Command::Unknown(other.to_string()),
    })
}

pub const RESET_REPLY: &str = "🧹 Conversation history cleared! Let's start fresh.";

pub const HELP_TEXT: &str = "📚 **Available Commands**

**General:**
• `/start` - Welcome message
• `/help` - This help message
• `/status` - Bot status and features

**Conversation:**
• `/reset` - Clear your conversation history

**Tips:**
• Ask about your GitHub repos or issues
• Query your Notion pages and databases
• I learn from our conversations!";

pub fn welcome_text(first_name: &str) -> String {
    format!(
        "👋 Hello {first_name}!

I'm **Clawbot**, your AI assistant:

🧠 **Memory**: I remember our conversations
🔍 **RAG**: I can search through chat history
🔧 **Tools**: I can interact with GitHub, Notion, and more

**Commands:**
• `/help` - Show all commands
• `/status` - Check my status
• `/reset` - Clear conversation history

Just send me a message to start chatting!"
    )
}

/// What `/status` reports.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BotStatus {
    pub model: String,
    pub memory_enabled: bool,
    pub rag_enabled: bool,
    pub tool_count: usize,
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "✅ Enabled"
    } else {
        "❌ Disabled"
    }
}

pub fn status_text(status: &BotStatus) -> String {
    let tools = if status.tool_count > 0 {
        format!("• Tools: {} available", status.tool_count)
    } else {
        "• Tools: Not configured".to_string()
    };
    [
        "🤖 **Clawbot Status**\n".to_string(),
        format!("• Model: `{}`", status.model),
        format!("• Memory: {}", enabled(status.memory_enabled)),
        format!("• RAG: {}", enabled(status.rag_enabled)),
        tools,
    ]
    .join("\n")
}

/// An empty list admits everyone; otherwise the user id or username must be listed.
/// Usernames match with or without a leading `@`.
pub fn is_allowed(allowed: &[String], user_id: &str, username: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    allowed.iter().any(|entry| {
        let entry = entry.trim();
        entry == user_id
            || username
                .filter(|u| !u.is_empty())
                .is_some_and(|u| entry.trim_start_matches('@').eq_ignore_ascii_case(u))
    })
}
