//! Telegram adapter over `teloxide`: long polling in, HTML replies out, and
//! the Bot API behind [`ChannelActions`].

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, Chat, ChatAction, MessageId, ParseMode, ReplyParameters, UpdateKind};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use clawbot_agent::tools::{ChannelActions, ChatInfo, UserInfo};
use clawbot_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use clawbot_core::session::SessionManager;
use clawbot_core::utils::truncate_string;

use crate::base::Channel;
use crate::commands::{self, BotStatus, Command};
use crate::formatting::{markdown_to_telegram_html, split_message, MAX_CHUNK_CHARS};

pub const CHANNEL_NAME: &str = "telegram";

fn chat_kind(chat: &Chat) -> &'static str {
    if chat.is_private() {
        "private"
    } else if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else {
        "channel"
    }
}

fn message_id(id: i64) -> anyhow::Result<MessageId> {
    Ok(MessageId(i32::try_from(id).context("message id out of range")?))
}

/// Send `markdown` as Telegram HTML, split to size. Falls back to plain
/// text when Telegram rejects the markup.
async fn deliver(bot: &Bot, chat: ChatId, reply_to: Option<MessageId>, markdown: &str) -> anyhow::Result<()> {
    let html = markdown_to_telegram_html(markdown);
    for chunk in split_message(&html, MAX_CHUNK_CHARS) {
        let mut request = bot.send_message(chat, chunk).parse_mode(ParseMode::Html);
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(id));
        }
        if let Err(e) = request.await {
            debug!(error = %e, "HTML send rejected, retrying as plain text");
            for plain in split_message(markdown, MAX_CHUNK_CHARS) {
                bot.send_message(chat, plain).await?;
            }
            return Ok(());
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────
// TelegramChannel
// ─────────────────────────────────────────────

pub struct TelegramChannel {
    bot: Bot,
    bus: Arc<MessageBus>,
    sessions: Arc<SessionManager>,
    allowed_users: Vec<String>,
    status: BotStatus,
    shutdown: Notify,
}

impl TelegramChannel {
    pub fn new(token: &str, bus: Arc<MessageBus>, sessions: Arc<SessionManager>, allowed_users: Vec<String>) -> Self {
        Self {
            bot: Bot::new(token),
            bus,
            sessions,
            allowed_users,
            status: BotStatus::default(),
            shutdown: Notify::new(),
        }
    }

    /// What `/status` reports.
    pub fn with_status(mut self, status: BotStatus) -> Self {
        self.status = status;
        self
    }

    /// Bot API operations sharing this channel's bot.
    pub fn actions(&self) -> TelegramActions {
        TelegramActions::new(self.bot.clone())
    }

    async fn handle_update(&self, update: &Update) {
        let UpdateKind::Message(message) = &update.kind else {
            return;
        };
        let Some(user) = message.from.as_ref() else {
            return;
        };
        let Some(text) = message.text() else {
            debug!("ignoring non-text telegram message");
            return;
        };

        let user_id = user.id.0.to_string();
        let chat_id = message.chat.id.0.to_string();
        if !commands::is_allowed(&self.allowed_users, &user_id, user.username.as_deref()) {
            warn!(user = %user_id, chat = %chat_id, "telegram message from user not on the allow-list, ignoring");
            return;
        }

        if let Some(command) = commands::parse_command(text) {
            self.handle_command(command, message, &user.first_name).await;
            return;
        }

        info!(
            user = %user_id,
            chat = %chat_id,
            preview = %truncate_string(text, 50),
            "telegram message"
        );
        if let Err(e) = self.bot.send_chat_action(message.chat.id, ChatAction::Typing).await {
            debug!(error = %e, "typing indicator failed");
        }

        let inbound = InboundMessage::new(CHANNEL_NAME, &user_id, &chat_id, text)
            .with_meta("username", user.username.clone().unwrap_or_default())
            .with_meta("first_name", user.first_name.clone())
            .with_meta("chat_type", chat_kind(&message.chat))
            .with_meta("message_id", message.id.0.to_string());
        if let Err(e) = self.bus.publish_inbound(inbound).await {
            error!(error = %e, "failed to publish telegram message");
        }
    }

    async fn handle_command(&self, command: Command, message: &Message, first_name: &str) {
        let reply = match command {
            Command::Start => commands::welcome_text(first_name),
            Command::Help => commands::HELP_TEXT.to_string(),
            Command::Status => commands::status_text(&self.status),
            Command::Reset => {
                let key = format!("{CHANNEL_NAME}:{}", message.chat.id.0);
                self.sessions.clear(&key);
                info!(session = %key, "conversation reset");
                commands::RESET_REPLY.to_string()
            }
            Command::Unknown(name) => {
                debug!(command = %name, "unknown telegram command");
                return;
            }
        };
        if let Err(e) = deliver(&self.bot, message.chat.id, Some(message.id), &reply).await {
            error!(error = %e, "failed to answer telegram command");
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> anyhow::Result<()> {
        let menu = vec![
            BotCommand::new("start", "Welcome message"),
            BotCommand::new("help", "Show available commands"),
            BotCommand::new("status", "Bot status and features"),
            BotCommand::new("reset", "Clear conversation history"),
        ];
        if let Err(e) = self.bot.set_my_commands(menu).await {
            warn!(error = %e, "failed to set telegram command menu");
        }
        info!("telegram bot connected, polling for updates");

        let mut offset: i32 = 0;
        loop {
            tokio::select! {
                updates = self.bot.get_updates().offset(offset).timeout(30).send() => {
                    match updates {
                        Ok(updates) => {
                            for update in &updates {
                                offset = (update.id.0 as i32).wrapping_add(1);
                                self.handle_update(update).await;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "telegram polling error");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
                _ = self.shutdown.notified() => break,
            }
        }
        info!("telegram polling stopped");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.shutdown.notify_one();
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
        let chat: i64 = msg
            .chat_id
            .parse()
            .with_context(|| format!("invalid telegram chat id: {}", msg.chat_id))?;
        let reply_to = msg
            .reply_to
            .as_deref()
            .and_then(|id| id.parse::<i32>().ok())
            .map(MessageId);
        deliver(&self.bot, ChatId(chat), reply_to, &msg.content).await?;
        debug!(chat_id = chat, "telegram reply sent");
        Ok(())
    }
}

// ─────────────────────────────────────────────
// TelegramActions
// ─────────────────────────────────────────────

#[derive(Clone)]
pub struct TelegramActions {
    bot: Bot,
}

impl TelegramActions {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChannelActions for TelegramActions {
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        info!(chat_id, "sent message");
        Ok(())
    }

    async fn get_user_info(&self, user_id: i64) -> anyhow::Result<Option<UserInfo>> {
        // No getUser in the Bot API; a private chat carries the user's profile.
        match self.bot.get_chat(ChatId(user_id)).await {
            Ok(chat) => Ok(Some(UserInfo {
                id: chat.id.0,
                username: chat.username().map(str::to_string),
                first_name: chat.first_name().unwrap_or_default().to_string(),
                last_name: chat.last_name().map(str::to_string),
            })),
            Err(e) => {
                warn!(user_id, error = %e, "failed to get user info");
                Ok(None)
            }
        }
    }

    async fn get_chat_info(&self, chat_id: i64) -> anyhow::Result<Option<ChatInfo>> {
        match self.bot.get_chat(ChatId(chat_id)).await {
            Ok(chat) => {
                let kind = if chat.is_private() {
                    "private"
                } else if chat.is_supergroup() {
                    "supergroup"
                } else if chat.is_group() {
                    "group"
                } else {
                    "channel"
                };
                Ok(Some(ChatInfo {
                    id: chat.id.0,
                    kind: kind.to_string(),
                    title: chat.title().map(str::to_string),
                    username: chat.username().map(str::to_string),
                }))
            }
            Err(e) => {
                warn!(chat_id, error = %e, "failed to get chat info");
                Ok(None)
            }
        }
    }

    async fn get_chat_member_count(&self, chat_id: i64) -> anyhow::Result<u32> {
        Ok(self.bot.get_chat_member_count(ChatId(chat_id)).await?)
    }

    async fn get_chat_administrators(&self, chat_id: i64) -> anyhow::Result<Vec<UserInfo>> {
        let admins = self.bot.get_chat_administrators(ChatId(chat_id)).await?;
        Ok(admins
            .into_iter()
            .map(|member| UserInfo {
                id: member.user.id.0 as i64,
                username: member.user.username,
                first_name: member.user.first_name,
                last_name: member.user.last_name,
            })
            .collect())
    }

    async fn forward_message(&self, from_chat_id: i64, to_chat_id: i64, id: i64) -> anyhow::Result<()> {
        self.bot
            .forward_message(ChatId(to_chat_id), ChatId(from_chat_id), message_id(id)?)
            .await?;
        info!(from_chat_id, to_chat_id, message_id = id, "forwarded message");
        Ok(())
    }

    async fn pin_message(&self, chat_id: i64, id: i64) -> anyhow::Result<()> {
        self.bot.pin_chat_message(ChatId(chat_id), message_id(id)?).await?;
        info!(chat_id, message_id = id, "pinned message");
        Ok(())
    }

    async fn unpin_message(&self, chat_id: i64, id: Option<i64>) -> anyhow::Result<()> {
        let mut request = self.bot.unpin_chat_message(ChatId(chat_id));
        if let Some(id) = id {
            request = request.message_id(message_id(id)?);
        }
        request.await?;
        info!(chat_id, "unpinned message");
        Ok(())
    }
}
