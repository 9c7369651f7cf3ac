use std::future::Future;

use {
    async_trait::async_trait,
    teloxide::{
        Bot, RequestError,
        payloads::{SendAudioSetters, SendDocumentSetters, SendPhotoSetters, SendVideoSetters},
        prelude::Requester,
        types::{ChatAction, ChatId, InputFile, MessageId},
    },
    tracing::{debug, warn},
};

use {
    attendo_channels::{
        ChannelOutbound, DeleteOutcome, DeliveryOutcome, Error, OutboundMessage, Result,
    },
    attendo_common::types::{ChannelKind, MediaKind, MediaRef},
};

use crate::state::AccountStateMap;

/// Retry budget for rate limited requests.
const RETRY_AFTER_MAX_RETRIES: u32 = 4;

/// Sends agent messages through the Bot API.
pub(crate) struct TelegramOutbound {
    pub(crate) accounts: AccountStateMap,
}

impl TelegramOutbound {
    fn bot_for(&self, account_id: &str) -> Result<Bot> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .map(|state| state.bot.clone())
            .ok_or_else(|| Error::unknown_account(account_id))
    }
}

#[async_trait]
impl ChannelOutbound for TelegramOutbound {
    async fn send(&self, outbound: &OutboundMessage) -> Result<DeliveryOutcome> {
        let bot = self.bot_for(&outbound.account_id)?;
        let chat = parse_chat(&outbound.address)?;
        let account_id = outbound.account_id.as_str();
        let content = outbound.content.as_str();

        let message = match &outbound.media {
            None => {
                with_rate_limit_retry(account_id, "sendMessage", || {
                    let req = bot.send_message(chat, content);
                    async move { req.await }
                })
                .await
            }
            Some(media) => {
                let file = media_file(media)?;
                let caption = (!content.is_empty()).then_some(content);
                match media.kind {
                    MediaKind::Image => {
                        with_rate_limit_retry(account_id, "sendPhoto", || {
                            let mut req = bot.send_photo(chat, file.clone());
                            if let Some(caption) = caption {
                                req = req.caption(caption);
                            }
                            async move { req.await }
                        })
                        .await
                    }
                    MediaKind::Audio => {
                        with_rate_limit_retry(account_id, "sendAudio", || {
                            let mut req = bot.send_audio(chat, file.clone());
                            if let Some(caption) = caption {
                                req = req.caption(caption);
                            }
                            async move { req.await }
                        })
                        .await
                    }
                    MediaKind::Video => {
                        with_rate_limit_retry(account_id, "sendVideo", || {
                            let mut req = bot.send_video(chat, file.clone());
                            if let Some(caption) = caption {
                                req = req.caption(caption);
                            }
                            async move { req.await }
                        })
                        .await
                    }
                    MediaKind::Document => {
                        with_rate_limit_retry(account_id, "sendDocument", || {
                            let mut req = bot.send_document(chat, file.clone());
                            if let Some(caption) = caption {
                                req = req.caption(caption);
                            }
                            async move { req.await }
                        })
                        .await
                    }
                    MediaKind::Sticker => {
                        let sent = with_rate_limit_retry(account_id, "sendSticker", || {
                            let req = bot.send_sticker(chat, file.clone());
                            async move { req.await }
                        })
                        .await;
                        // Stickers take no caption, so any text rides along
                        // as its own message.
                        if sent.is_ok() && !content.is_empty() {
                            if let Err(err) =
                                with_rate_limit_retry(account_id, "sendMessage", || {
                                    let req = bot.send_message(chat, content);
                                    async move { req.await }
                                })
                                .await
                            {
                                warn!(account_id, error = %err, "text alongside sticker failed");
                            }
                        }
                        sent
                    }
                }
            }
        }
        .map_err(transport_error)?;

        debug!(
            account_id,
            chat_id = %outbound.address,
            provider_message_id = message.id.0,
            "telegram message sent"
        );
        Ok(DeliveryOutcome {
            provider_message_id: Some(message.id.0.to_string()),
        })
    }

    async fn delete_message(
        &self,
        account_id: &str,
        address: &str,
        provider_message_id: &str,
    ) -> Result<DeleteOutcome> {
        let bot = self.bot_for(account_id)?;
        let chat = parse_chat(address)?;
        let message_id = provider_message_id
            .parse::<i32>()
            .map(MessageId)
            .map_err(|_| {
                Error::transport(format!(
                    "malformed telegram message id: {provider_message_id}"
                ))
            })?;

        with_rate_limit_retry(account_id, "deleteMessage", || {
            let req = bot.delete_message(chat, message_id);
            async move { req.await }
        })
        .await
        .map_err(transport_error)?;

        Ok(DeleteOutcome::Deleted)
    }

    async fn send_typing(&self, account_id: &str, address: &str) -> Result<()> {
        let bot = self.bot_for(account_id)?;
        let chat = parse_chat(address)?;

        with_rate_limit_retry(account_id, "sendChatAction", || {
            let req = bot.send_chat_action(chat, ChatAction::Typing);
            async move { req.await }
        })
        .await
        .map_err(transport_error)?;

        Ok(())
    }
}

fn parse_chat(address: &str) -> Result<ChatId> {
    address
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| Error::invalid_address(ChannelKind::Telegram, address))
}

fn media_file(media: &MediaRef) -> Result<InputFile> {
    let url = media
        .url
        .parse::<url::Url>()
        .map_err(|_| Error::transport(format!("media url is not fetchable: {}", media.url)))?;
    Ok(InputFile::url(url))
}

fn transport_error(err: RequestError) -> Error {
    Error::transport(err.to_string())
}

/// Run one Bot API call, honoring `RetryAfter` rate limit replies.
///
/// Any other error goes back to the caller untouched.
async fn with_rate_limit_retry<T, F, Fut>(
    account_id: &str,
    operation: &'static str,
    mut request: F,
) -> std::result::Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestError>>,
{
    let mut attempt = 0;
    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(RequestError::RetryAfter(wait)) if attempt < RETRY_AFTER_MAX_RETRIES => {
                attempt += 1;
                warn!(
                    account_id,
                    operation,
                    attempt,
                    wait_secs = wait.duration().as_secs(),
                    "telegram rate limit, backing off"
                );
                tokio::time::sleep(wait.duration()).await;
            }
            Err(err) => return Err(err),
        }
    }
}
