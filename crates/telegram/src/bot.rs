use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, Bot, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    attendo_channels::{Error, InboundSink, Result},
    attendo_common::types::ChannelKind,
};

use crate::{
    config::TelegramAccountConfig,
    inbound,
    state::{AccountState, AccountStateMap},
};

/// Delay before re-polling after a transport error.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Connect one bot account and start its polling loop.
///
/// Verifies the token with `getMe`, registers the account state and spawns a
/// background task that feeds updates into the sink until the returned token
/// is cancelled.
pub(crate) async fn start_polling(
    account_id: String,
    config: TelegramAccountConfig,
    accounts: AccountStateMap,
    sink: Arc<dyn InboundSink>,
) -> Result<CancellationToken> {
    // The HTTP client must outwait the long poll, or it aborts requests
    // Telegram is still holding open.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
        .build()
        .map_err(|e| Error::external("build telegram http client", e))?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    let me = bot
        .get_me()
        .await
        .map_err(|e| Error::external("verify telegram credentials", e))?;
    let bot_username = me.username.clone();

    // Long polling and webhooks are mutually exclusive on the Bot API.
    bot.delete_webhook()
        .await
        .map_err(|e| Error::external("clear telegram webhook", e))?;

    info!(account_id, username = ?bot_username, "telegram bot connected");

    let cancel = CancellationToken::new();
    let tenant_id = config.tenant_id.clone();
    let state = AccountState {
        bot: bot.clone(),
        bot_username,
        account_id: account_id.clone(),
        tenant_id: tenant_id.clone(),
        cancel: cancel.clone(),
    };
    {
        let mut map = accounts.write().unwrap_or_else(|e| e.into_inner());
        map.insert(account_id.clone(), state);
    }

    let loop_cancel = cancel.clone();
    let poll_timeout = config.poll_timeout_secs;
    tokio::spawn(async move {
        info!(account_id, "telegram polling started");
        let mut offset: i32 = 0;

        loop {
            if loop_cancel.is_cancelled() {
                info!(account_id, "telegram polling stopped");
                break;
            }

            let result = bot
                .get_updates()
                .offset(offset)
                .timeout(poll_timeout)
                .allowed_updates(vec![AllowedUpdate::Message])
                .await;

            match result {
                Ok(updates) => {
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                let Some(inbound) =
                                    inbound::normalize(&account_id, &tenant_id, &msg)
                                else {
                                    debug!(
                                        account_id,
                                        chat_id = msg.chat.id.0,
                                        "skipping update without content"
                                    );
                                    continue;
                                };
                                sink.inbound_message(inbound).await;
                            }
                            other => {
                                debug!(account_id, kind = ?other, "ignoring non-message update");
                            }
                        }
                    }
                }
                Err(err) => {
                    // Another process polling the same token takes the
                    // account over; keeping both alive splits updates.
                    if matches!(
                        &err,
                        RequestError::Api(ApiError::TerminatedByOtherGetUpdates)
                    ) {
                        warn!(account_id, "telegram polling conflict, stopping account");
                        sink.account_failed(
                            ChannelKind::Telegram,
                            &account_id,
                            "another bot instance is polling with this token",
                        )
                        .await;
                        loop_cancel.cancel();
                        break;
                    }
                    warn!(account_id, error = %err, "telegram getUpdates failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    });

    Ok(cancel)
}
