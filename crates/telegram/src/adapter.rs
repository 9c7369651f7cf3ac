use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    secrecy::ExposeSecret,
    teloxide::prelude::Requester,
    tracing::{info, warn},
};

use {
    attendo_channels::{
        ChannelAdapter, ChannelHealth, ChannelOutbound, ChannelStatus, Error, InboundSink, Result,
    },
    attendo_common::types::ChannelKind,
};

use crate::{
    bot, config::TelegramAccountConfig, outbound::TelegramOutbound, state::AccountStateMap,
};

/// How long a probe result stays fresh.
const PROBE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Telegram channel adapter. One instance manages every configured bot
/// account for the process.
pub struct TelegramAdapter {
    accounts: AccountStateMap,
    outbound: TelegramOutbound,
    sink: Arc<dyn InboundSink>,
    probe_cache: RwLock<HashMap<String, (ChannelHealth, Instant)>>,
}

impl TelegramAdapter {
    #[must_use]
    pub fn new(sink: Arc<dyn InboundSink>) -> Self {
        let accounts: AccountStateMap = Arc::new(RwLock::new(HashMap::new()));
        Self {
            outbound: TelegramOutbound {
                accounts: Arc::clone(&accounts),
            },
            accounts,
            sink,
            probe_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Ids of the accounts currently polling.
    #[must_use]
    pub fn account_ids(&self) -> Vec<String> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.keys().cloned().collect()
    }

    fn cached_probe(&self, account_id: &str) -> Option<ChannelHealth> {
        let cache = self.probe_cache.read().unwrap_or_else(|e| e.into_inner());
        cache
            .get(account_id)
            .and_then(|(health, at)| (at.elapsed() < PROBE_CACHE_TTL).then(|| health.clone()))
    }

    fn store_probe(&self, account_id: &str, health: ChannelHealth) {
        let mut cache = self.probe_cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(account_id.to_string(), (health, Instant::now()));
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn name(&self) -> &str {
        "Telegram"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let config: TelegramAccountConfig = serde_json::from_value(config)?;
        if config.token.expose_secret().is_empty() {
            return Err(Error::unavailable("telegram account has no bot token"));
        }
        if config.tenant_id.is_empty() {
            return Err(Error::unavailable("telegram account has no tenant"));
        }

        let already_running = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts.contains_key(account_id)
        };
        if already_running {
            self.stop_account(account_id).await?;
        }

        info!(account_id, tenant_id = %config.tenant_id, "starting telegram account");
        bot::start_polling(
            account_id.to_string(),
            config,
            Arc::clone(&self.accounts),
            Arc::clone(&self.sink),
        )
        .await?;
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        let state = {
            let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
            accounts.remove(account_id)
        };
        match state {
            Some(state) => {
                info!(account_id, "stopping telegram account");
                state.cancel.cancel();
            }
            None => warn!(account_id, "telegram account is not running"),
        }
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for TelegramAdapter {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealth> {
        if let Some(fresh) = self.cached_probe(account_id) {
            return Ok(fresh);
        }

        let state = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts
                .get(account_id)
                .map(|s| (s.bot.clone(), s.bot_username.clone()))
        };
        let Some((bot, username)) = state else {
            return Ok(ChannelHealth {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("account not started".to_string()),
            });
        };

        let health = match bot.get_me().await {
            Ok(me) => ChannelHealth {
                connected: true,
                account_id: account_id.to_string(),
                details: me
                    .username
                    .clone()
                    .or(username)
                    .map(|u| format!("Bot: @{u}")),
            },
            Err(err) => ChannelHealth {
                connected: false,
                account_id: account_id.to_string(),
                details: Some(format!("API error: {err}")),
            },
        };

        self.store_probe(account_id, health.clone());
        Ok(health)
    }
}
