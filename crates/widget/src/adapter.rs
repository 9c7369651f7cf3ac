use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

use {
    attendo_channels::{
        ChannelAdapter, ChannelHealth, ChannelOutbound, ChannelStatus, DeleteOutcome,
        DeliveryOutcome, Error, OutboundMessage, Result,
    },
    attendo_common::{new_id, now_ms, types::ChannelKind},
};

use crate::{frames::WidgetFrame, registry::WidgetRegistry};

/// Configuration for one widget account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetAccountConfig {
    /// Tenant whose conversations this widget serves.
    pub tenant_id: String,
}

type AccountMap = Arc<RwLock<HashMap<String, WidgetAccountConfig>>>;

/// In-process chat-widget adapter. Sessions connect through the gateway's
/// widget socket and live in the shared registry; sending is a queue push,
/// never a network call.
pub struct WidgetAdapter {
    registry: Arc<WidgetRegistry>,
    accounts: AccountMap,
    outbound: WidgetOutbound,
}

impl WidgetAdapter {
    #[must_use]
    pub fn new(registry: Arc<WidgetRegistry>) -> Self {
        let accounts: AccountMap = Arc::new(RwLock::new(HashMap::new()));
        Self {
            outbound: WidgetOutbound {
                registry: Arc::clone(&registry),
                accounts: Arc::clone(&accounts),
            },
            registry,
            accounts,
        }
    }

    /// Tenant an account serves, when the account is started.
    #[must_use]
    pub fn tenant_of(&self, account_id: &str) -> Option<String> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(account_id).map(|c| c.tenant_id.clone())
    }
}

#[async_trait]
impl ChannelAdapter for WidgetAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Widget
    }

    fn name(&self) -> &str {
        "Web widget"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let config: WidgetAccountConfig = serde_json::from_value(config)?;
        if config.tenant_id.is_empty() {
            return Err(Error::unavailable("widget account has no tenant"));
        }

        info!(account_id, tenant_id = %config.tenant_id, "starting widget account");
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.insert(account_id.to_string(), config);
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        let removed = {
            let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
            accounts.remove(account_id)
        };
        match removed {
            Some(_) => {
                info!(account_id, "stopping widget account");
                self.registry.drop_account(account_id);
            }
            None => warn!(account_id, "widget account is not running"),
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

struct WidgetOutbound {
    registry: Arc<WidgetRegistry>,
    accounts: AccountMap,
}

impl WidgetOutbound {
    fn check_account(&self, account_id: &str) -> Result<()> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        if accounts.contains_key(account_id) {
            Ok(())
        } else {
            Err(Error::unknown_account(account_id))
        }
    }
}

#[async_trait]
impl ChannelOutbound for WidgetOutbound {
    async fn send(&self, outbound: &OutboundMessage) -> Result<DeliveryOutcome> {
        self.check_account(&outbound.account_id)?;

        let provider_message_id = new_id();
        self.registry.push(
            &outbound.address,
            WidgetFrame::Message {
                provider_message_id: provider_message_id.clone(),
                content: outbound.content.clone(),
                media: outbound.media.clone(),
                sent_at: now_ms(),
            },
        )?;

        debug!(
            account_id = %outbound.account_id,
            session_id = %outbound.address,
            provider_message_id,
            "widget frame queued"
        );
        Ok(DeliveryOutcome {
            provider_message_id: Some(provider_message_id),
        })
    }

    async fn delete_message(
        &self,
        account_id: &str,
        address: &str,
        provider_message_id: &str,
    ) -> Result<DeleteOutcome> {
        self.check_account(account_id)?;
        self.registry.push(
            address,
            WidgetFrame::Retract {
                provider_message_id: provider_message_id.to_string(),
            },
        )?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn send_typing(&self, account_id: &str, address: &str) -> Result<()> {
        self.check_account(account_id)?;
        // Typing toward a session that just left is not worth an error.
        if let Err(err) = self.registry.push(address, WidgetFrame::Typing) {
            debug!(account_id, session_id = address, error = %err, "typing frame dropped");
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelStatus for WidgetAdapter {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealth> {
        let configured = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts.contains_key(account_id)
        };
        if !configured {
            return Ok(ChannelHealth {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("account not started".to_string()),
            });
        }

        let sessions = self.registry.session_count(account_id);
        Ok(ChannelHealth {
            connected: true,
            account_id: account_id.to_string(),
            details: Some(format!("{sessions} active sessions")),
        })
    }
}
