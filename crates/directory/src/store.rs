use async_trait::async_trait;

use attendo_common::types::ChannelKind;

use crate::{
    error::Result,
    model::{Agent, Contact, ContactChannelBinding, Queue, TenantSettings},
};

/// Tenant-scoped lookup of agents, queues and settings.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn agent(&self, tenant_id: &str, agent_id: &str) -> Result<Option<Agent>>;

    async fn queue(&self, tenant_id: &str, queue_id: &str) -> Result<Option<Queue>>;

    async fn upsert_agent(&self, agent: &Agent) -> Result<()>;

    async fn upsert_queue(&self, queue: &Queue) -> Result<()>;

    /// Settings for a tenant, falling back to defaults when none were saved.
    async fn tenant_settings(&self, tenant_id: &str) -> Result<TenantSettings>;

    async fn set_tenant_settings(&self, tenant_id: &str, settings: &TenantSettings)
        -> Result<()>;
}

/// Maps provider addresses to contacts and back.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Contact bound to `address` on `channel`, if any.
    async fn resolve_address(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        address: &str,
    ) -> Result<Option<ContactChannelBinding>>;

    /// Binding a contact holds on `channel`, if any.
    async fn resolve_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<ContactChannelBinding>>;

    /// Contact for an inbound address, creating the contact and binding on
    /// first sight. Returns the contact id.
    async fn ensure_binding(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        address: &str,
        display_name: Option<&str>,
    ) -> Result<String>;

    /// Point a contact's channel binding at `address`, replacing any previous
    /// address the contact held on that channel. Fails with a conflict when
    /// the address already identifies a different contact.
    async fn bind(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
        address: &str,
    ) -> Result<ContactChannelBinding>;

    async fn contact(&self, tenant_id: &str, contact_id: &str) -> Result<Option<Contact>>;

    async fn bindings_for_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<Vec<ContactChannelBinding>>;
}
