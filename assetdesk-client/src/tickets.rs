//! Ticket edits, worknotes and dashboard statistics.
//!
//! Authorship is always an explicit [`Principal`] argument. The ticket edit
//! flow records a mandatory worknote after the update is committed.

use crate::cache::{CachedView, Freshness, ViewCache};
use crate::error::log_failure;
use crate::policy::RequestPolicy;
use assetdesk_core::{
    DeskError, DeskResult, EntityIdType, EntityKind, EntityRow, Mutation, OperatorTicketsStats, Principal,
    Ticket, TicketId, TicketInsert, TicketRecord, TicketUpdate, TicketsStats, ValidationError,
    ViewKey, Worknote, WorknoteInsert,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything the dashboard charts read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub resolved: Vec<TicketsStats>,
    pub open: Vec<TicketsStats>,
    pub operators: Vec<OperatorTicketsStats>,
}

/// Remote ticket and worknote operations.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get_ticket(&self, id: TicketId) -> DeskResult<Ticket>;

    async fn create_ticket(&self, insert: &TicketInsert) -> DeskResult<TicketRecord>;

    async fn update_ticket(&self, id: TicketId, update: &TicketUpdate) -> DeskResult<TicketRecord>;

    async fn delete_ticket(&self, id: TicketId) -> DeskResult<()>;

    async fn list_worknotes(&self, ticket_id: TicketId) -> DeskResult<Vec<Worknote>>;

    async fn add_worknote(&self, worknote: &WorknoteInsert) -> DeskResult<Worknote>;

    async fn resolved_stats(&self) -> DeskResult<Vec<TicketsStats>>;

    async fn open_stats(&self) -> DeskResult<Vec<TicketsStats>>;

    async fn operator_stats(&self) -> DeskResult<Vec<OperatorTicketsStats>>;
}

pub struct TicketDesk<S> {
    store: Arc<S>,
    cache: Arc<ViewCache>,
    policy: RequestPolicy,
}

impl<S: TicketStore> TicketDesk<S> {
    pub fn new(store: Arc<S>, cache: Arc<ViewCache>, policy: RequestPolicy) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    /// Read-through fetch of one ticket.
    pub async fn ticket(&self, id: TicketId, freshness: Freshness) -> DeskResult<Ticket> {
        let key = ViewKey::Detail(EntityKind::Ticket, id.as_uuid());
        let cached = self
            .cache
            .get(key, None, freshness)
            .and_then(|hit| {
                hit.filter_map(|view| match view {
                    CachedView::Entity(EntityRow::Ticket(ticket)) => Some(ticket),
                    _ => None,
                })
            });
        if let Some(hit) = cached {
            return Ok(hit.into_value());
        }

        let since = self.cache.watermark(key);
        let ticket = self
            .policy
            .run("tickets", self.store.get_ticket(id))
            .await
            .inspect_err(|err| log_failure("get ticket", err))?;
        self.cache
            .store(since, None, CachedView::Entity(EntityRow::Ticket(ticket.clone())));
        Ok(ticket)
    }

    pub async fn create(&self, insert: &TicketInsert) -> DeskResult<TicketRecord> {
        insert
            .validate()
            .inspect_err(|err| log_failure("create ticket", err))?;
        let record = self
            .policy
            .run("tickets", self.store.create_ticket(insert))
            .await
            .inspect_err(|err| log_failure("create ticket", err))?;
        self.cache.apply(&Mutation::CreateTicket);
        tracing::info!(ticket_id = %record.id, number = record.number, "Ticket created");
        Ok(record)
    }

    /// Update a ticket and record why, as `principal`.
    ///
    /// The note is required and checked before anything is sent. The update
    /// is committed first; if recording the note then fails, the ticket views
    /// are still invalidated and the note's error is returned.
    pub async fn update_with_worknote(
        &self,
        principal: Principal,
        ticket_id: TicketId,
        update: &TicketUpdate,
        note: &str,
    ) -> DeskResult<(TicketRecord, Worknote)> {
        let worknote = WorknoteInsert {
            ticket_id,
            note: note.trim().to_string(),
            author_id: principal.user_id,
        };
        let checked = if worknote.note.is_empty() {
            Err(ValidationError::required("worknote").into())
        } else {
            update.validate().and_then(|_| worknote.validate())
        };
        checked.inspect_err(|err| log_failure("update ticket", err))?;

        let record = self
            .policy
            .run("tickets", self.store.update_ticket(ticket_id, update))
            .await
            .inspect_err(|err| log_failure("update ticket", err))?;
        self.cache.apply(&Mutation::UpdateTicket(ticket_id));
        tracing::info!(%ticket_id, author_id = %principal.user_id, "Ticket updated");

        let note = self
            .policy
            .run("worknotes", self.store.add_worknote(&worknote))
            .await
            .inspect_err(|err| log_failure("add worknote", err))?;
        self.cache.apply(&Mutation::AddWorknote(ticket_id));
        tracing::info!(%ticket_id, worknote_id = %note.id, "Worknote recorded");

        Ok((record, note))
    }

    pub async fn add_worknote(
        &self,
        principal: Principal,
        ticket_id: TicketId,
        note: &str,
    ) -> DeskResult<Worknote> {
        let worknote = WorknoteInsert {
            ticket_id,
            note: note.trim().to_string(),
            author_id: principal.user_id,
        };
        worknote
            .validate()
            .inspect_err(|err| log_failure("add worknote", err))?;
        let created = self
            .policy
            .run("worknotes", self.store.add_worknote(&worknote))
            .await
            .inspect_err(|err| log_failure("add worknote", err))?;
        self.cache.apply(&Mutation::AddWorknote(ticket_id));
        tracing::info!(%ticket_id, worknote_id = %created.id, "Worknote recorded");
        Ok(created)
    }

    pub async fn delete(&self, ticket_id: TicketId) -> DeskResult<()> {
        self.policy
            .run("tickets", self.store.delete_ticket(ticket_id))
            .await
            .inspect_err(|err| log_failure("delete ticket", err))?;
        self.cache.apply(&Mutation::DeleteTicket(ticket_id));
        tracing::info!(%ticket_id, "Ticket deleted");
        Ok(())
    }

    pub async fn worknotes(&self, ticket_id: TicketId, freshness: Freshness) -> DeskResult<Vec<Worknote>> {
        let key = ViewKey::TicketWorknotes(ticket_id);
        let cached = self.cache.get(key, None, freshness).and_then(|hit| {
            hit.filter_map(|view| match view {
                CachedView::Worknotes(notes) => Some(notes),
                _ => None,
            })
        });
        if let Some(hit) = cached {
            return Ok(hit.into_value());
        }

        let since = self.cache.watermark(key);
        let notes = self
            .policy
            .run("worknotes", self.store.list_worknotes(ticket_id))
            .await
            .inspect_err(|err| log_failure("list worknotes", err))?;
        self.cache
            .store(since, None, CachedView::Worknotes(notes.clone()));
        Ok(notes)
    }

    pub async fn dashboard(&self, freshness: Freshness) -> DeskResult<DashboardStats> {
        let cached = self
            .cache
            .get(ViewKey::Dashboard, None, freshness)
            .and_then(|hit| {
                hit.filter_map(|view| match view {
                    CachedView::Dashboard(stats) => Some(stats),
                    _ => None,
                })
            });
        if let Some(hit) = cached {
            return Ok(hit.into_value());
        }

        let since = self.cache.watermark(ViewKey::Dashboard);
        let fetch = async {
            let (resolved, open, operators) = tokio::try_join!(
                self.store.resolved_stats(),
                self.store.open_stats(),
                self.store.operator_stats(),
            )?;
            Ok::<_, DeskError>(DashboardStats {
                resolved,
                open,
                operators,
            })
        };
        let stats = self
            .policy
            .run("tickets/stats", fetch)
            .await
            .inspect_err(|err| log_failure("load dashboard", err))?;
        self.cache
            .store(since, None, CachedView::Dashboard(stats.clone()));
        Ok(stats)
    }
}
