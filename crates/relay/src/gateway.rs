//! In-memory persistence gateway.
//!
//! Stands in for the external durable store in the dev server and in
//! tests; supports failure injection so the rollback path can be
//! exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use partyline_core::{ChatMessage, DeliveryError, DeliveryResult, PersistenceGateway};

const DEFAULT_PAGE_SIZE: usize = 50;

/// `PersistenceGateway` backed by a per-room `Vec` behind a mutex.
#[derive(Default)]
pub struct MemoryGateway {
    messages: Mutex<HashMap<String, Vec<ChatMessage>>>,
    fail_next: AtomicBool,
    failing: AtomicBool,
    page_size: usize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            fail_next: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Fail exactly the next `save_message` call.
    pub fn fail_next_save(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Fail every save until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of messages stored for a room.
    pub async fn stored_count(&self, chat_id: &str) -> usize {
        self.messages
            .lock()
            .await
            .get(chat_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn fetch_messages(
        &self,
        chat_id: &str,
        page: Option<u32>,
    ) -> DeliveryResult<Vec<ChatMessage>> {
        let store = self.messages.lock().await;
        let all = match store.get(chat_id) {
            Some(messages) => messages,
            None => return Ok(Vec::new()),
        };

        // Page 0 (or None) is the most recent slice; higher pages walk
        // backwards through history. Order within a page stays oldest-first.
        let page = page.unwrap_or(0) as usize;
        let end = all.len().saturating_sub(page * self.page_size);
        let start = end.saturating_sub(self.page_size);
        Ok(all[start..end].to_vec())
    }

    async fn save_message(
        &self,
        chat_id: &str,
        message: &ChatMessage,
    ) -> DeliveryResult<ChatMessage> {
        if self.fail_next.swap(false, Ordering::SeqCst) || self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::persistence(
                "injected save failure",
                message.content.clone(),
            ));
        }

        let mut saved = message.clone();
        saved.confirm(Uuid::new_v4().to_string());

        let mut store = self.messages.lock().await;
        store
            .entry(chat_id.to_string())
            .or_default()
            .push(saved.clone());
        Ok(saved)
    }
}
