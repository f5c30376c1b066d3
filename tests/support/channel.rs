use std::sync::Mutex;

use thunder_swap::error::SwapError;
use thunder_swap::swap::channel::{SubmarineFetch, SubmarinePublish};
use thunder_swap::swap::SubmarineData;

/// In-process submarine channel: one published slot, fetched idempotently.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    slot: Mutex<Option<SubmarineData>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a record, standing in for a USER that already published.
    pub fn preload(&self, data: SubmarineData) {
        *self.slot.lock().unwrap() = Some(data);
    }
}

impl SubmarinePublish for MemoryChannel {
    async fn publish(&self, data: &SubmarineData) -> Result<(), SwapError> {
        *self.slot.lock().unwrap() = Some(data.clone());
        Ok(())
    }
}

impl SubmarineFetch for MemoryChannel {
    async fn fetch(&self) -> Result<Option<SubmarineData>, SwapError> {
        Ok(self.slot.lock().unwrap().clone())
    }
}
