//! The ordered item collection and its lifecycle.

mod item;
mod store;

pub use item::*;
pub use store::*;

use aether_common::{ItemId, ProcessStatus};
use serde::Serialize;

/// Change notification broadcast by the [`ItemStore`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum QueueEvent {
    ItemsAdded {
        ids: Vec<ItemId>,
    },
    ItemsRemoved {
        ids: Vec<ItemId>,
    },
    StatusChanged {
        id: ItemId,
        status: ProcessStatus,
        message: Option<String>,
    },
    Progress {
        id: ItemId,
        progress: u8,
    },
    Cleared,
}
