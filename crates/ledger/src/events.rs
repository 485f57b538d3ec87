//! Events published after a block commits.

use std::sync::Arc;

use helios_core::Block;

use crate::blockchain::ApplicationExecuted;

/// Broadcast to subscribers strictly after the block's write set landed.
#[derive(Debug, Clone)]
pub enum BlockchainEvent {
    /// A block was persisted.
    BlockPersisted(Arc<Block>),
    /// One transaction finished executing (HALT or FAULT).
    TransactionExecuted(Arc<ApplicationExecuted>),
}
