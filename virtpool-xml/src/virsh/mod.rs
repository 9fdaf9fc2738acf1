//! Access to the `virsh` command-line tool.
//!
//! The lifecycle operations only see the [`Virsh`] and [`StoragePool`]
//! traits. [`VirshCommand`] implements both by running the binary.

mod command;
mod traits;

pub use command::{parse_pool_info, PoolInfo, VirshCommand};
pub use traits::{CmdResult, StoragePool, Virsh};
