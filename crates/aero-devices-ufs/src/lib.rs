//! UFS (Universal Flash Storage) host controller emulation (UFSHCI 3.0 register interface).
//!
//! The controller is driven by three external inputs:
//! - guest MMIO accesses ([`UfsController::mmio_read`] / [`UfsController::mmio_write`]),
//! - a memory bus for DMA ([`MemoryBus`]),
//! - SCSI logical units that execute commands ([`ScsiLogicalUnit`]).
//!
//! Supported:
//! - UTP transfer requests: NOP OUT, SCSI COMMAND and QUERY REQUEST UPIUs
//! - PRD tables (scatter-gather lists)
//! - Query: flags, attributes and device/geometry/unit/string/interconnect descriptors
//! - UIC: DME_LINK_STARTUP, DME_HIBER_ENTER/EXIT, DME_GET/DME_SET
//!
//! Not supported: task management requests (registers are accepted and ignored), interrupt
//! aggregation, auto-hibernate, MCQ and inline crypto.
//!
//! Interrupts are a single level-triggered line ([`IrqLine`]).

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod dma;
pub mod error;
pub mod irq;
pub mod query;
pub mod regs;
pub mod scsi;
pub mod slot;
pub mod uic;
pub mod upiu;
pub mod utrd;

pub use config::{UfsConfig, UnitConfig};
pub use controller::{PendingWork, UfsController};
pub use dma::{MemoryBus, SgEntry, SgList};
pub use error::{ConfigError, MemoryError, RegisterError};
pub use irq::{IrqLine, LevelIrqLine, NoIrq};
pub use scsi::{CompletionToken, ScsiCommand, ScsiCompletion, ScsiLogicalUnit, WellKnownLun};
pub use slot::RequestState;
pub use utrd::{DataDirection, OverallCommandStatus};
