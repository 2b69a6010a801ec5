//! The UFS host controller: MMIO surface, command dispatch and the completion engine.
//!
//! Guest register writes never perform DMA themselves. Ringing the transfer request doorbell
//! only schedules work; the platform calls [`UfsController::run_pending`] from its event loop to
//! fetch descriptors, execute requests and write completions back.

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::config::{UfsConfig, UnitConfig};
use crate::dma::{DmaWindow, MemoryBus};
use crate::error::{ConfigError, RegisterError};
use crate::irq::IrqLine;
use crate::query::{QueryEngine, QueryResponseCode};
use crate::regs::{
    Capabilities, HostControllerEnable, HostControllerStatus, InterruptStatus, RegisterFile,
    MMIO_SIZE, REG_HCE, REG_IE, REG_IS, REG_UICCMD, REG_UTRLCNR, REG_UTRLDBR,
};
use crate::scsi::{
    self, CompletionToken, LuRouter, ScsiCommand, ScsiCompletion, ScsiLogicalUnit, WellKnownLun,
};
use crate::slot::{RequestState, SlotTable};
use crate::uic::UicProcessor;
use crate::upiu::{ResponseBody, ResponseUpiu, TransactionType, UpiuHeader};
use crate::utrd::OverallCommandStatus;

bitflags! {
    /// Deferred tasks waiting for the next [`UfsController::run_pending`] call.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PendingWork: u8 {
        const PROCESS_DOORBELLS = 1 << 0;
        const SEND_COMPLETIONS = 1 << 1;
    }
}

/// Result of dispatching one request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DispatchOutcome {
    Complete(OverallCommandStatus),
    /// Handed to a logical unit; completion arrives later.
    Pending,
}

pub struct UfsController {
    regs: RegisterFile,
    dma: DmaWindow,
    slots: SlotTable,
    query: QueryEngine,
    uic: UicProcessor,
    lus: LuRouter,
    pending: PendingWork,
    irq: Box<dyn IrqLine>,
    irq_level: bool,
}

impl UfsController {
    pub fn new(config: UfsConfig, irq: Box<dyn IrqLine>) -> Result<Self, ConfigError> {
        config.validate()?;
        let cap = Capabilities::new(config.nutrs, config.nutmrs, config.addressing_64bit);
        Ok(Self {
            regs: RegisterFile::new(cap),
            dma: DmaWindow::new(config.addressing_64bit),
            slots: SlotTable::new(config.nutrs as usize),
            query: QueryEngine::new(config),
            uic: UicProcessor::new(),
            lus: LuRouter::new(),
            pending: PendingWork::empty(),
            irq,
            irq_level: false,
        })
    }

    /// Attaches an ordinary logical unit at `index` (0..32).
    pub fn attach_lu(
        &mut self,
        index: u8,
        unit: UnitConfig,
        lu: Box<dyn ScsiLogicalUnit>,
    ) -> Result<(), ConfigError> {
        unit.validate()?;
        self.lus.attach(index, lu)?;
        self.query.set_unit(usize::from(index), Some(unit));
        Ok(())
    }

    pub fn attach_well_known_lu(
        &mut self,
        wlun: WellKnownLun,
        lu: Box<dyn ScsiLogicalUnit>,
    ) -> Result<(), ConfigError> {
        self.lus.attach_well_known(wlun, lu)
    }

    pub fn mmio_size(&self) -> u64 {
        MMIO_SIZE
    }

    pub fn config(&self) -> &UfsConfig {
        self.query.config()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    pub fn uic(&self) -> &UicProcessor {
        &self.uic
    }

    pub fn irq_level(&self) -> bool {
        self.irq_level
    }

    pub fn slot_state(&self, slot: usize) -> Option<RequestState> {
        self.slots.get(slot).map(|r| r.state())
    }

    pub fn has_pending_work(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_work(&self) -> PendingWork {
        self.pending
    }

    pub fn mmio_read(&self, offset: u64, size: usize) -> u64 {
        match size {
            8 => {
                let lo = self.read_sized(offset, 4);
                let hi = self.read_sized(offset.wrapping_add(4), 4);
                lo | (hi << 32)
            }
            1 | 2 | 4 => self.read_sized(offset, size),
            _ => {
                warn!(offset, size, "invalid register read size");
                0
            }
        }
    }

    fn read_sized(&self, offset: u64, size: usize) -> u64 {
        if offset % size as u64 != 0 {
            let error = RegisterError::UnalignedAccess { offset, size };
            warn!(%error, "register read ignored");
            return 0;
        }
        match self.regs.read(offset & !3) {
            Ok(dword) => {
                let shift = (offset & 3) * 8;
                let mask = if size >= 4 {
                    u64::from(u32::MAX)
                } else {
                    (1u64 << (size * 8)) - 1
                };
                (u64::from(dword) >> shift) & mask
            }
            Err(error) => {
                warn!(%error, "register read ignored");
                0
            }
        }
    }

    pub fn mmio_write(&mut self, offset: u64, size: usize, value: u64) {
        match size {
            4 if offset % 4 == 0 => self.write_register(offset, value as u32),
            8 if offset % 4 == 0 => {
                self.write_register(offset, value as u32);
                self.write_register(offset.wrapping_add(4), (value >> 32) as u32);
            }
            _ => {
                let error = RegisterError::UnalignedAccess { offset, size };
                warn!(%error, "register write ignored");
            }
        }
    }

    fn write_register(&mut self, offset: u64, value: u32) {
        match offset {
            REG_IS => self.regs.is.remove(InterruptStatus::from_bits_retain(value)),
            REG_IE => self.regs.ie = InterruptStatus::from_bits_retain(value),
            REG_HCE => self.write_hce(value),
            REG_UTRLDBR => self.ring_doorbell(value),
            REG_UTRLCNR => self.regs.utrlcnr &= !value,
            REG_UICCMD => {
                self.regs.uiccmd = value;
                self.uic.execute(&mut self.regs);
            }
            _ => match self.regs.store(offset, value) {
                Ok(()) => {}
                Err(error @ RegisterError::Unsupported { .. }) => {
                    debug!(%error, value, "register write ignored");
                }
                Err(error) => warn!(%error, value, "register write ignored"),
            },
        }
        self.update_irq();
    }

    fn write_hce(&mut self, value: u32) {
        let was_enabled = self.regs.hce.contains(HostControllerEnable::HCE);
        let hce = HostControllerEnable::from_bits_truncate(value);
        let enable = hce.contains(HostControllerEnable::HCE);
        if !was_enabled && enable {
            self.regs.hcs |= HostControllerStatus::DP | HostControllerStatus::UCRDY;
            self.regs.hce = hce;
            debug!("host controller enabled");
        } else if was_enabled && !enable {
            self.regs.hcs = HostControllerStatus::empty();
            self.regs.hce = HostControllerEnable::empty();
            debug!("host controller disabled");
        } else {
            self.regs.hce = hce;
        }
    }

    fn ring_doorbell(&mut self, value: u32) {
        let bits = value & self.regs.cap.slot_mask();
        let accepted = self.slots.ring_doorbell(bits, self.regs.utrldbr);
        // Re-signalled slots that are still waiting on a failed fetch.
        let retried = bits & self.slots.mask_in_state(RequestState::Ready) & !accepted;
        if accepted == 0 && retried == 0 {
            return;
        }
        trace!(accepted, retried, "transfer request doorbell");
        self.regs.utrldbr |= accepted;
        self.pending |= PendingWork::PROCESS_DOORBELLS;
    }

    fn update_irq(&mut self) {
        let level = self.regs.interrupt_pending();
        self.irq_level = level;
        self.irq.set_level(level);
    }

    /// Runs the scheduled deferred tasks until nothing is left to do. Completions queued by the
    /// logical units are collected along the way.
    pub fn run_pending(&mut self, mem: &mut dyn MemoryBus) {
        loop {
            if self.pending.contains(PendingWork::PROCESS_DOORBELLS) {
                self.pending.remove(PendingWork::PROCESS_DOORBELLS);
                self.process_doorbells(mem);
                continue;
            }
            self.poll_logical_units();
            if self.pending.contains(PendingWork::SEND_COMPLETIONS) {
                self.pending.remove(PendingWork::SEND_COMPLETIONS);
                self.send_completions(mem);
                continue;
            }
            break;
        }
    }

    /// Walks the slots in ascending order and executes every `Ready` one.
    fn process_doorbells(&mut self, mem: &mut dyn MemoryBus) {
        for slot in 0..self.slots.len() {
            let Some(request) = self.slots.get_mut(slot) else {
                continue;
            };
            if request.state() != RequestState::Ready {
                continue;
            }
            self.execute(slot, mem);
        }
    }

    fn execute(&mut self, slot: usize, mem: &mut dyn MemoryBus) {
        let utrl_base = self.regs.utrl_base();
        // A failed fetch leaves the slot `Ready`; ringing it again retries.
        let utrd = match self.dma.read_utrd(mem, utrl_base, slot) {
            Ok(utrd) => utrd,
            Err(error) => {
                warn!(slot, %error, "failed to read transfer request descriptor");
                return;
            }
        };
        let upiu = match self.dma.read_request_upiu(mem, &utrd) {
            Ok(upiu) => upiu,
            Err(error) => {
                warn!(slot, %error, "failed to read request UPIU");
                return;
            }
        };
        let sg_list = match self.dma.read_prdt(mem, &utrd) {
            Ok(sg_list) => sg_list,
            Err(error) => {
                warn!(slot, %error, "failed to read PRD table");
                return;
            }
        };

        let Some(request) = self.slots.get_mut(slot) else {
            return;
        };
        request.utrd = utrd;
        request.request = upiu;
        request.sg_list = sg_list;
        request.transition(RequestState::Running);

        match self.dispatch(slot, mem) {
            DispatchOutcome::Complete(ocs) => self.complete(slot, ocs),
            DispatchOutcome::Pending => {}
        }
    }

    fn dispatch(&mut self, slot: usize, mem: &mut dyn MemoryBus) -> DispatchOutcome {
        let Some(request) = self.slots.get_mut(slot) else {
            return DispatchOutcome::Complete(OverallCommandStatus::InvalidCommandTableAttributes);
        };
        let header = request.request.header;
        trace!(slot, trans_type = header.trans_type, task_tag = header.task_tag, "dispatch");

        match header.transaction_type() {
            Some(TransactionType::NopOut) => {
                request.response = ResponseUpiu::nop_in(&header);
                DispatchOutcome::Complete(OverallCommandStatus::Success)
            }
            Some(TransactionType::Command) => {
                let Some(lu) = self.lus.route(header.lun) else {
                    debug!(slot, lun = header.lun, "command for unattached logical unit");
                    request.response = scsi::invalid_lun_response(&header);
                    return DispatchOutcome::Complete(OverallCommandStatus::Success);
                };
                let command = request.request.command();
                let token = CompletionToken::new(slot, header.task_tag, request.generation());
                lu.submit(
                    ScsiCommand {
                        lun: header.lun,
                        task_tag: header.task_tag,
                        cdb: command.cdb,
                        expected_data_transfer_len: command.expected_data_transfer_len,
                        direction: request.utrd.data_direction(),
                        sg_list: request.sg_list.as_ref(),
                    },
                    token,
                    mem,
                );
                DispatchOutcome::Pending
            }
            Some(TransactionType::QueryRequest) => {
                let outcome = self.query.execute(&request.request.query());
                let mut rsp_header = UpiuHeader::response_to(&header, TransactionType::QueryResponse);
                rsp_header.response = outcome.code.code();
                rsp_header.data_segment_len = outcome.response.data.len() as u16;
                request.response = ResponseUpiu {
                    header: rsp_header,
                    body: ResponseBody::Query(outcome.response),
                };
                if outcome.code == QueryResponseCode::Success {
                    DispatchOutcome::Complete(OverallCommandStatus::Success)
                } else {
                    DispatchOutcome::Complete(OverallCommandStatus::InvalidCommandTableAttributes)
                }
            }
            _ => {
                warn!(slot, trans_type = header.trans_type, "unsupported transaction type");
                DispatchOutcome::Complete(OverallCommandStatus::InvalidCommandTableAttributes)
            }
        }
    }

    /// Records the final status of a running slot and schedules the write-back.
    fn complete(&mut self, slot: usize, ocs: OverallCommandStatus) {
        let Some(request) = self.slots.get_mut(slot) else {
            return;
        };
        request.utrd.set_ocs(ocs);
        if request.transition(RequestState::Complete) {
            self.pending |= PendingWork::SEND_COMPLETIONS;
        }
    }

    /// Finishes a SCSI command previously submitted to a logical unit.
    ///
    /// Returns `false` (and changes nothing) when the token no longer matches an outstanding
    /// command, e.g. because the controller was reset in the meantime.
    pub fn complete_scsi(&mut self, token: CompletionToken, completion: ScsiCompletion) -> bool {
        let slot = token.slot();
        let Some(request) = self.slots.get_mut(slot) else {
            warn!(slot, "completion for unknown slot");
            return false;
        };
        if request.state() != RequestState::Running
            || request.generation() != token.generation()
            || request.request.header.task_tag != token.task_tag()
        {
            debug!(
                slot,
                task_tag = token.task_tag(),
                state = ?request.state(),
                "dropping stale SCSI completion"
            );
            return false;
        }

        let expected = request.request.command().expected_data_transfer_len;
        request.response = scsi::build_response(&request.request.header, expected, &completion);
        self.complete(slot, OverallCommandStatus::Success);
        true
    }

    /// Collects completions queued by the attached logical units. Returns how many were taken.
    pub fn poll_logical_units(&mut self) -> usize {
        let done = self.lus.poll_completions();
        let count = done.len();
        for (token, completion) in done {
            self.complete_scsi(token, completion);
        }
        count
    }

    /// Writes back every `Complete` slot and returns it to `Idle`.
    fn send_completions(&mut self, mem: &mut dyn MemoryBus) {
        let utrl_base = self.regs.utrl_base();
        for slot in 0..self.slots.len() {
            let Some(request) = self.slots.get_mut(slot) else {
                continue;
            };
            if request.state() != RequestState::Complete {
                continue;
            }
            // The response must land before the descriptor: the OCS is the guest's signal.
            if let Err(error) = self
                .dma
                .write_response_upiu(mem, &request.utrd, &request.response)
            {
                warn!(slot, %error, "failed to write response UPIU");
                continue;
            }
            if let Err(error) = self.dma.write_utrd(mem, utrl_base, slot, &request.utrd) {
                warn!(slot, %error, "failed to write transfer request descriptor");
                continue;
            }

            if request.utrd.ocs() != OverallCommandStatus::Success
                || request.utrd.interrupt_on_completion()
            {
                self.regs.is |= InterruptStatus::UTRCS;
            }
            let bit = 1u32 << slot;
            self.regs.utrldbr &= !bit;
            self.regs.utrlcnr |= bit;
            request.transition(RequestState::Idle);
            trace!(slot, "transfer request completed");
        }
        self.update_irq();
    }

    /// Returns the controller to its power-on state. Outstanding SCSI commands are abandoned;
    /// their late completions are ignored.
    pub fn reset(&mut self) {
        self.regs = RegisterFile::new(self.regs.cap);
        self.slots.abandon_all();
        self.query.reset();
        self.uic.reset();
        self.pending = PendingWork::empty();
        self.update_irq();
    }
}
