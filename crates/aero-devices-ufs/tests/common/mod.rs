//! Shared helpers for `aero-devices-ufs` integration tests: guest memory, a scriptable logical
//! unit, and builders that lay out descriptors the way a guest driver would.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use aero_devices_ufs::regs::{
    REG_HCE, REG_IE, REG_UICCMD, REG_UTRLBA, REG_UTRLBAU, REG_UTRLDBR,
};
use aero_devices_ufs::{
    CompletionToken, DataDirection, LevelIrqLine, MemoryBus, MemoryError, ScsiCommand,
    ScsiCompletion, ScsiLogicalUnit, UfsConfig, UfsController,
};

pub const UTRL_BASE: u64 = 0x1000;
pub const CMD_DESC_AREA: u64 = 0x10000;
pub const CMD_DESC_STRIDE: u64 = 0x1000;
/// Response UPIU offset inside a command descriptor (bytes).
pub const RSP_OFFSET: u64 = 0x200;
/// Space reserved for the response UPIU (bytes).
pub const RSP_LEN: u64 = 0x100;
/// PRD table offset inside a command descriptor (bytes).
pub const PRDT_OFFSET: u64 = 0x400;
pub const DATA_AREA: u64 = 0x80000;
pub const MEM_SIZE: usize = 0x100000;

pub const UTRD_INTERRUPT: u32 = 1 << 24;
pub const UTRD_DD_TO_DEVICE: u32 = 1 << 25;
pub const UTRD_DD_FROM_DEVICE: u32 = 2 << 25;
pub const UTRD_CT_UFS: u32 = 1 << 28;

pub const IS_UTRCS: u32 = 1 << 0;
pub const IS_UCCS: u32 = 1 << 10;

pub const OCS_SUCCESS: u8 = 0x0;
pub const OCS_INVALID_COMMAND_TABLE_ATTR: u8 = 0x1;
pub const OCS_INVALID: u8 = 0xf;

pub struct TestMem {
    pub buf: Vec<u8>,
}

impl TestMem {
    pub fn new(size: usize) -> Self {
        Self { buf: vec![0u8; size] }
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) {
        let start = addr as usize;
        self.buf[start..start + data.len()].copy_from_slice(data);
    }

    pub fn read(&self, addr: u64, len: usize) -> Vec<u8> {
        let start = addr as usize;
        self.buf[start..start + len].to_vec()
    }
}

impl MemoryBus for TestMem {
    fn read_physical(&self, paddr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        let start = paddr as usize;
        let end = start.checked_add(buf.len()).ok_or(MemoryError::OutOfBounds {
            addr: paddr,
            len: buf.len(),
        })?;
        if end > self.buf.len() {
            return Err(MemoryError::OutOfBounds {
                addr: paddr,
                len: buf.len(),
            });
        }
        buf.copy_from_slice(&self.buf[start..end]);
        Ok(())
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> Result<(), MemoryError> {
        let start = paddr as usize;
        let end = start.checked_add(buf.len()).ok_or(MemoryError::OutOfBounds {
            addr: paddr,
            len: buf.len(),
        })?;
        if end > self.buf.len() {
            return Err(MemoryError::OutOfBounds {
                addr: paddr,
                len: buf.len(),
            });
        }
        self.buf[start..end].copy_from_slice(buf);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedCommand {
    pub lun: u8,
    pub task_tag: u8,
    pub cdb: [u8; 16],
    pub expected_len: u32,
    pub direction: DataDirection,
    pub sg_len: Option<u64>,
}

#[derive(Default)]
pub struct MockLuState {
    pub submitted: Vec<SubmittedCommand>,
    /// Tokens kept for the test to complete by hand.
    pub held: Vec<CompletionToken>,
    pub queued: VecDeque<(CompletionToken, ScsiCompletion)>,
    /// When set, every command completes with this result on the next poll.
    pub auto_complete: Option<ScsiCompletion>,
    /// Data scattered into the PRDT buffers of device-to-host commands.
    pub read_data: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct MockLu {
    pub state: Arc<Mutex<MockLuState>>,
}

impl MockLu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto(completion: ScsiCompletion) -> Self {
        let lu = Self::default();
        lu.state.lock().unwrap().auto_complete = Some(completion);
        lu
    }

    pub fn take_held(&self) -> Vec<CompletionToken> {
        std::mem::take(&mut self.state.lock().unwrap().held)
    }

    pub fn submitted(&self) -> Vec<SubmittedCommand> {
        self.state.lock().unwrap().submitted.clone()
    }
}

impl ScsiLogicalUnit for MockLu {
    fn submit(&mut self, command: ScsiCommand<'_>, token: CompletionToken, mem: &mut dyn MemoryBus) {
        let mut state = self.state.lock().unwrap();
        state.submitted.push(SubmittedCommand {
            lun: command.lun,
            task_tag: command.task_tag,
            cdb: command.cdb,
            expected_len: command.expected_data_transfer_len,
            direction: command.direction,
            sg_len: command.sg_list.map(|sg| sg.total_len()),
        });
        if command.direction == DataDirection::FromDevice && !state.read_data.is_empty() {
            if let Some(sg) = command.sg_list {
                sg.copy_to_guest(mem, &state.read_data).unwrap();
            }
        }
        match state.auto_complete.clone() {
            Some(completion) => state.queued.push_back((token, completion)),
            None => state.held.push(token),
        }
    }

    fn poll_completion(&mut self) -> Option<(CompletionToken, ScsiCompletion)> {
        self.state.lock().unwrap().queued.pop_front()
    }
}

pub fn cmd_desc(slot: usize) -> u64 {
    CMD_DESC_AREA + slot as u64 * CMD_DESC_STRIDE
}

pub fn utrd_addr(slot: usize) -> u64 {
    UTRL_BASE + slot as u64 * 32
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn new_controller(config: UfsConfig) -> (UfsController, LevelIrqLine) {
    init_tracing();
    let irq = LevelIrqLine::new();
    let ctrl = UfsController::new(config, Box::new(irq.clone())).unwrap();
    (ctrl, irq)
}

/// HCE, link startup and list base programming, as a guest driver would do at probe time.
pub fn bring_up(ctrl: &mut UfsController) {
    ctrl.mmio_write(REG_HCE, 4, 1);
    ctrl.mmio_write(REG_UICCMD, 4, 0x16);
    ctrl.mmio_write(REG_UTRLBA, 4, UTRL_BASE);
    ctrl.mmio_write(REG_UTRLBAU, 4, 0);
    ctrl.mmio_write(REG_IE, 4, u64::from(IS_UTRCS));
}

pub fn ring(ctrl: &mut UfsController, slot: usize) {
    ctrl.mmio_write(REG_UTRLDBR, 4, 1u64 << slot);
}

/// Writes slot `slot`'s UTRD with OCS pre-set to INVALID so completion is observable.
pub fn write_utrd(mem: &mut TestMem, slot: usize, dword0: u32, prdt_entries: u16) {
    let base = cmd_desc(slot);
    let mut utrd = [0u8; 32];
    utrd[0..4].copy_from_slice(&dword0.to_le_bytes());
    utrd[8] = OCS_INVALID;
    utrd[16..20].copy_from_slice(&(base as u32).to_le_bytes());
    utrd[20..24].copy_from_slice(&((base >> 32) as u32).to_le_bytes());
    utrd[24..26].copy_from_slice(&((RSP_LEN / 4) as u16).to_le_bytes());
    utrd[26..28].copy_from_slice(&((RSP_OFFSET / 4) as u16).to_le_bytes());
    utrd[28..30].copy_from_slice(&prdt_entries.to_le_bytes());
    utrd[30..32].copy_from_slice(&((PRDT_OFFSET / 4) as u16).to_le_bytes());
    mem.write(utrd_addr(slot), &utrd);
}

pub fn write_nop_out(mem: &mut TestMem, slot: usize, task_tag: u8) {
    write_utrd(mem, slot, UTRD_CT_UFS | UTRD_INTERRUPT, 0);
    let mut upiu = [0u8; 32];
    upiu[0] = 0x00;
    upiu[3] = task_tag;
    mem.write(cmd_desc(slot), &upiu);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryArgs {
    pub func: u8,
    pub opcode: u8,
    pub idn: u8,
    pub index: u8,
    pub selector: u8,
    pub length: u16,
    pub value: u32,
}

pub fn write_query(mem: &mut TestMem, slot: usize, task_tag: u8, args: QueryArgs) {
    write_utrd(mem, slot, UTRD_CT_UFS | UTRD_INTERRUPT, 0);
    let mut upiu = [0u8; 32];
    upiu[0] = 0x16;
    upiu[3] = task_tag;
    upiu[5] = args.func;
    upiu[12] = args.opcode;
    upiu[13] = args.idn;
    upiu[14] = args.index;
    upiu[15] = args.selector;
    upiu[18..20].copy_from_slice(&args.length.to_be_bytes());
    upiu[20..24].copy_from_slice(&args.value.to_be_bytes());
    mem.write(cmd_desc(slot), &upiu);
}

#[allow(clippy::too_many_arguments)]
pub fn write_command(
    mem: &mut TestMem,
    slot: usize,
    dword0: u32,
    lun: u8,
    task_tag: u8,
    expected_len: u32,
    cdb: &[u8],
    prdt: &[(u64, u32)],
) {
    write_utrd(mem, slot, UTRD_CT_UFS | dword0, prdt.len() as u16);
    let mut upiu = [0u8; 32];
    upiu[0] = 0x01;
    upiu[2] = lun;
    upiu[3] = task_tag;
    upiu[12..16].copy_from_slice(&expected_len.to_be_bytes());
    upiu[16..16 + cdb.len()].copy_from_slice(cdb);
    mem.write(cmd_desc(slot), &upiu);

    for (i, (addr, len)) in prdt.iter().enumerate() {
        let mut entry = [0u8; 16];
        entry[0..8].copy_from_slice(&addr.to_le_bytes());
        entry[12..16].copy_from_slice(&(len - 1).to_le_bytes());
        mem.write(cmd_desc(slot) + PRDT_OFFSET + i as u64 * 16, &entry);
    }
}

pub fn read_ocs(mem: &TestMem, slot: usize) -> u8 {
    mem.read(utrd_addr(slot) + 8, 1)[0]
}

pub fn read_response(mem: &TestMem, slot: usize) -> Vec<u8> {
    mem.read(cmd_desc(slot) + RSP_OFFSET, RSP_LEN as usize)
}
