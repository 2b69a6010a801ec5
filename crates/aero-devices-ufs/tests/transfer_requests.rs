mod common;

use aero_devices_ufs::regs::{REG_IS, REG_UTRLBAU, REG_UTRLCNR, REG_UTRLDBR};
use aero_devices_ufs::{MemoryBus, MemoryError, RequestState, UfsConfig};
use common::*;

/// Guest memory whose reads or writes can be made to fail.
struct FlakyMem {
    inner: TestMem,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryBus for FlakyMem {
    fn read_physical(&self, paddr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        if self.fail_reads {
            return Err(MemoryError::OutOfBounds {
                addr: paddr,
                len: buf.len(),
            });
        }
        self.inner.read_physical(paddr, buf)
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> Result<(), MemoryError> {
        if self.fail_writes {
            return Err(MemoryError::OutOfBounds {
                addr: paddr,
                len: buf.len(),
            });
        }
        self.inner.write_physical(paddr, buf)
    }
}

#[test]
fn nop_out_completes_with_nop_in() {
    let (mut ctrl, irq) = new_controller(UfsConfig::default());
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);
    assert!(!irq.level());

    write_nop_out(&mut mem, 5, 0x42);
    ring(&mut ctrl, 5);

    // The doorbell write only schedules the work.
    assert_eq!(ctrl.slot_state(5), Some(RequestState::Ready));
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 1 << 5);
    assert_eq!(read_ocs(&mem, 5), OCS_INVALID);
    assert!(ctrl.has_pending_work());

    ctrl.run_pending(&mut mem);

    assert_eq!(ctrl.slot_state(5), Some(RequestState::Idle));
    assert_eq!(read_ocs(&mem, 5), OCS_SUCCESS);
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 0);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 1 << 5);
    assert_ne!(ctrl.mmio_read(REG_IS, 4) & u64::from(IS_UTRCS), 0);
    assert!(irq.level());
    assert!(!ctrl.has_pending_work());

    let rsp = read_response(&mem, 5);
    assert_eq!(rsp[0], 0x20);
    assert_eq!(rsp[3], 0x42);
    assert_eq!(&rsp[10..12], &[0, 0]);

    ctrl.mmio_write(REG_IS, 4, u64::from(IS_UTRCS));
    assert!(!irq.level());
    ctrl.mmio_write(REG_UTRLCNR, 4, 1 << 5);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 0);
}

#[test]
fn interrupt_requires_the_descriptor_interrupt_bit() {
    let (mut ctrl, irq) = new_controller(UfsConfig::default());
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);

    write_nop_out(&mut mem, 0, 1);
    write_utrd(&mut mem, 0, UTRD_CT_UFS, 0);
    ring(&mut ctrl, 0);
    ctrl.run_pending(&mut mem);

    assert_eq!(read_ocs(&mem, 0), OCS_SUCCESS);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 1);
    assert_eq!(ctrl.mmio_read(REG_IS, 4) & u64::from(IS_UTRCS), 0);
    assert!(!irq.level());
}

#[test]
fn failed_request_interrupts_without_the_interrupt_bit() {
    let (mut ctrl, irq) = new_controller(UfsConfig::default());
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);

    // DATA OUT is not a valid initiator request.
    write_utrd(&mut mem, 3, UTRD_CT_UFS, 0);
    let mut upiu = [0u8; 32];
    upiu[0] = 0x02;
    upiu[3] = 9;
    mem.write(cmd_desc(3), &upiu);
    ring(&mut ctrl, 3);
    ctrl.run_pending(&mut mem);

    assert_eq!(read_ocs(&mem, 3), OCS_INVALID_COMMAND_TABLE_ATTR);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 1 << 3);
    assert_ne!(ctrl.mmio_read(REG_IS, 4) & u64::from(IS_UTRCS), 0);
    assert!(irq.level());
}

#[test]
fn several_slots_complete_in_one_pass() {
    let (mut ctrl, _) = new_controller(UfsConfig::default());
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);

    let slots = [0usize, 3, 7, 31];
    let mut bits = 0u64;
    for (i, &slot) in slots.iter().enumerate() {
        write_nop_out(&mut mem, slot, 0x10 + i as u8);
        bits |= 1 << slot;
    }
    ctrl.mmio_write(REG_UTRLDBR, 4, bits);
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), bits);

    ctrl.run_pending(&mut mem);

    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 0);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), bits);
    for (i, &slot) in slots.iter().enumerate() {
        assert_eq!(read_ocs(&mem, slot), OCS_SUCCESS);
        assert_eq!(read_response(&mem, slot)[3], 0x10 + i as u8);
    }
}

#[test]
fn doorbell_bits_beyond_the_slot_count_are_ignored() {
    let (mut ctrl, _) = new_controller(UfsConfig {
        nutrs: 4,
        ..Default::default()
    });
    bring_up(&mut ctrl);
    ctrl.mmio_write(REG_UTRLDBR, 4, 1 << 5);
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 0);
    assert!(!ctrl.has_pending_work());
    assert_eq!(ctrl.slot_state(5), None);
}

#[test]
fn ringing_a_busy_slot_twice_completes_it_once() {
    let (mut ctrl, _) = new_controller(UfsConfig::default());
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);

    write_nop_out(&mut mem, 2, 7);
    ring(&mut ctrl, 2);
    ring(&mut ctrl, 2);
    assert_eq!(ctrl.slot_state(2), Some(RequestState::Ready));
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 1 << 2);

    ctrl.run_pending(&mut mem);
    assert_eq!(ctrl.slot_state(2), Some(RequestState::Idle));
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 1 << 2);

    // Once idle the slot can be reused.
    ctrl.mmio_write(REG_UTRLCNR, 4, 1 << 2);
    write_nop_out(&mut mem, 2, 8);
    ring(&mut ctrl, 2);
    ctrl.run_pending(&mut mem);
    assert_eq!(read_response(&mem, 2)[3], 8);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 1 << 2);
}

#[test]
fn response_is_truncated_to_the_reserved_space() {
    let (mut ctrl, _) = new_controller(UfsConfig::default());
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);

    write_nop_out(&mut mem, 1, 0x33);
    // Response UPIU length is in dwords: reserve 16 bytes.
    mem.write(utrd_addr(1) + 24, &4u16.to_le_bytes());
    mem.write(cmd_desc(1) + RSP_OFFSET, &[0xaa; 32]);
    ring(&mut ctrl, 1);
    ctrl.run_pending(&mut mem);

    let rsp = read_response(&mem, 1);
    assert_eq!(rsp[0], 0x20);
    assert_eq!(rsp[3], 0x33);
    assert_eq!(&rsp[12..16], &[0; 4]);
    assert_eq!(&rsp[16..32], &[0xaa; 16]);
    assert_eq!(read_ocs(&mem, 1), OCS_SUCCESS);
}

#[test]
fn failed_write_back_is_retried_on_the_next_completion() {
    let (mut ctrl, _) = new_controller(UfsConfig::default());
    let mut mem = FlakyMem {
        inner: TestMem::new(MEM_SIZE),
        fail_reads: false,
        fail_writes: true,
    };
    bring_up(&mut ctrl);

    write_nop_out(&mut mem.inner, 0, 1);
    ring(&mut ctrl, 0);
    ctrl.run_pending(&mut mem);

    assert_eq!(ctrl.slot_state(0), Some(RequestState::Complete));
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 1);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 0);
    assert_eq!(read_ocs(&mem.inner, 0), OCS_INVALID);
    assert!(!ctrl.has_pending_work());

    mem.fail_writes = false;
    write_nop_out(&mut mem.inner, 1, 2);
    ring(&mut ctrl, 1);
    ctrl.run_pending(&mut mem);

    assert_eq!(ctrl.slot_state(0), Some(RequestState::Idle));
    assert_eq!(ctrl.slot_state(1), Some(RequestState::Idle));
    assert_eq!(read_ocs(&mem.inner, 0), OCS_SUCCESS);
    assert_eq!(read_ocs(&mem.inner, 1), OCS_SUCCESS);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 0b11);
}

#[test]
fn descriptors_above_4gib_are_rejected_without_64bit_addressing() {
    let (mut ctrl, _) = new_controller(UfsConfig {
        addressing_64bit: false,
        ..Default::default()
    });
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);

    write_nop_out(&mut mem, 0, 1);
    // Command descriptor base upper dword.
    mem.write(utrd_addr(0) + 20, &1u32.to_le_bytes());
    ring(&mut ctrl, 0);
    ctrl.run_pending(&mut mem);

    // The request waits for the guest to fix the descriptor and ring again.
    assert_eq!(ctrl.slot_state(0), Some(RequestState::Ready));
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 1);
    assert_eq!(read_ocs(&mem, 0), OCS_INVALID);

    ctrl.reset();
    assert_eq!(ctrl.slot_state(0), Some(RequestState::Idle));
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 0);
}

#[test]
fn transfer_list_above_4gib_is_fetched_with_64bit_addressing() {
    let (mut ctrl, _) = new_controller(UfsConfig::default());
    let mut mem = TestMem::new(MEM_SIZE);
    bring_up(&mut ctrl);

    ctrl.mmio_write(REG_UTRLBAU, 4, 1);
    write_nop_out(&mut mem, 0, 1);
    ring(&mut ctrl, 0);
    // TestMem is far smaller than 4 GiB, so the fetch fails at the bus, not the window.
    ctrl.run_pending(&mut mem);
    assert_eq!(ctrl.slot_state(0), Some(RequestState::Ready));
    assert_eq!(ctrl.registers().utrl_base(), 0x1_0000_1000);
}

#[test]
fn failed_fetch_is_retried_when_the_guest_rings_again() {
    let (mut ctrl, irq) = new_controller(UfsConfig::default());
    let mut mem = FlakyMem {
        inner: TestMem::new(MEM_SIZE),
        fail_reads: true,
        fail_writes: false,
    };
    bring_up(&mut ctrl);

    write_nop_out(&mut mem.inner, 0, 0x61);
    ring(&mut ctrl, 0);
    ctrl.run_pending(&mut mem);

    assert_eq!(ctrl.slot_state(0), Some(RequestState::Ready));
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 1);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 0);
    assert_eq!(read_ocs(&mem.inner, 0), OCS_INVALID);
    assert!(!ctrl.has_pending_work());
    assert!(!irq.level());

    mem.fail_reads = false;
    ring(&mut ctrl, 0);
    assert!(ctrl.has_pending_work());
    ctrl.run_pending(&mut mem);

    assert_eq!(ctrl.slot_state(0), Some(RequestState::Idle));
    assert_eq!(read_ocs(&mem.inner, 0), OCS_SUCCESS);
    assert_eq!(read_response(&mem.inner, 0)[3], 0x61);
    assert_eq!(ctrl.mmio_read(REG_UTRLDBR, 4), 0);
    assert_eq!(ctrl.mmio_read(REG_UTRLCNR, 4), 1);
    assert!(irq.level());
}
