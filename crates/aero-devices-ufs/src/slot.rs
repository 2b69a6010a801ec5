//! Transfer request slots.
//!
//! Each slot walks `Idle -> Ready -> Running -> Complete -> Idle`. A SCSI command handed to a
//! logical unit stays `Running` until the unit reports completion. A slot whose descriptors could
//! not be fetched stays `Ready` until the guest rings it again. The table is the only owner of
//! the requests; other components borrow one for a single synchronous step.

use tracing::warn;

use crate::dma::SgList;
use crate::upiu::{RequestUpiu, ResponseUpiu};
use crate::utrd::TransferRequestDescriptor;

pub const MAX_SLOTS: usize = 32;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Ready,
    Running,
    Complete,
}

impl RequestState {
    pub fn can_transition_to(self, next: RequestState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Ready)
                | (Self::Ready, Self::Running)
                | (Self::Running, Self::Complete)
                | (Self::Complete, Self::Idle)
        )
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    slot: usize,
    state: RequestState,
    generation: u32,
    pub utrd: TransferRequestDescriptor,
    pub request: RequestUpiu,
    pub response: ResponseUpiu,
    pub sg_list: Option<SgList>,
}

impl Request {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            state: RequestState::Idle,
            generation: 0,
            utrd: TransferRequestDescriptor::default(),
            request: RequestUpiu::default(),
            response: ResponseUpiu::default(),
            sg_list: None,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Incremented every time the slot returns to `Idle`, so completions issued for an earlier
    /// occupant of the slot can be told apart.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Moves to `next` if the state machine allows it. Returns whether the transition happened.
    pub fn transition(&mut self, next: RequestState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                slot = self.slot,
                from = ?self.state,
                to = ?next,
                "rejected request state transition"
            );
            return false;
        }
        if next == RequestState::Idle {
            self.release();
        }
        self.state = next;
        true
    }

    /// Returns the slot to `Idle` from any state, dropping whatever was in flight.
    pub fn abandon(&mut self) {
        self.release();
        self.state = RequestState::Idle;
    }

    fn release(&mut self) {
        self.utrd = TransferRequestDescriptor::default();
        self.request = RequestUpiu::default();
        self.response = ResponseUpiu::default();
        self.sg_list = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Fixed arena of `nutrs` requests indexed by slot number.
#[derive(Debug, Clone)]
pub struct SlotTable {
    requests: Vec<Request>,
}

impl SlotTable {
    pub fn new(nutrs: usize) -> Self {
        Self {
            requests: (0..nutrs.min(MAX_SLOTS)).map(Request::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Request> {
        self.requests.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Request> {
        self.requests.get_mut(slot)
    }

    /// Marks every newly rung, idle slot in `bits` as `Ready`.
    ///
    /// `outstanding` is the doorbell value already tracked by the controller; those bits are not
    /// new. Bits addressing busy slots are logged and ignored. Returns the accepted bits.
    pub fn ring_doorbell(&mut self, bits: u32, outstanding: u32) -> u32 {
        let mut accepted = 0u32;
        let new_bits = bits & !outstanding;
        for request in self.requests.iter_mut() {
            let bit = 1u32 << request.slot;
            if new_bits & bit == 0 {
                continue;
            }
            if request.state != RequestState::Idle {
                warn!(slot = request.slot, state = ?request.state, "doorbell rung for busy slot");
                continue;
            }
            request.state = RequestState::Ready;
            accepted |= bit;
        }
        accepted
    }

    /// Doorbell-style bitmask of the slots currently in `state`.
    pub fn mask_in_state(&self, state: RequestState) -> u32 {
        self.requests
            .iter()
            .filter(|r| r.state == state)
            .fold(0u32, |mask, r| mask | (1u32 << r.slot))
    }

    pub fn abandon_all(&mut self) {
        for request in &mut self.requests {
            request.abandon();
        }
    }
}
