/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Portal IPC state machine: `CALL`/`REPLY` and the block/unblock pair that
//! bridges into donation. Capability lookup and validation (which portal,
//! does the caller hold `CALL` permission) happen in the caller's syscall
//! dispatch before either function here runs; these two only manage the
//! `Ec` state transitions and the `partner`/`reverse_cap` linkage.
//!
//! UTCB word/typed-item copying is likewise out of scope here — it is a
//! per-architecture register-image operation (`hal::regs`) driven by the
//! portal's MTD mask, not part of the scheduling state machine.

use kobj::{Ec, EcState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// Caller and portal EC do not share a CPU.
    CrossCpu,
    /// `reply` called on an EC with no open call to reply to.
    NoReverseCap,
}

/// `CALL`: blocks `caller` in `WAIT_REPLY`, links it to `callee` both ways so
/// `REPLY` can find its way back. Matches spec wording of installing the
/// caller as the portal EC's partner and handing the portal EC a
/// reverse-capability to the caller; `caller.partner` is kept in lockstep so
/// diagnostics (and a future `ctr_link`-style counter) can walk the link
/// from either end.
pub fn call(caller: &mut Ec, callee: &mut Ec) -> Result<(), IpcError> {
    if caller.cpu != callee.cpu {
        return Err(IpcError::CrossCpu);
    }
    caller.state = EcState::WaitReply;
    caller.partner = Some(callee as *mut Ec);
    callee.partner = Some(caller as *mut Ec);
    callee.reverse_cap = Some(caller as *mut Ec);
    Ok(())
}

/// `REPLY`: follows `callee`'s reverse-capability back to the caller, clears
/// the partnership on both sides, and wakes the caller. Returns the caller
/// so the scheduler can resume it.
pub fn reply(callee: &mut Ec) -> Result<*mut Ec, IpcError> {
    let caller_ptr = callee.reverse_cap.take().ok_or(IpcError::NoReverseCap)?;
    callee.partner = None;
    unsafe {
        (*caller_ptr).state = EcState::Running;
        (*caller_ptr).partner = None;
    }
    Ok(caller_ptr)
}

/// `RUNNING --exception--> ...`: an exception is delivered through the same
/// state transition as `CALL`, targeting the EC's event-base-selector
/// portal instead of a user-chosen one.
pub fn exception(ec: &mut Ec, handler: &mut Ec) -> Result<(), IpcError> {
    call(ec, handler)
}

/// `RUNNING --block_sc--> BLOCKED`.
pub fn block(ec: &mut Ec) {
    ec.state = EcState::Blocked;
}

/// `BLOCKED --sm_up / release--> RUNNABLE`: wakes `ec` and hands back every
/// SC that was donated to it while blocked, for the caller to re-enqueue on
/// each donor's home CPU.
pub fn unblock(ec: &mut Ec) -> crate::donate::Helpers {
    ec.state = EcState::Running;
    crate::donate::drain(ec)
}
