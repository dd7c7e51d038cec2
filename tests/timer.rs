//! CLINT Timer Behaviour
//!
//! Comparator programming discipline, rearm arithmetic, and the software
//! interrupt latch, all against the CLINT model's advanceable `mtime`.

use mcore::clint::{ClintError, ClintTimer};
use mcore::hal::mock::{MachineModel, MockCsr};
use mcore::hal::platform::{CLINT_BASE, TIMEBASE_FREQ};
use mcore::hal::{Csr, CsrFile, IE_SOFTWARE, IE_TIMER};

fn clint<'a>(
    machine: &'a MachineModel,
    csr: &'a MockCsr,
) -> ClintTimer<&'a MachineModel, &'a MockCsr> {
    ClintTimer::new(machine, csr, CLINT_BASE)
}

#[test]
fn enable_toggles_the_timer_mask_bit() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let clint = clint(&machine, &csr);

    assert!(!clint.is_enabled());
    clint.enable();
    assert_ne!(csr.get(Csr::InterruptEnable) & IE_TIMER, 0);
    clint.disable();
    assert_eq!(csr.get(Csr::InterruptEnable) & IE_TIMER, 0);
}

#[test]
fn programming_while_enabled_is_rejected() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let clint = clint(&machine, &csr);

    clint.enable();
    assert_eq!(
        clint.program(5000, 0),
        Err(ClintError::ProgramWhileEnabled)
    );

    clint.disable();
    clint.program(5000, 0).unwrap();
    assert_eq!(clint.compare(), 5000);
}

#[test]
fn no_interrupt_before_the_deadline_one_once_reached() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let clint = clint(&machine, &csr);

    // one millisecond of timebase ticks
    let deadline = (TIMEBASE_FREQ / 1000) as u64;
    clint.program(deadline as u32, 0).unwrap();
    clint.enable();

    machine.clint.advance(deadline - 1);
    assert!(!machine.clint.timer_pending());

    machine.clint.advance(1);
    assert!(machine.clint.timer_pending());
}

#[test]
fn both_halves_of_the_comparator_are_written() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let clint = clint(&machine, &csr);

    clint.program(0xdead_beef, 0x1234_5678).unwrap();
    assert_eq!(clint.compare(), 0x1234_5678_dead_beef);
}

#[test]
fn rearm_after_extends_from_the_previous_deadline() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let clint = clint(&machine, &csr);

    clint.program(1000, 0).unwrap();
    // processing delay must not shift the period
    machine.clint.advance(1200);
    let next = clint.rearm_after(500).unwrap();
    assert_eq!(next, 1500);
    assert_eq!(clint.compare(), 1500);
    assert_eq!(machine.clint.compare(), 1500);
}

#[test]
fn software_interrupt_latch_roundtrip() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let clint = clint(&machine, &csr);

    assert!(!machine.clint.software_pending());
    clint.raise_soft().unwrap();
    assert!(machine.clint.software_pending());
    clint.clear_soft().unwrap();
    assert!(!machine.clint.software_pending());

    clint.enable_soft();
    assert_ne!(csr.get(Csr::InterruptEnable) & IE_SOFTWARE, 0);
    clint.disable_soft();
    assert_eq!(csr.get(Csr::InterruptEnable) & IE_SOFTWARE, 0);
}
