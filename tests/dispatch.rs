//! Trap Dispatch Routing
//!
//! The armed/disarmed state machine, cause routing to the two drivers,
//! handler registration, and the fatal path's diagnostic dump.

use mcore::clint::ClintTimer;
use mcore::hal::mock::{CaptureSink, MachineModel, MockCsr};
use mcore::hal::platform::{CLINT_BASE, NR_SOURCES, PLIC_BASE};
use mcore::hal::{Csr, CsrFile, STATUS_MIE};
use mcore::plic::Plic;
use mcore::trap::{
    DispatchError, IrqHandler, TrapDispatcher, TrapFrame, TrapOutcome, INTERRUPT_FLAG,
};

struct Recorder {
    hits: Vec<(u32, usize)>,
}

impl Recorder {
    fn new() -> Self {
        Self { hits: Vec::new() }
    }
}

impl IrqHandler for Recorder {
    fn handle(&mut self, id: u32, frame: &TrapFrame) {
        self.hits.push((id, frame.cause));
    }
}

fn dispatcher<'a>(
    machine: &'a MachineModel,
    csr: &'a MockCsr,
    sink: &'a CaptureSink,
) -> TrapDispatcher<'a, &'a MachineModel, &'a MockCsr> {
    let clint = ClintTimer::new(machine, csr, CLINT_BASE);
    let plic = Plic::new(machine, csr, PLIC_BASE, NR_SOURCES);
    TrapDispatcher::new(csr, clint, plic, sink, 500)
}

#[test]
fn vector_install_requires_the_disarmed_state() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    d.install(0x8000_1000).unwrap();
    assert_eq!(csr.get(Csr::TrapVector), 0x8000_1000);
    d.arm().unwrap();
    assert!(d.is_armed());
    assert_ne!(csr.get(Csr::Status) & STATUS_MIE, 0);

    // armed: a new vector would corrupt an in-flight handler's target
    assert_eq!(
        d.install(0x8000_2000),
        Err(DispatchError::InstallWhileArmed)
    );
    assert_eq!(csr.get(Csr::TrapVector), 0x8000_1000);

    d.disarm();
    assert_eq!(csr.get(Csr::Status) & STATUS_MIE, 0);
    d.install(0x8000_2000).unwrap();
}

#[test]
fn arming_without_a_vector_is_rejected() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    assert_eq!(d.arm(), Err(DispatchError::VectorNotInstalled));
}

#[test]
fn misaligned_vectors_are_rejected() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    assert_eq!(
        d.install(0x8000_1002),
        Err(DispatchError::MisalignedVector(0x8000_1002))
    );
}

#[test]
fn timer_traps_rearm_the_comparator() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    d.clint().program(1000, 0).unwrap();
    d.clint().enable();

    csr.set(Csr::Cause, INTERRUPT_FLAG | 7);
    assert_eq!(d.dispatch(), TrapOutcome::Handled);
    // one tick_interval past the previous deadline
    assert_eq!(machine.clint.compare(), 1500);
}

#[test]
fn software_traps_clear_the_latch() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    d.clint().raise_soft().unwrap();
    assert!(machine.clint.software_pending());

    csr.set(Csr::Cause, INTERRUPT_FLAG | 3);
    assert_eq!(d.dispatch(), TrapOutcome::Handled);
    assert!(!machine.clint.software_pending());
}

#[test]
fn external_traps_claim_dispatch_and_complete() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut recorder = Recorder::new();
    {
        let mut d = dispatcher(&machine, &csr, &sink);
        d.plic().set_priority(36, 1).unwrap();
        d.plic().enable(36).unwrap();
        d.register(36, &mut recorder).unwrap();

        machine.plic.raise(36);
        csr.set(Csr::Cause, INTERRUPT_FLAG | 11);
        assert_eq!(d.dispatch(), TrapOutcome::Handled);

        // completed: a re-asserted line is claimable again
        machine.plic.raise(36);
        assert_eq!(d.dispatch(), TrapOutcome::Handled);
    }
    assert_eq!(recorder.hits.len(), 2);
    assert_eq!(recorder.hits[0].0, 36);
    assert_eq!(recorder.hits[0].1, INTERRUPT_FLAG | 11);
}

#[test]
fn unregistered_sources_are_still_completed() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    d.plic().set_priority(61, 1).unwrap();
    d.plic().enable(61).unwrap();
    machine.plic.raise(61);

    csr.set(Csr::Cause, INTERRUPT_FLAG | 11);
    assert_eq!(d.dispatch(), TrapOutcome::Handled);
    assert!(!machine.plic.pending(61));
}

#[test]
fn an_empty_claim_is_spurious() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    csr.set(Csr::Cause, INTERRUPT_FLAG | 11);
    assert_eq!(d.dispatch(), TrapOutcome::Spurious);
}

#[test]
fn exceptions_are_fatal_and_dump_the_frame() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    csr.set(Csr::ExceptionPc, 0xdead_beef);
    csr.set(Csr::Cause, 2); // illegal instruction
    csr.set(Csr::TrapValue, 0x1357);

    assert_eq!(d.dispatch(), TrapOutcome::Fatal);
    assert!(sink.contains("unrecoverable trap"));
    assert!(sink.contains("deadbeef"));
    assert!(sink.contains("1357"));
}

#[test]
fn unknown_causes_are_fatal() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    csr.set(Csr::Cause, 14); // reserved encoding
    assert_eq!(d.dispatch(), TrapOutcome::Fatal);
    assert!(!sink.is_empty());
}

#[test]
fn handler_table_rejects_duplicates_and_overflow() {
    let machine = MachineModel::new();
    let csr = MockCsr::new();
    let sink = CaptureSink::new();
    let mut d = dispatcher(&machine, &csr, &sink);

    let mut a = Recorder::new();
    let mut b = Recorder::new();
    d.register(5, &mut a).unwrap();
    assert_eq!(d.register(5, &mut b), Err(DispatchError::DuplicateHandler(5)));

    let mut rest: Vec<Recorder> = (0..16).map(|_| Recorder::new()).collect();
    let mut overflowed = false;
    for (i, r) in rest.iter_mut().enumerate() {
        match d.register(10 + i as u32, r) {
            Ok(()) => {}
            Err(DispatchError::HandlerTableFull) => {
                overflowed = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(overflowed);
}
