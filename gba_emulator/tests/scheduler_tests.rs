//! High level testing of the frame scheduler: cycle accounting, halt and
//! interrupt-wait behavior, interrupt dispatch and audio output.

mod util;

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use gba_emulator::apu::AudioConfig;
use gba_emulator::apu::OverflowPolicy;
use gba_emulator::apu::StereoFrame;
use gba_emulator::apu::NATIVE_SAMPLE_RATE;
use gba_emulator::components::irq::HaltState;
use gba_emulator::debugger::Breakpoint;
use gba_emulator::main_bus::Key;
use gba_emulator::Config;
use gba_emulator::ScanlineRenderer;
use gba_emulator::System;
use gba_emulator::FRAME_CYCLES;
use pretty_assertions::assert_eq;
use util::Action;
use util::ScriptedCpu;

fn native_rate_config() -> Config {
    Config {
        speed_multiplier: 1,
        frameskip: 0,
        audio: AudioConfig {
            output_sample_rate: NATIVE_SAMPLE_RATE,
            buffer_capacity: 4096,
            overflow_policy: OverflowPolicy::DropOldest,
        },
    }
}

fn test_system(script: Vec<Action>) -> System<ScriptedCpu> {
    gba_emulator::common::logging::test_init(false);
    System::new(ScriptedCpu::new(script), vec![0; 16], native_rate_config()).unwrap()
}

fn drain_audio(system: &System<ScriptedCpu>) -> Vec<StereoFrame> {
    let buffer = system.audio_buffer();
    let mut frames = vec![[0.0; 2]; buffer.available()];
    let count = buffer.pop_into(&mut frames);
    frames.truncate(count);
    frames
}

/// A frame forwards the peripherals by exactly 280896 cycles. Measured with
/// a prescaler-1 timer plus a cascade counting its overflows.
#[test]
fn test_frame_forwards_exact_cycle_count() {
    let mut system = test_system(vec![
        Action::Write16(0x0400_0102, 0x0080), // timer 0: enable, F/1
        Action::Write16(0x0400_0106, 0x0084), // timer 1: enable, cascade
    ]);
    system.run_frame();

    let ticks = system.bus.timers.timers[1].counter() as u64 * 0x10000
        + system.bus.timers.timers[0].counter() as u64;
    assert_eq!(ticks, FRAME_CYCLES as u64);
    assert_eq!(system.cpu.executed, FRAME_CYCLES as u64);
}

/// DMA units interleave with CPU execution instead of displacing it: a frame
/// with an immediate transfer in flight still executes one instruction per
/// cycle, and the transfer completes.
#[test]
fn test_dma_does_not_displace_cpu_instructions() {
    let mut system = test_system(vec![
        Action::Write16(0x0400_00B0, 0x0000), // DMA 0 source: 02000000
        Action::Write16(0x0400_00B2, 0x0200),
        Action::Write16(0x0400_00B4, 0x0100), // dest: 02000100
        Action::Write16(0x0400_00B6, 0x0200),
        Action::Write16(0x0400_00B8, 8),
        Action::Write16(0x0400_00BA, 0x8000), // enable, immediate
    ]);
    for i in 0..8_u32 {
        system.bus.bus_write16(0x0200_0000 + i * 2, 0x1100 + i as u16);
    }
    system.run_frame();

    assert_eq!(system.cpu.executed, FRAME_CYCLES as u64);
    for i in 0..8_u32 {
        assert_eq!(system.bus.bus_read16(0x0200_0100 + i * 2), 0x1100 + i as u16);
    }
}

/// Instruction costs that do not divide the frame length overshoot the frame
/// window. The overshoot carries into the next frame instead of drifting.
#[test]
fn test_instruction_overshoot_carries_across_frames() {
    let script = vec![
        Action::Write16(0x0400_0102, 0x0080),
        Action::Write16(0x0400_0106, 0x0084),
    ];
    let mut system = System::new(
        ScriptedCpu::with_cycles_per_step(script, 5),
        vec![0; 16],
        native_rate_config(),
    )
    .unwrap();
    system.run_frame();
    system.run_frame();

    let ticks = system.bus.timers.timers[1].counter() as u64 * 0x10000
        + system.bus.timers.timers[0].counter() as u64;
    let target = 2 * FRAME_CYCLES as u64;
    assert!(ticks >= target && ticks < target + 5, "ticks = {ticks}");
}

/// A halted CPU executes nothing until a pending interrupt wakes it, and the
/// interrupt is dispatched exactly once while it stays pending.
#[test]
fn test_halt_resumes_on_timer_interrupt() {
    // Timer 0 overflows 997 ticks after its enable on cycle 4, so the
    // interrupt flag is set on cycle 1000 and the CPU resumes on cycle 1001.
    let mut system = test_system(vec![
        Action::Write16(0x0400_0208, 0x0001), // IME
        Action::Write16(0x0400_0200, 0x0008), // IE: timer 0
        Action::Write16(0x0400_0100, 0xFC1B), // reload: 65536 - 997
        Action::Write16(0x0400_0102, 0x00C0), // enable + irq
        Action::Write8(0x0400_0301, 0x00),    // halt
    ]);
    system.run_frame();

    assert_eq!(system.cpu.executed, 5 + (FRAME_CYCLES as u64 - 1000));
    assert_eq!(system.bus.irq.read_if(), 0x0008);
    assert_eq!(system.cpu.irq_raises, 1);
}

/// Interrupt dispatch requires the master enable. The pending interrupt wakes
/// the halted CPU either way.
#[test]
fn test_wake_without_dispatch_when_ime_clear() {
    let mut system = test_system(vec![
        Action::Write16(0x0400_0200, 0x0008),
        Action::Write16(0x0400_0100, 0xFC1A),
        Action::Write16(0x0400_0102, 0x00C0),
        Action::Write8(0x0400_0301, 0x00),
    ]);
    // IME stays 0: wake happens, dispatch does not.
    system.run_frame();
    assert!(system.cpu.executed > 4);
    assert_eq!(system.cpu.irq_raises, 0);

    let mut system = test_system(vec![
        Action::Write16(0x0400_0208, 0x0001), // IME
        Action::Write16(0x0400_0200, 0x0008),
        Action::Write16(0x0400_0100, 0xFC1A),
        Action::Write16(0x0400_0102, 0x00C0),
        Action::Write8(0x0400_0301, 0x00),
    ]);
    system.run_frame();
    assert_eq!(system.cpu.irq_raises, 1);
}

/// An interrupt-wait ignores pending interrupts outside its mask.
#[test]
fn test_interrupt_wait_holds_until_masked_interrupt() {
    let mut system = test_system(vec![
        Action::Write16(0x0400_0200, 0x0009), // IE: vblank + timer 0
        Action::Write16(0x0400_0004, 0x0008), // DISPSTAT: vblank irq enable
        Action::Write16(0x0400_0102, 0x00C0), // timer 0: enable + irq
        Action::IntrWait(0x0001),             // wait for vblank only
    ]);
    system.run_frame();

    // The timer overflow on cycle 65538 does not wake the CPU. The vblank
    // interrupt on cycle 197120 does.
    assert_eq!(system.cpu.executed, 4 + (FRAME_CYCLES as u64 - 197120));
    assert_eq!(system.bus.irq.read_if(), 0x0009);
    assert!(!system.bus.irq.wait.active);
}

/// Stop freezes all hardware stepping, not just the CPU.
#[test]
fn test_stop_freezes_peripherals() {
    let mut system = test_system(vec![
        Action::Write16(0x0400_0102, 0x0080), // timer 0: enable
        Action::Write8(0x0400_0301, 0x80),    // stop
    ]);
    system.run_frame();

    assert_eq!(system.bus.irq.halt_state, HaltState::Stopped);
    assert_eq!(system.cpu.executed, 2);
    // Two cycles passed before the stop took effect.
    assert_eq!(system.bus.timers.timers[0].counter(), 2);
    assert_eq!(system.audio_buffer().available(), 1);
}

/// Two systems running the same script produce identical state and identical
/// audio streams.
#[test]
fn test_deterministic_frames_and_audio() {
    let script = vec![
        Action::Write16(0x0400_0084, 0x0080), // APU master enable
        Action::Write16(0x0400_0080, 0x2277), // channel 2 both sides, full volume
        Action::Write16(0x0400_0082, 0x0002), // PSG mix at 100%
        Action::Write16(0x0400_0068, 0xF000), // envelope volume 15
        Action::Write16(0x0400_006C, 0x8400), // trigger at 128 Hz
    ];
    let mut a = test_system(script.clone());
    let mut b = test_system(script);
    a.run_frame();
    b.run_frame();

    assert_eq!(a.cpu.executed, b.cpu.executed);
    assert_eq!(a.bus.irq.read_if(), b.bus.irq.read_if());

    let audio_a = drain_audio(&a);
    let audio_b = drain_audio(&b);
    assert_eq!(audio_a, audio_b);
    assert!(audio_a.iter().any(|frame| frame[0] != 0.0));
}

/// A mixed frame is produced every 512 cycles: one video frame yields 549
/// samples at the native rate.
#[test]
fn test_audio_frames_per_video_frame() {
    let mut system = test_system(vec![Action::Write16(0x0400_0084, 0x0080)]);
    let rendered = system.run_frame();

    assert!(rendered);
    let buffer = system.audio_buffer();
    assert_eq!(buffer.available(), 549);
    assert_eq!(buffer.overflow_count(), 0);

    let mut frames = vec![[0.0; 2]; 1024];
    assert_eq!(buffer.pop_into(&mut frames), 549);
    assert_eq!(buffer.available(), 0);
}

/// Timer overflows land on their exact tick inside a multi-cycle
/// instruction. With a 512-cycle instruction cost and a 512-tick timer
/// driving FIFO A, the latch loads one tick after the fifth sample, so that
/// sample is still silent and the next one carries the FIFO value.
#[test]
fn test_timer_overflow_aligns_with_sample_ticks() {
    let script = vec![
        Action::Write16(0x0400_0084, 0x0080),      // APU master enable
        Action::Write16(0x0400_0082, 0x0304),      // FIFO A full volume, timer 0
        Action::Write32(0x0400_00A0, 0x4040_4040), // FIFO A samples
        Action::Write16(0x0400_0100, 0xFE00),      // reload: 65536 - 512
        Action::Write16(0x0400_0102, 0x0080),      // enable, F/1
    ];
    let mut system = System::new(
        ScriptedCpu::with_cycles_per_step(script, 512),
        vec![0; 16],
        native_rate_config(),
    )
    .unwrap();
    system.run_frame();

    // Samples are taken on ticks 1, 513, ..., 2049, 2561. The timer enabled
    // on tick 2049 overflows on tick 2560, between the fifth and sixth
    // sample. The resampler delays the stream by one frame of history.
    let frames = drain_audio(&system);
    assert_eq!(frames[5], [0.0, 0.0]);
    assert_eq!(frames[6], [0.5, 0.5]);
}

struct RecordingRenderer {
    lines: Rc<RefCell<Vec<u16>>>,
}

impl ScanlineRenderer for RecordingRenderer {
    fn on_scanline(&mut self, line: u16) {
        self.lines.borrow_mut().push(line);
    }
}

/// At higher speed multipliers only the last sub-frame pass is rendered, but
/// audio is generated for every pass.
#[test]
fn test_speed_multiplier_renders_last_pass_only() {
    let mut system = test_system(vec![Action::Write16(0x0400_0084, 0x0080)]);
    let lines = Rc::new(RefCell::new(Vec::new()));
    system.set_renderer(Box::new(RecordingRenderer {
        lines: lines.clone(),
    }));
    system.set_speed_multiplier(2).unwrap();

    let rendered = system.run_frame();
    assert!(rendered);
    assert_eq!(system.cpu.executed, 2 * FRAME_CYCLES as u64);

    let lines = lines.borrow();
    assert_eq!(lines.len(), 160);
    assert_eq!(lines.first(), Some(&0));
    assert_eq!(lines.last(), Some(&159));

    // Both passes produced audio.
    assert_eq!(system.audio_buffer().available(), 1098);

    assert!(system.set_speed_multiplier(0).is_err());
}

/// Frameskip drops rendering but not emulation.
#[test]
fn test_frameskip_drops_alternate_frames() {
    let mut system = test_system(vec![]);
    let lines = Rc::new(RefCell::new(Vec::new()));
    system.set_renderer(Box::new(RecordingRenderer {
        lines: lines.clone(),
    }));
    system.set_frameskip(1);

    assert!(system.run_frame());
    assert!(!system.run_frame());
    assert!(system.run_frame());
    assert_eq!(system.cpu.executed, 3 * FRAME_CYCLES as u64);
    assert_eq!(lines.borrow().len(), 2 * 160);
}

/// Breakpoints record hits without altering scheduling.
#[test]
fn test_breakpoint_hit_is_observed() {
    let mut system = test_system(vec![]);
    {
        let mut debugger = system.debugger();
        debugger.enabled = true;
        // The scripted core starts at 08000000 and advances 4 per step.
        debugger
            .breakpoints
            .add(Breakpoint::from_str("8000010").unwrap());
    }
    system.run_frame();

    let hit = system.debugger().take_break_reason().unwrap();
    assert_eq!(hit.breakpoint.address, 0x0800_0010);
    assert_eq!(system.cpu.executed, FRAME_CYCLES as u64);
}

/// Key state updates land in KEYINPUT, active low.
#[test]
fn test_key_state_reaches_keyinput() {
    let mut system = test_system(vec![]);
    system.set_key_state(Key::A, true);
    system.set_key_state(Key::B, true);
    assert_eq!(system.bus.bus_read16(0x0400_0130), 0x03FC);
}

/// Reset returns the system to the power-on state.
#[test]
fn test_reset_restores_initial_state() {
    let mut system = test_system(vec![
        Action::Write16(0x0400_0084, 0x0080),
        Action::Write16(0x0400_0102, 0x0080),
    ]);
    system.run_frame();
    system.reset();

    assert_eq!(system.cpu.executed, 0);
    assert_eq!(system.bus.timers.timers[0].counter(), 0);
    assert_eq!(system.audio_buffer().available(), 0);
    assert_eq!(system.bus.irq.halt_state, HaltState::Running);
}
