//! End-to-end scenarios exercised at the frame-reader/dispatcher boundary,
//! with fixed wire bytes lifted straight from the Firmata protocol.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use firmata_host::codec::FrameReader;
use firmata_host::constants::*;
use firmata_host::dispatch::Dispatcher;
use firmata_host::state::{AnalogPinState, BoardState, DigitalPinState};

fn feed(reader: &mut FrameReader, bytes: &[u8]) -> Vec<firmata_host::codec::Frame> {
    bytes.iter().filter_map(|&b| reader.push(b)).collect()
}

#[test]
fn analog_sample_reporting_updates_state_and_invokes_callback() {
    let state = Arc::new(BoardState::default());
    let seen_value = Arc::new(AtomicU16::new(0));
    let seen_value_clone = seen_value.clone();
    state.analog_pins.write().insert(
        2,
        AnalogPinState {
            value: 0,
            differential: 0,
            last_change: std::time::Instant::now(),
            callback: Some(Arc::new(move |_pin, value| {
                seen_value_clone.store(value, Ordering::SeqCst);
            })),
        },
    );

    let dispatcher = Dispatcher::new(state.clone());
    let mut reader = FrameReader::new();
    let frames = feed(&mut reader, &[0xE2, 0x2A, 0x03]);
    assert_eq!(frames.len(), 1);

    let mut invoked = 0;
    for frame in frames {
        for invocation in dispatcher.dispatch(frame) {
            invocation.invoke();
            invoked += 1;
        }
    }

    assert_eq!(invoked, 1);
    assert_eq!(state.analog_pins.read().get(&2).unwrap().value, 426);
    assert_eq!(seen_value.load(Ordering::SeqCst), 426);
}

#[test]
fn digital_port_change_fires_one_callback_per_changed_pin() {
    let state = Arc::new(BoardState::default());
    let changed: Arc<std::sync::Mutex<Vec<u8>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

    for pin in 8..16 {
        let changed = changed.clone();
        state.digital_pins.write().insert(
            pin,
            DigitalPinState {
                value: 0,
                pull_up: false,
                last_change: std::time::Instant::now(),
                callback: Some(Arc::new(move |pin, _value| {
                    changed.lock().unwrap().push(pin);
                })),
            },
        );
    }

    let dispatcher = Dispatcher::new(state.clone());
    let mut reader = FrameReader::new();
    // Port 1 (pins 8-15), bits 0 and 2 set -> pins 8 and 10.
    let frames = feed(&mut reader, &[DIGITAL_MESSAGE | 1, 0x05, 0x00]);
    assert_eq!(frames.len(), 1);

    let mut invocations = Vec::new();
    for frame in frames {
        invocations.extend(dispatcher.dispatch(frame));
    }
    assert_eq!(invocations.len(), 2);
    for invocation in invocations {
        invocation.invoke();
    }

    let mut fired = changed.lock().unwrap().clone();
    fired.sort();
    assert_eq!(fired, vec![8, 10]);

    assert_eq!(state.digital_pins.read().get(&8).unwrap().value, 1);
    assert_eq!(state.digital_pins.read().get(&10).unwrap().value, 1);
    assert_eq!(state.digital_pins.read().get(&9).unwrap().value, 0);
    assert_eq!(state.digital_pins.read().get(&15).unwrap().value, 0);
}

#[test]
fn sysex_frame_never_contains_embedded_start_or_end_markers() {
    let mut reader = FrameReader::new();
    let frames = feed(
        &mut reader,
        &[START_SYSEX, REPORT_FIRMWARE, 2, 5, b'A', b'B', END_SYSEX],
    );
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        firmata_host::codec::Frame::Sysex { command, body } => {
            assert_eq!(*command, REPORT_FIRMWARE);
            assert!(!body.contains(&START_SYSEX));
            assert!(!body.contains(&END_SYSEX));
        }
        other => panic!("expected a Sysex frame, got {:?}", other),
    }
}

#[test]
fn frame_reader_suspended_mid_byte_delivers_nothing() {
    let mut reader = FrameReader::new();
    // A SysEx frame split across two feeds: nothing should be emitted until
    // the terminating END_SYSEX byte arrives.
    let frames = feed(&mut reader, &[START_SYSEX, REPORT_FIRMWARE, 2]);
    assert!(frames.is_empty());
    let frames = feed(&mut reader, &[5, END_SYSEX]);
    assert_eq!(frames.len(), 1);
}
