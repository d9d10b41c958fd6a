//! Public API: pin configuration, reads, writes, queries, and the startup
//! handshake that brings a board under control.
//!
//! A [`Board`] owns the [`Transport`] write half directly (writes happen on
//! the calling thread) and hands the read half to a Receiver worker. A
//! Reporter worker drains the byte queue the Receiver fills, runs it through
//! the [`FrameReader`] and [`Dispatcher`], and invokes callbacks. An optional
//! Keep-Alive worker pings the board on a timer. All three share the same
//! [`BoardState`] through an `Arc`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use parking_lot::Mutex as PLMutex;

use crate::codec::{encode_u14, encode_u7_stream, FrameReader};
use crate::config::{BoardConfig, Endpoint};
use crate::constants::*;
use crate::dispatch::Dispatcher;
use crate::errors::{Error, HardwareError, ProtocolError};
use crate::state::{
    AnalogCallback, AnalogPinState, BoardState, DhtCallback, DhtRegistration, DigitalCallback,
    DigitalPinState, I2cCallback, I2cDeviceState, PinCapability, QueryKind, SonarCallback,
    SonarState,
};
use crate::transport::{candidate_serial_ports, SerialTransport, TcpTransport, Transport};

/// The four sensor variants the DHT family exposes, carried on the wire as
/// their matching Firmata sensor-type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtSensorType {
    Dht11,
    Dht12,
    Dht21,
    Dht22,
    Am2301,
}

impl DhtSensorType {
    fn wire_value(self) -> u8 {
        match self {
            DhtSensorType::Dht11 => DHT11,
            DhtSensorType::Dht12 => DHT12,
            DhtSensorType::Dht21 => DHT21,
            DhtSensorType::Dht22 => DHT22,
            DhtSensorType::Am2301 => AM2301,
        }
    }
}

/// A host-side driver for a Firmata-speaking board.
///
/// Constructed via [`Board::open`], which runs the full discovery and
/// handshake sequence described in the crate's module docs before returning.
pub struct Board {
    state: Arc<BoardState>,
    transport: Box<dyn Transport>,
    config: BoardConfig,
    run_flag: Arc<AtomicBool>,
    sysex_lock: PLMutex<()>,
    receiver_handle: Option<JoinHandle<()>>,
    reporter_handle: Option<JoinHandle<()>>,
    keep_alive_handle: Option<JoinHandle<()>>,
    keep_alive_run: Arc<AtomicBool>,
    shutdown_on_exception: bool,
}

/// Shared byte queue the Receiver worker fills and the Reporter worker
/// drains. Plain `std::sync::Mutex` (not `parking_lot`) since this is the one
/// place a worker parks on a condvar across an await-more-bytes boundary.
struct ByteQueue {
    bytes: Mutex<VecDeque<u8>>,
    condvar: std::sync::Condvar,
}

impl ByteQueue {
    fn new() -> Self {
        Self {
            bytes: Mutex::new(VecDeque::new()),
            condvar: std::sync::Condvar::new(),
        }
    }

    fn push(&self, byte: u8) {
        self.bytes.lock().unwrap().push_back(byte);
        self.condvar.notify_one();
    }

    /// Blocks until at least one byte is available or the timeout elapses,
    /// then drains everything currently queued.
    fn drain_wait(&self, timeout: Duration) -> Vec<u8> {
        let mut guard = self.bytes.lock().unwrap();
        if guard.is_empty() {
            let (g, _) = self
                .condvar
                .wait_timeout_while(guard, timeout, |q| q.is_empty())
                .unwrap();
            guard = g;
        }
        guard.drain(..).collect()
    }
}

impl Board {
    /// Runs the full startup sequence against `config` and returns a ready
    /// [`Board`], or the first error encountered while doing so.
    ///
    /// Per spec: resolve the transport (explicit serial port, explicit TCP
    /// endpoint, or auto-detection), start the Receiver and Reporter
    /// workers, query firmware and analog mapping, then pace sensor reports
    /// with a 19ms sampling interval.
    pub fn open(config: BoardConfig) -> Result<Self, Error> {
        let transport = Self::resolve_transport(&config)?;
        let state = Arc::new(BoardState::default());
        let run_flag = Arc::new(AtomicBool::new(true));

        let shutdown_on_exception = config.shutdown_on_exception;
        let mut board = Self {
            state,
            transport,
            config: config.clone(),
            run_flag,
            sysex_lock: PLMutex::new(()),
            receiver_handle: None,
            reporter_handle: None,
            keep_alive_handle: None,
            keep_alive_run: Arc::new(AtomicBool::new(false)),
            shutdown_on_exception,
        };

        board.start_workers()?;
        board.query_firmware_version()?;
        board.refresh_analog_mapping()?;
        board.set_sampling_interval(19)?;

        if let Some(interval) = config.keep_alive_interval {
            board.keep_alive(interval, 0.3);
        }

        Ok(board)
    }

    fn resolve_transport(config: &BoardConfig) -> Result<Box<dyn Transport>, Error> {
        match &config.endpoint {
            Endpoint::Tcp { host, port } => {
                let mut transport = TcpTransport::new(host.clone(), *port);
                transport.open()?;
                Ok(Box::new(transport))
            }
            Endpoint::Serial { port, baud_rate } => {
                let mut transport = SerialTransport::new(port.clone(), *baud_rate);
                transport.open()?;
                std::thread::sleep(config.arduino_wait);
                Ok(Box::new(transport))
            }
            Endpoint::AutoDetect { baud_rate } => {
                Self::discover_serial_board(*baud_rate, config)
            }
        }
    }

    /// Opens every USB serial candidate, waits for the boards to finish
    /// resetting, then probes each with `ARE_YOU_THERE` and accepts the
    /// first whose `I_AM_HERE` reply carries the configured instance id.
    fn discover_serial_board(
        baud_rate: u32,
        config: &BoardConfig,
    ) -> Result<Box<dyn Transport>, Error> {
        let candidates = candidate_serial_ports()?;
        let mut opened: Vec<SerialTransport> = Vec::new();
        for port_name in &candidates {
            let mut transport = SerialTransport::new(port_name.clone(), baud_rate);
            if transport.open().is_ok() {
                debug!("discovery: opened candidate port {}", port_name);
                opened.push(transport);
            }
        }

        std::thread::sleep(config.arduino_wait);

        for mut transport in opened {
            if Self::probe_are_you_there(&mut transport, config.instance_id) {
                return Ok(Box::new(transport));
            }
        }

        Err(Error::from(ProtocolError::DiscoveryFailed {
            instance_id: config.instance_id,
        }))
    }

    fn probe_are_you_there(transport: &mut dyn Transport, instance_id: u8) -> bool {
        if transport
            .write_all(&[START_SYSEX, ARE_YOU_THERE, END_SYSEX])
            .is_err()
        {
            return false;
        }

        let mut reply = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            match transport.read_byte(Duration::from_millis(200)) {
                Ok(byte) => {
                    reply.push(byte);
                    if byte == END_SYSEX {
                        break;
                    }
                }
                Err(_) => continue,
            }
        }

        // Expect [START_SYSEX, I_AM_HERE, instance_id, END_SYSEX].
        reply.len() == 4
            && reply[0] == START_SYSEX
            && reply[1] == I_AM_HERE
            && reply[2] == instance_id
            && reply[3] == END_SYSEX
    }

    fn start_workers(&mut self) -> Result<(), Error> {
        let read_half = self.transport.try_clone()?;
        let queue = Arc::new(ByteQueue::new());

        let receiver_queue = queue.clone();
        let receiver_run = self.run_flag.clone();
        let mut receiver_transport = read_half;
        self.receiver_handle = Some(std::thread::spawn(move || {
            Self::receiver_loop(&mut *receiver_transport, &receiver_queue, &receiver_run);
        }));

        let reporter_queue = queue;
        let reporter_run = self.run_flag.clone();
        let reporter_state = self.state.clone();
        self.reporter_handle = Some(std::thread::spawn(move || {
            Self::reporter_loop(&reporter_queue, &reporter_state, &reporter_run);
        }));

        Ok(())
    }

    /// Pulls bytes from the transport and appends them to the shared queue.
    /// Never touches a state-table lock.
    fn receiver_loop(transport: &mut dyn Transport, queue: &ByteQueue, run: &AtomicBool) {
        while run.load(Ordering::Relaxed) {
            match transport.read_byte(Duration::from_millis(200)) {
                Ok(byte) => queue.push(byte),
                Err(_) => continue,
            }
        }
        trace!("receiver thread exiting");
    }

    /// Drains the shared queue through the frame reader and dispatcher,
    /// invoking callbacks outside of any table lock.
    fn reporter_loop(queue: &ByteQueue, state: &Arc<BoardState>, run: &AtomicBool) {
        let mut frame_reader = FrameReader::new();
        let dispatcher = Dispatcher::new(state.clone());
        while run.load(Ordering::Relaxed) {
            let bytes = queue.drain_wait(Duration::from_millis(200));
            for byte in bytes {
                if let Some(frame) = frame_reader.push(byte) {
                    for invocation in dispatcher.dispatch(frame) {
                        invocation.invoke();
                    }
                }
            }
        }
        trace!("reporter thread exiting");
    }

    /// Clamps `period` to `[0, 10]` seconds and `margin` to `[0.1, 0.9]`.
    /// `period == 0` stops any previously running keep-alive worker and
    /// leaves it disabled. Otherwise (re)starts a worker that emits a
    /// `KEEP_ALIVE` SysEx every `period - margin` seconds.
    pub fn keep_alive(&mut self, period: Duration, margin: f64) {
        self.stop_keep_alive();

        let period_secs = period.as_secs_f64().clamp(0.0, 10.0);
        if period_secs <= 0.0 {
            return;
        }
        let margin = margin.clamp(0.1, 0.9);
        let sleep = Duration::from_secs_f64((period_secs - margin).max(0.0));

        let run = Arc::new(AtomicBool::new(true));
        self.keep_alive_run = run.clone();
        let mut transport = match self.transport.try_clone() {
            Ok(t) => t,
            Err(err) => {
                warn!("keep-alive thread not started: {}", err);
                return;
            }
        };
        let period_u16 = period_secs as u16;

        self.keep_alive_handle = Some(std::thread::spawn(move || {
            while run.load(Ordering::Relaxed) {
                std::thread::sleep(sleep);
                if !run.load(Ordering::Relaxed) {
                    break;
                }
                let (lsb, msb) = encode_u14(period_u16);
                let _ = transport.write_all(&[START_SYSEX, KEEP_ALIVE, lsb, msb, END_SYSEX]);
            }
            trace!("keep-alive thread exiting");
        }));
    }

    fn stop_keep_alive(&mut self) {
        self.keep_alive_run.store(false, Ordering::Relaxed);
        if let Some(handle) = self.keep_alive_handle.take() {
            let _ = handle.join();
        }
    }

    // ########################################
    // Low-level frame writers

    fn write_channel(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_raw(bytes)
    }

    fn write_sysex(&mut self, command: u8, payload: &[u8]) -> Result<(), Error> {
        let _guard = self.sysex_lock.lock();
        let mut frame = Vec::with_capacity(payload.len() + 3);
        frame.push(START_SYSEX);
        frame.push(command);
        frame.extend_from_slice(payload);
        frame.push(END_SYSEX);
        self.write_raw(&frame)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match self.transport.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.shutdown_on_exception {
                    self.run_flag.store(false, Ordering::Relaxed);
                }
                Err(err)
            }
        }
    }

    // ########################################
    // Handshake queries

    fn query_firmware_version(&mut self) -> Result<(), Error> {
        self.state.firmware_reply.arm(QueryKind::Firmware);
        self.write_sysex(REPORT_FIRMWARE, &[])?;
        self.state
            .firmware_reply
            .wait(QueryKind::Firmware, self.config.reply_timeout)
            .map_err(|_| Error::from(ProtocolError::FirmwareUnavailable))?;
        Ok(())
    }

    fn refresh_analog_mapping(&mut self) -> Result<Vec<u8>, Error> {
        self.state
            .analog_mapping_reply
            .arm(QueryKind::AnalogMapping);
        self.write_sysex(ANALOG_MAPPING_QUERY, &[])?;
        self.state
            .analog_mapping_reply
            .wait(QueryKind::AnalogMapping, self.config.reply_timeout)
    }

    /// `digital_pin_count - analog_pin_count`, fixed after the handshake.
    pub fn first_analog_pin(&self) -> usize {
        self.state.first_analog_pin()
    }

    /// This crate's own version, for diagnostics -- not the connected
    /// board's Firmata version (see [`Self::get_firmware_version`]).
    pub fn driver_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    // ########################################
    // Pin mode setters

    fn send_set_pin_mode(&mut self, pin: u8, mode: u8) -> Result<(), Error> {
        self.write_channel(&[SET_PIN_MODE, pin, mode])
    }

    /// Enables digital reporting for `pin`'s whole port (all 8 pins report
    /// together; this is part of Firmata's protocol, not a per-pin choice).
    pub fn enable_digital_reporting(&mut self, pin: u8) -> Result<(), Error> {
        let port = pin / PINS_PER_PORT;
        self.write_channel(&[REPORT_DIGITAL | port, 1])
    }

    /// Disables digital reporting for `pin`'s whole port.
    pub fn disable_digital_reporting(&mut self, pin: u8) -> Result<(), Error> {
        let port = pin / PINS_PER_PORT;
        self.write_channel(&[REPORT_DIGITAL | port, 0])
    }

    /// Alias for [`Self::set_pin_mode_analog_input`].
    pub fn enable_analog_reporting(
        &mut self,
        pin: u8,
        differential: u16,
        callback: Option<AnalogCallback>,
    ) -> Result<(), Error> {
        self.set_pin_mode_analog_input(pin, differential, callback)
    }

    /// Disabling analog reporting reverts the underlying digital pin to a
    /// plain digital input, matching the original driver's behavior.
    pub fn disable_analog_reporting(&mut self, pin: u8) -> Result<(), Error> {
        let digital_pin = pin + self.first_analog_pin() as u8;
        self.set_pin_mode_digital_input(digital_pin, None)
    }

    fn ensure_digital_pin(&self, pin: u8, pull_up: bool, callback: Option<DigitalCallback>) {
        let mut pins = self.state.digital_pins.write();
        pins.insert(
            pin,
            DigitalPinState {
                value: 0,
                pull_up,
                last_change: Instant::now(),
                callback,
            },
        );
    }

    pub fn set_pin_mode_digital_input(
        &mut self,
        pin: u8,
        callback: Option<DigitalCallback>,
    ) -> Result<(), Error> {
        self.ensure_digital_pin(pin, false, callback);
        self.send_set_pin_mode(pin, INPUT)?;
        self.enable_digital_reporting(pin)
    }

    pub fn set_pin_mode_digital_input_pullup(
        &mut self,
        pin: u8,
        callback: Option<DigitalCallback>,
    ) -> Result<(), Error> {
        self.ensure_digital_pin(pin, true, callback);
        self.send_set_pin_mode(pin, PULLUP)?;
        self.enable_digital_reporting(pin)
    }

    pub fn set_pin_mode_digital_output(&mut self, pin: u8) -> Result<(), Error> {
        self.ensure_digital_pin(pin, false, None);
        self.send_set_pin_mode(pin, OUTPUT)
    }

    pub fn set_pin_mode_analog_input(
        &mut self,
        pin: u8,
        differential: u16,
        callback: Option<AnalogCallback>,
    ) -> Result<(), Error> {
        {
            let mut pins = self.state.analog_pins.write();
            pins.insert(
                pin,
                AnalogPinState {
                    value: 0,
                    differential,
                    last_change: Instant::now(),
                    callback,
                },
            );
        }
        let wire_pin = pin + self.first_analog_pin() as u8;
        self.send_set_pin_mode(wire_pin, ANALOG)
    }

    pub fn set_pin_mode_pwm_output(&mut self, pin: u8) -> Result<(), Error> {
        self.send_set_pin_mode(pin, PWM)
    }

    pub fn set_pin_mode_servo(
        &mut self,
        pin: u8,
        min_pulse: u16,
        max_pulse: u16,
    ) -> Result<(), Error> {
        let (min_lsb, min_msb) = encode_u14(min_pulse);
        let (max_lsb, max_msb) = encode_u14(max_pulse);
        self.write_sysex(SERVO_CONFIG, &[pin, min_lsb, min_msb, max_lsb, max_msb])?;
        self.send_set_pin_mode(pin, SERVO)
    }

    pub fn set_pin_mode_tone(&mut self, pin: u8) -> Result<(), Error> {
        self.send_set_pin_mode(pin, TONE)
    }

    pub fn set_pin_mode_i2c(&mut self, read_delay_us: u16) -> Result<(), Error> {
        let (lsb, msb) = encode_u14(read_delay_us);
        self.write_sysex(I2C_CONFIG, &[lsb, msb])
    }

    /// `echo_pin` is configured alongside `trigger_pin`, matching the original
    /// driver's behavior of putting both pins into SONAR/INPUT mode.
    pub fn set_pin_mode_sonar(
        &mut self,
        trigger_pin: u8,
        echo_pin: u8,
        timeout: u32,
        callback: Option<SonarCallback>,
    ) -> Result<(), Error> {
        if self.state.sonar_devices.read().len() >= MAX_SONAR_DEVICES
            && !self.state.sonar_devices.read().contains_key(&trigger_pin)
        {
            warn!("sonar_config: maximum number of devices assigned - ignoring request");
            return Ok(());
        }

        self.send_set_pin_mode(trigger_pin, SONAR)?;
        self.send_set_pin_mode(echo_pin, SONAR)?;

        self.state.sonar_devices.write().insert(
            trigger_pin,
            SonarState {
                distance: 0,
                last_change: Instant::now(),
                callback,
            },
        );

        let timeout_bytes = encode_u7_stream(timeout, 2);
        self.write_sysex(
            SONAR_CONFIG,
            &[trigger_pin, echo_pin, timeout_bytes[0], timeout_bytes[1]],
        )
    }

    pub fn set_pin_mode_dht(
        &mut self,
        pin: u8,
        sensor_type: DhtSensorType,
        differential: f64,
        callback: Option<DhtCallback>,
    ) -> Result<(), Error> {
        let already_registered = self.state.dht_registrations.read().contains_key(&pin);
        if already_registered {
            if let Some(registration) = self.state.dht_registrations.write().get_mut(&pin) {
                registration.differential = differential;
            }
            return Ok(());
        }

        self.state.dht_registrations.write().insert(
            pin,
            DhtRegistration {
                sensor_type: sensor_type.wire_value(),
                differential,
                last_humidity: 0.0,
                last_temperature: 0.0,
                callback,
            },
        );
        self.write_sysex(DHT_CONFIG, &[pin, sensor_type.wire_value()])
    }

    pub fn set_pin_mode_stepper(
        &mut self,
        steps_per_revolution: u16,
        stepper_pins: &[u8],
    ) -> Result<(), Error> {
        let (lsb, msb) = encode_u14(steps_per_revolution);
        let mut payload = vec![STEPPER_CONFIGURE, lsb, msb];
        payload.extend_from_slice(stepper_pins);
        self.write_sysex(STEPPER_DATA, &payload)
    }

    // ########################################
    // Writes

    pub fn digital_write(&mut self, pin: u8, value: bool) -> Result<(), Error> {
        let (port, byte) = self.state.port_output_cache.set_pin(pin, value);
        let (lsb, msb) = encode_u14(byte as u16);
        self.write_channel(&[DIGITAL_MESSAGE | port, lsb, msb])
    }

    pub fn digital_pin_write(&mut self, pin: u8, value: bool) -> Result<(), Error> {
        self.write_channel(&[SET_DIGITAL_PIN_VALUE, pin, value as u8])
    }

    pub fn pwm_write(&mut self, pin: u8, value: u16) -> Result<(), Error> {
        if pin <= 15 {
            let (lsb, msb) = encode_u14(value);
            self.write_channel(&[ANALOG_MESSAGE | pin, lsb, msb])
        } else {
            let bytes = encode_u7_stream(value as u32, 3);
            self.write_sysex(EXTENDED_ANALOG, &[pin, bytes[0], bytes[1], bytes[2]])
        }
    }

    /// Alias for [`Self::pwm_write`], for pins previously configured with
    /// [`Self::set_pin_mode_servo`].
    pub fn servo_write(&mut self, pin: u8, position: u16) -> Result<(), Error> {
        self.pwm_write(pin, position)
    }

    pub fn stepper_write(&mut self, speed: u32, signed_steps: i32) -> Result<(), Error> {
        let direction: u8 = if signed_steps >= 0 { 1 } else { 0 };
        let steps = signed_steps.unsigned_abs();
        let speed_bytes = encode_u7_stream(speed, 3);
        let steps_bytes = encode_u7_stream(steps, 2);
        let mut payload = vec![STEPPER_STEP];
        payload.extend_from_slice(&speed_bytes);
        payload.extend_from_slice(&steps_bytes);
        payload.push(direction);
        self.write_sysex(STEPPER_DATA, &payload)
    }

    pub fn play_tone(&mut self, pin: u8, frequency: u16, duration: u16) -> Result<(), Error> {
        let (freq_lsb, freq_msb) = encode_u14(frequency);
        let (dur_lsb, dur_msb) = encode_u14(duration);
        self.write_sysex(
            TONE_DATA,
            &[TONE_TONE, pin, freq_lsb, freq_msb, dur_lsb, dur_msb],
        )
    }

    pub fn play_tone_continuously(&mut self, pin: u8, frequency: u16) -> Result<(), Error> {
        let (freq_lsb, freq_msb) = encode_u14(frequency);
        self.write_sysex(TONE_DATA, &[TONE_TONE, pin, freq_lsb, freq_msb, 0, 0])
    }

    pub fn play_tone_off(&mut self, pin: u8) -> Result<(), Error> {
        self.write_sysex(TONE_DATA, &[TONE_NO_TONE, pin])
    }

    pub fn set_sampling_interval(&mut self, interval_ms: u16) -> Result<(), Error> {
        let (lsb, msb) = encode_u14(interval_ms);
        self.write_sysex(SAMPLING_INTERVAL, &[lsb, msb])
    }

    // ########################################
    // I2C

    pub fn i2c_write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error> {
        let mut payload = vec![address, I2C_WRITE];
        for &byte in bytes {
            payload.push(byte & 0x7F);
            payload.push((byte >> 7) & 0x7F);
        }
        self.write_sysex(I2C_REQUEST, &payload)
    }

    fn i2c_read_request(
        &mut self,
        address: u8,
        register: Option<u16>,
        number_of_bytes: u16,
        mode: u8,
        callback: Option<I2cCallback>,
    ) -> Result<(), Error> {
        {
            let mut devices = self.state.i2c_devices.write();
            devices.entry(address).or_insert_with(|| I2cDeviceState {
                data: Vec::new(),
                last_change: Instant::now(),
                callback,
            });
        }

        let mut payload = vec![address, mode];
        if let Some(register) = register {
            let (lsb, msb) = encode_u14(register);
            payload.push(lsb);
            payload.push(msb);
        }
        let (count_lsb, count_msb) = encode_u14(number_of_bytes);
        payload.push(count_lsb);
        payload.push(count_msb);
        self.write_sysex(I2C_REQUEST, &payload)
    }

    pub fn i2c_read(
        &mut self,
        address: u8,
        register: Option<u16>,
        number_of_bytes: u16,
        callback: Option<I2cCallback>,
    ) -> Result<(), Error> {
        self.i2c_read_request(address, register, number_of_bytes, I2C_READ, callback)
    }

    pub fn i2c_read_continuous(
        &mut self,
        address: u8,
        register: Option<u16>,
        number_of_bytes: u16,
        callback: Option<I2cCallback>,
    ) -> Result<(), Error> {
        self.i2c_read_request(
            address,
            register,
            number_of_bytes,
            I2C_READ_CONTINUOUSLY,
            callback,
        )
    }

    pub fn i2c_read_restart_transmission(
        &mut self,
        address: u8,
        register: Option<u16>,
        number_of_bytes: u16,
        callback: Option<I2cCallback>,
    ) -> Result<(), Error> {
        self.i2c_read_request(
            address,
            register,
            number_of_bytes,
            I2C_READ | I2C_END_TX_MASK,
            callback,
        )
    }

    pub fn i2c_read_saved_data(&self, address: u8) -> Option<(Vec<u16>, Instant)> {
        self.state
            .i2c_devices
            .read()
            .get(&address)
            .map(|entry| (entry.data.clone(), entry.last_change))
    }

    // ########################################
    // Polled reads (no I/O)

    pub fn analog_read(&self, pin: u8) -> Option<(u16, Instant)> {
        self.state
            .analog_pins
            .read()
            .get(&pin)
            .map(|entry| (entry.value, entry.last_change))
    }

    pub fn digital_read(&self, pin: u8) -> Option<(u8, Instant)> {
        self.state
            .digital_pins
            .read()
            .get(&pin)
            .map(|entry| (entry.value, entry.last_change))
    }

    pub fn dht_read(&self, pin: u8) -> Option<(f64, f64, Instant)> {
        self.state.dht_registrations.read().get(&pin).map(|entry| {
            (
                entry.last_humidity,
                entry.last_temperature,
                Instant::now(),
            )
        })
    }

    pub fn sonar_read(&self, trigger_pin: u8) -> Option<(u16, Instant)> {
        self.state
            .sonar_devices
            .read()
            .get(&trigger_pin)
            .map(|entry| (entry.distance, entry.last_change))
    }

    // ########################################
    // Bounded queries

    pub fn get_firmware_version(&mut self) -> Result<(u8, u8, String), Error> {
        self.state.firmware_reply.arm(QueryKind::Firmware);
        self.write_sysex(REPORT_FIRMWARE, &[])?;
        self.state
            .firmware_reply
            .wait(QueryKind::Firmware, self.config.reply_timeout)
    }

    pub fn get_protocol_version(&mut self) -> Result<(u8, u8), Error> {
        self.state.version_reply.arm(QueryKind::Version);
        self.write_channel(&[REPORT_VERSION])?;
        self.state
            .version_reply
            .wait(QueryKind::Version, self.config.reply_timeout)
    }

    /// Polls indefinitely in short steps (per spec.md's documented choice to
    /// not hard-cap this query), but bounded by `reply_timeout` as the
    /// resolved open question recommends. Returns the per-pin capability
    /// map reported by the board.
    pub fn get_capability_report(&mut self) -> Result<HashMap<u8, PinCapability>, Error> {
        self.state.capability_reply.arm(QueryKind::Capability);
        self.write_sysex(CAPABILITY_QUERY, &[])?;
        self.state
            .capability_reply
            .wait(QueryKind::Capability, self.config.reply_timeout)
    }

    /// Returns the analog map reported by the board: one byte per digital
    /// pin, `NON_ANALOG_PIN` where the pin has no analog channel.
    pub fn get_analog_map(&mut self) -> Result<Vec<u8>, Error> {
        self.refresh_analog_mapping()
    }

    pub fn get_pin_state(&mut self, pin: u8) -> Result<(u8, u8, u32), Error> {
        self.state.pin_state_reply.arm(QueryKind::PinState(pin));
        self.write_sysex(PIN_STATE_QUERY, &[pin])?;
        self.state
            .pin_state_reply
            .wait(QueryKind::PinState(pin), self.config.reply_timeout)
    }

    // ########################################
    // Shutdown

    pub fn send_reset(&mut self) -> Result<(), Error> {
        self.write_raw(&[SYSTEM_RESET])
    }

    /// Disables reporting on every known pin, resets the board, stops the
    /// background workers, and closes the transport.
    pub fn shutdown(mut self) -> Result<(), Error> {
        let digital_pins: Vec<u8> = self.state.digital_pins.read().keys().copied().collect();
        for pin in digital_pins {
            let port = pin / PINS_PER_PORT;
            let _ = self.write_channel(&[REPORT_DIGITAL | port, 0]);
        }
        let analog_pins: Vec<u8> = self.state.analog_pins.read().keys().copied().collect();
        for pin in analog_pins {
            let _ = self.write_channel(&[REPORT_ANALOG | (pin & 0x0F), 0]);
        }

        let _ = self.write_raw(&[SYSTEM_RESET]);

        self.stop_keep_alive();

        self.run_flag.store(false, Ordering::Relaxed);
        if let Some(handle) = self.receiver_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reporter_handle.take() {
            let _ = handle.join();
        }

        self.transport.close()
    }

    /// Validates a digital pin index against the handshake-discovered pin
    /// count. Per spec.md's invariant that every pin index used by the API
    /// must lie within the digital pin vector.
    pub fn validate_digital_pin(&self, pin: u8) -> Result<(), Error> {
        let count = *self.state.digital_pin_count.read();
        if (pin as usize) < count {
            Ok(())
        } else {
            Err(Error::from(HardwareError::UnknownPin { pin }))
        }
    }

    /// Validates an analog ordinal against the handshake-discovered analog
    /// pin count.
    pub fn validate_analog_pin(&self, analog_pin: u8) -> Result<(), Error> {
        let count = *self.state.analog_pin_count.read();
        if (analog_pin as usize) < count {
            Ok(())
        } else {
            Err(Error::from(HardwareError::InvalidArgument {
                info: format!("analog pin index {} out of range", analog_pin),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockTransport;
    use std::sync::atomic::AtomicU16;

    /// Builds a [`Board`] whose handshake is fed canned replies through a
    /// [`MockTransport`], bypassing [`Board::open`]'s transport resolution.
    fn test_board() -> (Board, MockTransport) {
        let mock = MockTransport::new();
        // REPORT_FIRMWARE reply.
        mock.push_inbound(&[START_SYSEX, REPORT_FIRMWARE, 2, 5, END_SYSEX]);
        // ANALOG_MAPPING_RESPONSE: 4 digital pins, pins 2 and 3 are analog channels 0 and 1.
        mock.push_inbound(&[
            START_SYSEX,
            ANALOG_MAPPING_RESPONSE,
            NON_ANALOG_PIN,
            NON_ANALOG_PIN,
            0,
            1,
            END_SYSEX,
        ]);

        let config = BoardConfig::default().without_keep_alive();
        let state = Arc::new(BoardState::default());
        let run_flag = Arc::new(AtomicBool::new(true));
        let mut board = Board {
            state,
            transport: Box::new(mock.clone()),
            config,
            run_flag,
            sysex_lock: PLMutex::new(()),
            receiver_handle: None,
            reporter_handle: None,
            keep_alive_handle: None,
            keep_alive_run: Arc::new(AtomicBool::new(false)),
            shutdown_on_exception: true,
        };
        board.start_workers().unwrap();
        board.query_firmware_version().unwrap();
        board.refresh_analog_mapping().unwrap();
        (board, mock)
    }

    #[test]
    fn test_handshake_populates_pin_counts() {
        let (board, _mock) = test_board();
        assert_eq!(*board.state.digital_pin_count.read(), 4);
        assert_eq!(*board.state.analog_pin_count.read(), 2);
        assert_eq!(board.first_analog_pin(), 2);
        board.shutdown().unwrap();
    }

    #[test]
    fn test_pwm_write_short_form() {
        let (mut board, mock) = test_board();
        mock.take_outbound();
        board.pwm_write(9, 200).unwrap();
        assert_eq!(mock.take_outbound(), vec![0xE9, 0x48, 0x01]);
        board.shutdown().unwrap();
    }

    #[test]
    fn test_play_tone_off_emits_exact_bytes() {
        let (mut board, mock) = test_board();
        mock.take_outbound();
        board.play_tone_off(3).unwrap();
        assert_eq!(
            mock.take_outbound(),
            vec![START_SYSEX, TONE_DATA, TONE_NO_TONE, 3, END_SYSEX]
        );
        board.shutdown().unwrap();
    }

    #[test]
    fn test_digital_write_coalesces_port() {
        let (mut board, mock) = test_board();
        mock.take_outbound();
        board.digital_write(13, true).unwrap();
        // Pin 13 is bit 5 of port 1.
        assert_eq!(
            mock.take_outbound(),
            vec![DIGITAL_MESSAGE | 1, 0b0010_0000, 0]
        );
        board.shutdown().unwrap();
    }

    #[test]
    fn test_i2c_read_emits_request_and_dispatches_reply() {
        let (mut board, mock) = test_board();
        mock.take_outbound();
        let seen = Arc::new(AtomicU16::new(0));
        let seen_clone = seen.clone();
        board
            .i2c_read(
                0x53,
                Some(0x32),
                6,
                Some(Arc::new(move |_addr, data| {
                    if let Some(&first) = data.first() {
                        seen_clone.store(first, Ordering::SeqCst);
                    }
                })),
            )
            .unwrap();
        assert_eq!(
            mock.take_outbound(),
            vec![
                START_SYSEX,
                I2C_REQUEST,
                0x53,
                I2C_READ,
                0x32,
                0x00,
                0x06,
                0x00,
                END_SYSEX
            ]
        );

        mock.push_inbound(&[
            START_SYSEX,
            I2C_REPLY,
            0x53,
            0x00,
            0x32,
            0x00,
            0x12,
            0x00,
            0x34,
            0x00,
            END_SYSEX,
        ]);
        // Give the reporter thread time to dispatch.
        let deadline = Instant::now() + Duration::from_secs(1);
        while seen.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 0x12);
        board.shutdown().unwrap();
    }

    #[test]
    fn test_get_protocol_version_queries_and_waits() {
        let (mut board, mock) = test_board();
        mock.take_outbound();
        mock.push_inbound(&[REPORT_VERSION, 2, 5]);
        let (major, minor) = board.get_protocol_version().unwrap();
        assert_eq!((major, minor), (2, 5));
        assert_eq!(mock.take_outbound(), vec![REPORT_VERSION]);
        board.shutdown().unwrap();
    }

    #[test]
    fn test_get_pin_state_times_out_without_reply() {
        let (mut board, _mock) = test_board();
        board.config.reply_timeout = Duration::from_millis(20);
        let result = board.get_pin_state(2);
        assert!(result.is_err());
        board.shutdown().unwrap();
    }

    #[test]
    fn test_get_capability_report_returns_parsed_map() {
        let (mut board, mock) = test_board();
        mock.take_outbound();
        // Pin 0: INPUT(res 1); pin 1: ANALOG(res 10).
        mock.push_inbound(&[
            START_SYSEX,
            CAPABILITY_RESPONSE,
            0,
            1,
            SYSEX_REALTIME,
            2,
            10,
            SYSEX_REALTIME,
            END_SYSEX,
        ]);
        let capabilities = board.get_capability_report().unwrap();
        assert_eq!(
            mock.take_outbound(),
            vec![START_SYSEX, CAPABILITY_QUERY, END_SYSEX]
        );
        assert_eq!(capabilities.get(&0).unwrap().supported_modes, vec![(0, 1)]);
        assert_eq!(capabilities.get(&1).unwrap().supported_modes, vec![(2, 10)]);
        board.shutdown().unwrap();
    }

    #[test]
    fn test_get_analog_map_returns_raw_bytes() {
        let (mut board, mock) = test_board();
        mock.take_outbound();
        mock.push_inbound(&[
            START_SYSEX,
            ANALOG_MAPPING_RESPONSE,
            NON_ANALOG_PIN,
            NON_ANALOG_PIN,
            0,
            1,
            END_SYSEX,
        ]);
        let analog_map = board.get_analog_map().unwrap();
        assert_eq!(
            mock.take_outbound(),
            vec![START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX]
        );
        assert_eq!(analog_map, vec![NON_ANALOG_PIN, NON_ANALOG_PIN, 0, 1]);
        board.shutdown().unwrap();
    }
}
