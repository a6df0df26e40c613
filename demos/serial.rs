use std::env;
use std::io::Write as _;
use std::sync::mpsc::{self, Receiver};

use embedded_hal::digital::{ErrorType, OutputPin};
use inquire::Select;
use modbus_fleet_monitor::{
    CONFIG_MAGIC, DeviceLivenessTable, FleetSettings, MAX_DEVICES, ModbusMaster, TELEMETRY_CAPACITY,
    boot::{bring_up, fatal_blink},
    config::{CONFIG_NAMESPACE, ConfigStore, DEVICE_COUNT_KEY, MemoryStore, SENTINEL_KEY},
    console::Console,
    indicator::StatusIndicator,
    runtime::{StdClock, SystemReset, run_polling, run_supervision},
    supervisor::HealthSupervisor,
};
use serialport::SerialPort;

// Field bus settings - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// A 20 register answer takes roughly 50 ms on the wire at 9600 baud.
const SERIAL_TIMEOUT_MS: u64 = 150;

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

/// Operator console on the terminal. Stdin is drained by a helper thread so
/// that peeking for a byte never blocks.
pub struct TerminalConsole {
    input: Receiver<u8>,
    pending: Option<u8>,
}

impl TerminalConsole {
    pub fn spawn() -> Self {
        let (tx, input) = mpsc::channel();
        std::thread::spawn(move || {
            for byte in std::io::Read::bytes(std::io::stdin()) {
                let Ok(byte) = byte else { break };
                if tx.send(byte).is_err() {
                    break;
                }
            }
        });
        Self {
            input,
            pending: None,
        }
    }
}

impl embedded_io::ErrorType for TerminalConsole {
    type Error = IoError;
}

impl embedded_io::Read for TerminalConsole {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let byte = match self.pending.take() {
            Some(byte) => byte,
            None => match self.input.recv() {
                Ok(byte) => byte,
                Err(_) => return Ok(0),
            },
        };
        buf[0] = byte;
        Ok(1)
    }
}

impl embedded_io::ReadReady for TerminalConsole {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.pending.is_none() {
            self.pending = self.input.try_recv().ok();
        }
        Ok(self.pending.is_some())
    }
}

impl embedded_io::Write for TerminalConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        // The prompt has no trailing newline, so flush every write.
        let mut stdout = std::io::stdout();
        let written = stdout.write(buf).map_err(IoError)?;
        stdout.flush().map_err(IoError)?;
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::stdout().flush().map_err(IoError)
    }
}

/// Indicator channel that logs its level instead of driving hardware.
pub struct LogPin {
    name: &'static str,
}

impl ErrorType for LogPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for LogPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        log::debug!("{} on", self.name);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        log::debug!("{} off", self.name);
        Ok(())
    }
}

struct ExitReset;

impl SystemReset for ExitReset {
    fn reset(&mut self) -> ! {
        println!("Restarting");
        std::process::exit(0)
    }
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select the field bus port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });
    println!("Using port: {}", port_name);

    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    // Stand in for flash: an optional second argument acts as the stored count.
    let mut store = MemoryStore::<8>::new();
    if let Some(count) = env::args().nth(2).and_then(|arg| arg.parse::<u16>().ok()) {
        store.preload(CONFIG_NAMESPACE, SENTINEL_KEY, CONFIG_MAGIC).expect("Store full");
        store.preload(CONFIG_NAMESPACE, DEVICE_COUNT_KEY, count).expect("Store full");
    }
    let mut config = ConfigStore::new(store);

    let settings = FleetSettings::default();
    let clock = StdClock::new();
    let mut delay = clock;
    let table: DeviceLivenessTable = DeviceLivenessTable::new();
    let mut indicator = StatusIndicator::new(
        LogPin { name: "red" },
        LogPin { name: "green" },
        LogPin { name: "blue" },
    );

    let bus: ModbusMaster<PortWrapper, 128> = ModbusMaster::new(PortWrapper(port), MAX_DEVICES);
    let console = Console::new(TerminalConsole::spawn(), &settings);

    let booted = bring_up::<_, _, _, _, TELEMETRY_CAPACITY, MAX_DEVICES>(
        &table,
        console,
        &mut config,
        &mut delay,
        bus,
        &settings,
    );
    let mut scheduler = match booted {
        Ok(scheduler) => scheduler,
        Err(e) => {
            eprintln!("Cannot start: {}", e);
            fatal_blink(&mut indicator, &mut delay, &settings)
        }
    };
    let mut supervisor = HealthSupervisor::new(&table, indicator, &settings);

    std::thread::scope(|s| {
        s.spawn(|| {
            let mut delay = clock;
            run_polling(&mut scheduler, &clock, &mut delay, &mut ExitReset);
        });
        run_supervision(&mut supervisor, &clock, &mut delay);
    });
}
