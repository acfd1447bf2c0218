use std::io::Write;
use std::path::Path;

use anyhow::Result;
use typed_builder::TypedBuilder;

use oxide80_core::{Cpu8080, IoBus};

use crate::{bdos, loader};

/// Standard CP/M load address for `.COM` images.
pub const DEFAULT_LOAD_OFFSET: u16 = 0x0100;
/// Default stack, placed just below the top of the 64 KiB space.
pub const DEFAULT_STACK_POINTER: u16 = 0xF000;

/// CP/M warm-boot vector; control transferring here ends the run.
const WARM_BOOT: u16 = 0x0000;

/// Configuration for a CP/M run.
#[derive(TypedBuilder, Clone, Copy, Debug)]
pub struct CpmConfig {
    #[builder(default = DEFAULT_LOAD_OFFSET)]
    pub load_offset: u16,
    #[builder(default = DEFAULT_STACK_POINTER)]
    pub stack_pointer: u16,
}

impl Default for CpmConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Port bus for the CP/M runner. No peripherals are attached, so reads come
/// back pulled high and both directions are logged for diagnosis.
#[derive(Default)]
struct LoggedPorts;

impl IoBus for LoggedPorts {
    fn input(&mut self, port: u8) -> u8 {
        log::debug!("IN  port {port:#04x} -> 0xff (open bus)");
        0xFF
    }

    fn output(&mut self, port: u8, value: u8) {
        log::debug!("OUT port {port:#04x} <- {value:#04x}");
    }
}

/// Outcome of a finished run.
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    /// Total clock cycles consumed by executed instructions.
    pub cycles: u64,
    /// PC at the point the run stopped.
    pub pc: u16,
}

/// A CP/M machine: the 8080 core plus the conventions a `.COM` program
/// expects from its environment.
pub struct CpmMachine {
    pub cpu: Cpu8080,
    config: CpmConfig,
    ports: LoggedPorts,
}

impl CpmMachine {
    pub fn new() -> Self {
        Self::with_config(CpmConfig::default())
    }

    pub fn with_config(config: CpmConfig) -> Self {
        Self {
            cpu: Cpu8080::new(),
            config,
            ports: LoggedPorts,
        }
    }

    /// Prepare CP/M low memory and load a `.COM` image from `path`.
    /// Execution will start at the load offset.
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        self.prepare_low_memory();
        let len = loader::load_image(&mut self.cpu, path, self.config.load_offset)?;
        self.cpu.pc = self.config.load_offset;
        Ok(len)
    }

    /// Slice-level variant of [`CpmMachine::load`].
    pub fn load_bytes(&mut self, image: &[u8]) -> Result<usize> {
        self.prepare_low_memory();
        let len = loader::load_bytes(&mut self.cpu, image, self.config.load_offset)?;
        self.cpu.pc = self.config.load_offset;
        Ok(len)
    }

    fn prepare_low_memory(&mut self) {
        // HLT at the warm-boot vector so falling through 0x0000 stops the
        // CPU, and a RET at the BDOS gate so an unhooked CALL 5 still comes
        // back. The shim intercepts the gate before the CPU ever fetches it.
        self.cpu.mem_write(WARM_BOOT, 0x76);
        self.cpu.mem_write(bdos::BDOS_ENTRY, 0xC9);
        self.cpu.sp = self.config.stack_pointer;
    }

    /// Run until the CPU halts or control returns to the warm-boot vector.
    /// Console output from BDOS calls goes to `console`.
    pub fn run(&mut self, console: &mut impl Write) -> RunSummary {
        let mut cycles: u64 = 0;
        loop {
            // The BDOS hook replaces the instruction step for that cycle.
            if bdos::intercept(&mut self.cpu, console) {
                continue;
            }
            if self.cpu.halted || self.cpu.pc == WARM_BOOT {
                break;
            }
            cycles += u64::from(self.cpu.step(&mut self.ports));
        }
        RunSummary {
            cycles,
            pc: self.cpu.pc,
        }
    }
}

impl Default for CpmMachine {
    fn default() -> Self {
        Self::new()
    }
}
