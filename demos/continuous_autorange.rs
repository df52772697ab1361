//! Continuous auto-ranging on a simulated three-stage INA3221 board.
//!
//! The load sweeps logarithmically between 20 µA and 1 A every 30 s, so the
//! ranger walks through all three levels. Type `s` + Enter for statistics,
//! `q` + Enter to stop.
//!
//! ```text
//! RUST_LOG=info cargo run --example continuous_autorange -- demos/three_stage.toml
//! ```

use ina_autorange::pin::{PinCapability, PinGroup};
use ina_autorange::sim::SimBus;
use ina_autorange::{
    AutoRanger, BusPort, Chip, Error, InstrumentConfig, PinDirection, PinId, PinLevel, RegisterWidth,
    Result, SamplingScheduler, Statistics,
};
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::time::{Duration, Instant};
use std::{env, thread};

const SHUNTS: [f64; 3] = [0.1, 10.0, 1000.0];
const SHUNT_LSB_V: f64 = 40e-6;
const SWEEP_PERIOD_S: f64 = 30.0;
const SWEEP_MIN_A: f64 = 20e-6;
const SWEEP_MAX_A: f64 = 1.0;

/// SimBus wrapper that recomputes the INA3221 shunt registers from a
/// time-varying load and the current state of the select lines.
struct SweepBus {
    sim: SimBus,
    address: u8,
    start: Instant,
}

impl SweepBus {
    fn new(chip: Chip, address: u8) -> Self {
        let mut sim = SimBus::with_chip(chip, address);
        // 5 V on every channel's bus input.
        for ch in 0..3u8 {
            sim.set_register(address, 0x02 + 2 * ch, 625 << 3, RegisterWidth::Bits16);
        }
        Self {
            sim,
            address,
            start: Instant::now(),
        }
    }

    fn load_current(&self) -> f64 {
        let phase = (self.start.elapsed().as_secs_f64() / SWEEP_PERIOD_S).fract();
        let x = if phase < 0.5 { 2.0 * phase } else { 2.0 - 2.0 * phase };
        let (lo, hi) = (SWEEP_MIN_A.log10(), SWEEP_MAX_A.log10());
        10f64.powf(lo + x * (hi - lo))
    }

    /// Shunts in the current path for the driven select code.
    fn conducting(&self) -> &'static [usize] {
        let aux = self.sim.group_state(PinGroup::Aux);
        let code = u32::from(aux & PinId::Gpio0.mask() != 0) | u32::from(aux & PinId::Gpio1.mask() != 0) << 1;
        match code {
            0b10 => &[1, 2],
            0b11 => &[2],
            _ => &[0, 1, 2],
        }
    }

    fn refresh(&mut self) {
        let total = self.load_current();
        let path = self.conducting();
        let conductance: f64 = path.iter().map(|&i| 1.0 / SHUNTS[i]).sum();
        for i in 0..3 {
            let current = if path.contains(&i) {
                total * (1.0 / SHUNTS[i]) / conductance
            } else {
                0.0
            };
            let counts = (current * SHUNTS[i] / SHUNT_LSB_V).round().clamp(-4096.0, 4095.0) as i64;
            self.sim
                .set_register_signed(self.address, 0x01 + 2 * i as u8, counts << 3, RegisterWidth::Bits16);
        }
    }
}

impl BusPort for SweepBus {
    fn name(&self) -> &str {
        "sweep"
    }

    fn i2c_read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        if addr == self.address && matches!(reg, 0x01 | 0x03 | 0x05) {
            self.refresh();
        }
        self.sim.i2c_read_block(addr, reg, buf)
    }

    fn i2c_write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        self.sim.i2c_write_block(addr, reg, data)
    }

    fn set_pin_direction(&mut self, pin: PinId, direction: PinDirection) -> Result<()> {
        self.sim.set_pin_direction(pin, direction)
    }

    fn set_pin_level(&mut self, pin: PinId, level: PinLevel) -> Result<()> {
        self.sim.set_pin_level(pin, level)
    }

    fn get_pin_level(&mut self, pin: PinId) -> Result<PinLevel> {
        self.sim.get_pin_level(pin)
    }

    fn set_multiple_pins(&mut self, levels: &BTreeMap<PinId, PinLevel>) -> Result<()> {
        self.sim.set_multiple_pins(levels)
    }

    fn get_multiple_pins(&mut self, pins: &[PinId]) -> Result<BTreeMap<PinId, PinLevel>> {
        self.sim.get_multiple_pins(pins)
    }

    fn supported_pins(&self) -> Vec<PinCapability> {
        self.sim.supported_pins()
    }
}

fn print_statistics(stats: &Statistics) {
    println!("--- Statistics ---");
    println!(
        "  {} samples, {} failed, {:.1} s elapsed",
        stats.total_samples,
        stats.failed_samples,
        stats.elapsed.as_secs_f64()
    );
    println!(
        "  rate {:.2} Hz (target {:.2} Hz, {:.1}%)",
        stats.achieved_rate_hz,
        stats.target_rate_hz,
        stats.timing_accuracy * 100.0
    );
    for (ch, summary) in &stats.channels {
        println!(
            "  ch{}: I min {:.3e} / max {:.3e} / mean {:.3e} A, V mean {:.3} V",
            ch,
            summary.current_a.min,
            summary.current_a.max,
            summary.current_a.mean,
            summary.voltage_v.mean
        );
    }
    if let Some(failure) = &stats.last_failure {
        println!("  last failure: {}", failure);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/three_stage.toml".to_string());
    println!("Loading {}...", path);
    let config = InstrumentConfig::load(&path)?;

    let bus = SweepBus::new(config.device.chip, config.device.address);
    let (device, table) = ina_autorange::open_instrument(bus, &config)?;
    let Some(table) = table else {
        eprintln!("Error: {} has no [auto_range] section.", path);
        return Ok(());
    };
    let mut ranger = AutoRanger::new(device, table)?;
    if let Some(ch) = config.auto_range.as_ref().and_then(|a| a.voltage_channel) {
        ranger = ranger.with_voltage_channel(ch)?;
    }

    let (scheduler, handle) = SamplingScheduler::new(config.scheduler_config());
    let worker = scheduler.spawn(ranger, config.sampling_request()?, |sample| {
        if let Some(r) = sample.channels.get(&0) {
            println!(
                "#{:<6} {:>8.2} s  {:>12.6e} A  {:>6.3} V",
                sample.sequence,
                sample.relative_time.as_secs_f64(),
                r.current_a,
                r.voltage_v
            );
        }
    })?;

    println!("Sampling. 's' + Enter for statistics, 'q' + Enter to stop.");
    let control = handle.clone();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "q" => {
                    let _ = control.stop();
                    break;
                }
                "s" => match control.query_statistics(Duration::from_secs(1)) {
                    Ok(stats) => print_statistics(&stats),
                    Err(Error::Timeout) => println!("Sampler busy, try again."),
                    Err(e) => {
                        eprintln!("{}", e);
                        break;
                    }
                },
                "" => {}
                other => println!("Unknown command '{}'", other),
            }
        }
    });

    let (ranger, outcome) = match worker.join() {
        Ok(result) => result,
        Err(_) => {
            eprintln!("Sampler thread panicked.");
            std::process::exit(1);
        }
    };
    drop(handle);
    let report = outcome?;
    print_statistics(&report.statistics);
    println!(
        "Finished at range {} ({}), {} switches.",
        ranger.active_level(),
        ranger.active_range().description,
        ranger.switch_count()
    );
    Ok(())
}
