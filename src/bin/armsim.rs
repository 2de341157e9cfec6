//! CLI entry point: assemble the example SoC, load a boot image, and run
//! the CPU thread alongside an optional GDB debug-stub thread (spec §6).

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use clap::Parser;

use armsim::bus::Bus;
use armsim::cpu::{execute, CpuCore};
use armsim::gdb::{self, rungate::RunGate, Machine};
use armsim::soc;

/// ARMv7-A (Cortex-A9) SoC simulator.
#[derive(Parser, Debug)]
#[command(name = "armsim")]
struct Args {
    /// Start with stepping enabled and the run-gate closed.
    #[arg(short = 's', long = "step")]
    step: bool,

    /// Override the OS image path.
    #[arg(short = 'p', long = "image", default_value = "os.bin")]
    image: PathBuf,

    /// Path to the exception-vectors blob loaded at the vectors base.
    #[arg(long = "vectors", default_value = "vectors.bin")]
    vectors: PathBuf,

    /// TCP port for the GDB debug transport.
    #[arg(long = "gdb", alias = "gdb-port", default_value_t = 20005)]
    gdb_port: u16,

    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut bus = soc::build_bus();
    if let Err(e) = soc::boot(&mut bus, &args.vectors, &args.image) {
        log::warn!("boot image load failed: {e}; continuing with an empty memory image");
    }

    let (mut cpu, _pending) = CpuCore::new();
    cpu.reset(soc::L3_OCM_RAM.0);

    let run_gate = Arc::new(RunGate::new());
    if args.step {
        run_gate.stepping.store(true, Ordering::SeqCst);
        run_gate.close();
    }
    cpu.run_gate = Some(run_gate.clone());

    let machine: Arc<Machine<Bus>> = Arc::new(Machine {
        cpu: Mutex::new(cpu),
        bus: Mutex::new(bus),
        run_gate: run_gate.clone(),
    });

    let cpu_thread = {
        let machine = machine.clone();
        std::thread::spawn(move || loop {
            if machine.run_gate.stopped.load(Ordering::SeqCst) {
                return;
            }
            let mut cpu = machine.cpu.lock().unwrap();
            let mut bus = machine.bus.lock().unwrap();
            if let Err(e) = execute::step(&mut cpu, &mut *bus) {
                log::error!("execution halted: {e}");
                machine.run_gate.stopped.store(true, Ordering::SeqCst);
                return;
            }
        })
    };

    let listener = match TcpListener::bind(("127.0.0.1", args.gdb_port)) {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("couldn't bind GDB port {}: {e}", args.gdb_port);
            cpu_thread.join().ok();
            return;
        }
    };
    log::info!("GDB stub listening on 127.0.0.1:{}", args.gdb_port);

    for stream in listener.incoming() {
        if machine.run_gate.stopped.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                if let Err(e) = gdb::serve(stream, machine.clone()) {
                    log::warn!("GDB session ended: {e}");
                }
            }
            Err(e) => log::warn!("failed to accept GDB connection: {e}"),
        }
    }

    cpu_thread.join().ok();
}
