//! Entrypoint for CLI
mod clock;
mod conf;
mod error;
mod terminal;

use std::{env, error::Error, time::Instant};

use chip8::{prelude::*, Devices};
use log::{error, info, LevelFilter};

use self::{
    clock::Clock,
    conf::{clock_frequency, CliConf},
    error::AppError,
    terminal::TerminalDevices,
};

static USAGE: &str = r#"
usage: chip8 CMD FILE [OPTIONS]

commands:
    run     Run the target ROM file in the terminal
    dump    Run the target ROM headless for a number of cycles, then print the display

options:
    run  --config FILE    YAML file with VM settings and keymap
    dump STEPS            Number of cycles to run (default 1000)

keys:
    1234/qwer/asdf/zxcv   Chip8 keypad
    Esc                   Quit

examples:
    chip8 run breakout.rom
    chip8 run breakout.rom --config chip8.yaml
    chip8 dump maze.rom 5000
"#;

const DEFAULT_DUMP_STEPS: usize = 1000;

fn load_rom_file(vm: &mut Chip8Vm, filepath: &str) -> Result<(), AppError> {
    let loaded = vm.load_rom_file(filepath)?;
    info!("loaded {loaded} bytes from {filepath}");
    Ok(())
}

fn run_terminal(filepath: &str, config: Option<&str>) -> Result<(), AppError> {
    let conf = match config {
        Some(config) => CliConf::from_file(config)?,
        None => CliConf::default(),
    };

    let keymap = conf.keymap();
    let mut vm = Chip8Vm::new(conf.vm);
    load_rom_file(&mut vm, filepath)?;

    let mut clock = Clock::new(clock_frequency(vm.config()).into());
    let mut devices = TerminalDevices::new(keymap)?;
    let mut cycle_count: usize = 0;

    devices.draw(vm.display_buffer())?;
    clock.reset();

    // Input is polled strictly between cycles, so every
    // cycle observes a stable keyboard state.
    while let Some(keypad) = devices.poll_input()? {
        vm.set_keys(&keypad);

        clock.wait();

        if vm.cycle() == Flow::Draw {
            devices.draw(vm.display_buffer())?;
        }

        cycle_count += 1;
    }

    // Restore the terminal before logging.
    drop(devices);
    info!("stopped after {cycle_count} cycles");

    Ok(())
}

fn run_headless(filepath: &str, step_count: usize) -> Result<(), AppError> {
    let mut vm = Chip8Vm::new(Chip8Conf::default());
    load_rom_file(&mut vm, filepath)?;

    let start = Instant::now();
    let flow = vm.run_steps(step_count);
    let end = Instant::now();

    println!(
        "{step_count} cycles, time taken: {}ms",
        end.duration_since(start).as_nanos() as f64 / 1000000.0
    ); // to millis
    println!("last flow: {flow:?}, pc: {:04X}", vm.pc());
    println!("{}", vm.dump_display()?);

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()?;

    let result = match parse_args() {
        Some(Cmd::Run { filepath, config }) => run_terminal(&filepath, config.as_deref()),
        Some(Cmd::Dump {
            filepath,
            step_count,
        }) => run_headless(&filepath, step_count),
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    parse_cmd(env::args().skip(1))
}

fn parse_cmd(mut args: impl Iterator<Item = String>) -> Option<Cmd> {
    let cmd = args.next()?;

    // don't format me T.T
    match cmd.as_str() {
        "run" => {
            let filepath = args.next()?;
            let config = match args.next().as_deref() {
                Some("--config") => Some(args.next()?),
                Some(_) => return None,
                None => None,
            };
            Some(Cmd::Run { filepath, config })
        }
        "dump" => {
            let filepath = args.next()?;
            let step_count = match args.next() {
                Some(steps) => steps.parse().ok()?,
                None => DEFAULT_DUMP_STEPS,
            };
            Some(Cmd::Dump {
                filepath,
                step_count,
            })
        }
        _ => None,
    }
}

fn print_usage() {
    println!("Chip8 v{}", env!("CARGO_PKG_VERSION"));
    println!("{USAGE}");
}

#[derive(Debug, PartialEq, Eq)]
enum Cmd {
    /// Run file in the terminal
    Run {
        filepath: String,
        config: Option<String>,
    },
    /// Run file headless and print the display
    Dump { filepath: String, step_count: usize },
}
