use docopt::Docopt;
use log::error;
use serde::Deserialize;

use famicore::console::Console;

const USAGE: &'static str = "
Usage:
  famicore <rom> [--trace]
  famicore (-h | --help)

Options:
  --trace    Print one reference-log line per executed instruction.
  -h --help  Show this message.
";

#[derive(Deserialize)]
struct Args {
  arg_rom: String,
  flag_trace: bool,
}

fn main() {
  env_logger::init();

  let args: Args = Docopt::new(USAGE)
    .and_then(|d| d.deserialize())
    .unwrap_or_else(|e| e.exit());

  let mut console = Console::new();
  if let Err(err) = console.load_rom(&args.arg_rom) {
    error!("{}", err);
    std::process::exit(1);
  }

  let result = if args.flag_trace {
    console.run_with_observer(|c| {
      if let Ok(line) = c.trace() {
        println!("{}", line);
      }
    })
  } else {
    console.run()
  };

  if let Err(err) = result {
    error!("{}", err);
    std::process::exit(1);
  }
}
