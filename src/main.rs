use clap::{App, Arg, ArgMatches};
use lineasm::{samples, Halt, Vm, VmConfig, DEFAULT_STEP_LIMIT};
use log::LevelFilter;
use std::error::Error;
use std::io::Stdout;
use std::time::Instant;

fn args() -> ArgMatches {
    App::new("lineasm")
        .about("a minimal virtual machine for a line-oriented assembly-like language")
        .version("0.1.0")
        .arg(
            Arg::new("program")
                .short('p')
                .long("program")
                .takes_value(true)
                .required(false)
                .possible_values(["printnum", "fib", "all"])
                .default_value("all")
                .help("built-in sample program to run, all runs every sample in sequence"),
        )
        .arg(
            Arg::new("eval")
                .short('e')
                .long("eval")
                .takes_value(true)
                .required(false)
                .conflicts_with("program")
                .help("program source text to run instead of a sample"),
        )
        .arg(
            Arg::new("step-limit")
                .short('s')
                .long("step-limit")
                .takes_value(true)
                .required(false)
                .help("maximum number of instructions executed per run"),
        )
        .arg(
            Arg::new("ir")
                .short('i')
                .long("ir")
                .required(false)
                .takes_value(false)
                .help("prints the compiled instruction listing instead of running it"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .takes_value(false)
                .required(false)
                .help("traces the machine state before each executed instruction"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .required(false)
                .takes_value(false)
                .help("suppresses all output other than what the program is producing"),
        )
        .get_matches()
}

fn execute(vm: &mut Vm<Stdout>, name: &str, ir: bool, quiet: bool) -> Result<(), Box<dyn Error>> {
    if ir {
        println!("{}:\n{}", name, vm.program());
        return Ok(());
    }
    if !quiet {
        println!("running {}...\n", name);
    }
    let start = Instant::now();
    let halt = vm.run()?;
    let end = Instant::now();
    if !quiet {
        if halt == Halt::StepLimit {
            println!("\nstopped after reaching the step limit of {}", vm.steps());
        }
        println!(
            "\n{} took {} steps in {} ms ({} ns)\n",
            name,
            vm.steps(),
            end.duration_since(start).as_millis(),
            end.duration_since(start).as_nanos()
        );
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = args();
    let ir = args.is_present("ir");
    let debug = args.is_present("debug");
    let quiet = args.is_present("quiet");

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        logger.filter_level(LevelFilter::Trace);
    }
    logger.init();

    let step_limit = match args.value_of("step-limit") {
        Some(limit) => limit.parse()?,
        None => DEFAULT_STEP_LIMIT,
    };
    let sources = match (args.value_of("eval"), args.value_of("program")) {
        (Some(source), _) => vec![("eval", source)],
        (None, Some("all")) | (None, None) => samples::ALL.to_vec(),
        (None, Some(name)) => match samples::by_name(name) {
            Some(source) => vec![(name, source)],
            None => return Err(format!("unknown program {}", name).into()),
        },
    };

    let mut sources = sources.into_iter();
    if let Some((name, source)) = sources.next() {
        let mut vm = Vm::new(VmConfig::new(source, step_limit, debug, false))?;
        execute(&mut vm, name, ir, quiet)?;
        // every further program gets a fully reset machine
        for (name, source) in sources {
            vm.load(source)?;
            execute(&mut vm, name, ir, quiet)?;
        }
    }

    Ok(())
}
