use clap::{Arg, ArgAction, Command};
use skald::OutputFormat;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("skald")
        .about("Compiles Skald source to Amber assembly")
        .arg(
            Arg::new("INPUT")
                .help("Input Skald file (.skald)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT")
                .help("Output assembly file path (.asm)"),
        )
        .arg(
            Arg::new("assemble")
                .long("assemble")
                .action(ArgAction::SetTrue)
                .help("Assemble the generated code after codegen"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_parser(["bin", "hex"])
                .default_value("bin")
                .help("Assembler output format when --assemble is used"),
        )
        .arg(
            Arg::new("origin")
                .long("origin")
                .value_parser(clap::value_parser!(u32))
                .default_value("0")
                .help("Assembler origin (word address)"),
        )
        .arg(
            Arg::new("out-bin")
                .long("out-bin")
                .value_name("IMAGE")
                .help("Assembled output file path (.bin/.hex)"),
        )
        .get_matches();

    let input = matches.get_one::<String>("INPUT").unwrap();
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    let assemble = matches.get_flag("assemble");
    let format = match matches.get_one::<String>("format").unwrap().as_str() {
        "hex" => OutputFormat::Hex,
        _ => OutputFormat::Bin,
    };
    let origin = *matches.get_one::<u32>("origin").unwrap();
    let out_image = matches.get_one::<String>("out-bin").map(PathBuf::from);

    match skald::compile_file(Path::new(input), output, assemble, format, origin, out_image) {
        Ok(result) => {
            let asm = result
                .asm_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            match result.image_path {
                Some(image) => {
                    println!("Compiled {} -> {}; assembled -> {}", input, asm, image.display());
                }
                None => println!("Compiled {} -> {}", input, asm),
            }
        }
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}
