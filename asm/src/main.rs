use clap::{Arg, Command};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum IoContext {
    WriteOutput,
}

#[derive(Debug)]
enum Error {
    Asm(amber_asm::AsmError),
    Io(std::io::Error, IoContext, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IoContext::WriteOutput => "Writing output",
                },
                path.display(),
                err
            ),
            Error::Asm(err) => write!(f, "{}", err),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("amber-asm")
        .about("Assembles Amber assembly into a .bin or .hex memory image")
        .arg(
            Arg::new("INPUT")
                .help("Sets the input file to use")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT")
                .help("Sets the output file to write to"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_parser(["bin", "hex"])
                .default_value("bin")
                .help("Output format: raw binary or one hex word per line"),
        )
        .arg(
            Arg::new("origin")
                .long("origin")
                .value_parser(clap::value_parser!(u32))
                .default_value("0")
                .help("Origin as a word address; the PC counts 24-bit words"),
        )
        .get_matches();

    let input = matches.get_one::<String>("INPUT").unwrap();
    let output = matches.get_one::<String>("output").map(String::as_str);
    let format = matches.get_one::<String>("format").unwrap().as_str();
    let origin = *matches.get_one::<u32>("origin").unwrap();

    match run(input, output, format, origin) {
        Ok((out_path, word_count)) => {
            println!("Assembled {} -> {} ({} words)", input, out_path.display(), word_count);
        }
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn run(
    input: &str,
    output: Option<&str>,
    format: &str,
    origin: u32,
) -> Result<(PathBuf, usize), Error> {
    let input_path = Path::new(input);

    let mut assembler = amber_asm::Assembler::new(origin);
    let words = assembler.assemble_path(input_path).map_err(Error::Asm)?;
    let image = imgfile::Image::from(words);

    let extension = if format == "bin" { "bin" } else { "hex" };
    let output_path: PathBuf = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension(extension));

    let write_result = if format == "bin" {
        imgfile::write_bin_file(&output_path, &image)
    } else {
        imgfile::write_hex_file(&output_path, &image)
    };
    write_result.map_err(|err| Error::Io(err, IoContext::WriteOutput, output_path.clone()))?;

    Ok((output_path, image.len()))
}
