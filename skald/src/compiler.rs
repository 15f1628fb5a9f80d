//! Compile driver: source text to assembly, optionally on to a memory
//! image through the assembler.

use crate::codegen::CodeGen;
use crate::error::{Error, Result};
use crate::parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Bin,
    Hex,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Bin => "bin",
            OutputFormat::Hex => "hex",
        }
    }
}

#[derive(Debug)]
pub struct CompileResult {
    pub asm_text: String,
    pub asm_path: Option<PathBuf>,
    pub image_path: Option<PathBuf>,
}

/// Compile a source string to assembly text.
pub fn compile_text(source: &str) -> Result<String> {
    let program = parser::parse(source)?;
    let mut codegen = CodeGen::new();
    let asm_text = codegen.gen_program(&program)?;
    debug!(lines = asm_text.lines().count(), "code generation complete");
    Ok(asm_text)
}

/// Compile a source file, writing the assembly next to it (or to
/// `out_asm`). With `assemble`, also run the assembler and write a `.bin`
/// or `.hex` image.
pub fn compile_file(
    path: &Path,
    out_asm: Option<PathBuf>,
    assemble: bool,
    format: OutputFormat,
    origin: u32,
    out_image: Option<PathBuf>,
) -> Result<CompileResult> {
    let source = fs::read_to_string(path).map_err(|err| Error::Io {
        action: "read",
        path: path.to_path_buf(),
        source: err,
    })?;
    let asm_text = compile_text(&source)?;

    let asm_path = out_asm.unwrap_or_else(|| path.with_extension("asm"));
    fs::write(&asm_path, &asm_text).map_err(|err| Error::Io {
        action: "write",
        path: asm_path.clone(),
        source: err,
    })?;

    let mut image_path = None;
    if assemble {
        let mut assembler = amber_asm::Assembler::new(origin);
        let words = assembler.assemble(&asm_text)?;
        let image = imgfile::Image::from(words);
        let target = out_image.unwrap_or_else(|| path.with_extension(format.extension()));
        let written = match format {
            OutputFormat::Bin => imgfile::write_bin_file(&target, &image),
            OutputFormat::Hex => imgfile::write_hex_file(&target, &image),
        };
        written.map_err(|err| Error::Io {
            action: "write",
            path: target.clone(),
            source: err,
        })?;
        image_path = Some(target);
    }

    Ok(CompileResult {
        asm_text,
        asm_path: Some(asm_path),
        image_path,
    })
}
