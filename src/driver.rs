//! Resolves inputs to source files, runs the translator over them and
//! writes the assembly.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{Result, TranslateError};
use crate::hack::Instruction;
use crate::translator::{Translator, TranslatorOptions};

pub const SOURCE_EXT: &str = "vm";
pub const TARGET_EXT: &str = "asm";

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Overrides the derived output path.
    pub output: Option<PathBuf>,
    /// `None` emits the bootstrap for directory inputs only.
    pub bootstrap: Option<bool>,
    pub translator: TranslatorOptions,
}

/// What a run will read and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// Source files paired with the name that scopes their statics.
    pub sources: Vec<(PathBuf, String)>,
    pub output: PathBuf,
    pub bootstrap: bool,
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | ':')
}

/// Validates a source path and returns the module name used for statics.
pub fn module_name(path: &Path) -> Result<String> {
    let invalid = |reason| TranslateError::InvalidFileName {
        path: path.to_path_buf(),
        reason,
    };
    if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXT) {
        return Err(invalid("expected a .vm extension"));
    }
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| invalid("file name is not valid UTF-8"))?;
    match stem.chars().next() {
        None => return Err(invalid("empty file name")),
        Some(first) if !first.is_ascii_alphabetic() => {
            return Err(invalid("file name must start with a letter"));
        }
        _ => {}
    }
    if !stem.chars().all(is_symbol_char) {
        return Err(invalid("file name contains characters not allowed in symbols"));
    }
    Ok(stem.to_string())
}

/// Works out the sources, output path and bootstrap mode for `input`.
pub fn plan(input: &Path, options: &BuildOptions) -> Result<Build> {
    let is_dir = fs::metadata(input)
        .map_err(|e| TranslateError::io(input, e))?
        .is_dir();

    let (sources, derived_output) = if is_dir {
        let mut paths = vec![];
        for entry in fs::read_dir(input).map_err(|e| TranslateError::io(input, e))? {
            let path = entry.map_err(|e| TranslateError::io(input, e))?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXT) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(TranslateError::NoSources {
                path: input.to_path_buf(),
            });
        }
        paths.sort();

        let dir_name = input
            .canonicalize()
            .map_err(|e| TranslateError::io(input, e))?
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string());
        let output = input.join(format!("{}.{}", dir_name, TARGET_EXT));
        (paths, output)
    } else {
        (vec![input.to_path_buf()], input.with_extension(TARGET_EXT))
    };

    let sources = sources
        .into_iter()
        .map(|path| module_name(&path).map(|name| (path, name)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Build {
        sources,
        output: options.output.clone().unwrap_or(derived_output),
        bootstrap: options.bootstrap.unwrap_or(is_dir),
    })
}

/// Translates every source of `build` into one instruction stream.
pub fn translate_build(build: &Build, options: TranslatorOptions) -> Result<Vec<Instruction>> {
    let first = build.sources.first().map(|(_, name)| name.as_str()).unwrap_or_default();
    let mut translator = Translator::with_options(first, options);
    let mut instructions = vec![];

    if build.bootstrap {
        debug!("emitting bootstrap");
        instructions.extend(translator.bootstrap());
    } else {
        debug!("bootstrap skipped");
    }

    for (path, name) in &build.sources {
        debug!("translating {} as {}", path.display(), name);
        let source = fs::read_to_string(path).map_err(|e| TranslateError::io(path, e))?;
        instructions.extend(translator.translate_file(name, &source)?);
    }

    debug!(
        "{} static symbols: {}",
        translator.static_symbols().count(),
        translator.static_symbols().collect::<Vec<_>>().join(", ")
    );
    Ok(instructions)
}

pub fn render(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for instruction in instructions {
        // writing into a String cannot fail
        let _ = writeln!(out, "{}", instruction);
    }
    out
}

/// Plans, translates and writes the output file. Nothing is written unless
/// every source translated.
pub fn run(input: &Path, options: &BuildOptions) -> Result<Build> {
    let build = plan(input, options)?;
    info!("translating {} source file(s)", build.sources.len());

    let instructions = translate_build(&build, options.translator)?;
    let words = instructions.iter().filter(|i| i.is_executable()).count();

    fs::write(&build.output, render(&instructions))
        .map_err(|e| TranslateError::io(&build.output, e))?;
    info!("wrote {} ({} instructions)", build.output.display(), words);
    Ok(build)
}
