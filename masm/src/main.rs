#[macro_use]
extern crate clap;

use clap::Arg;
use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::process;

/* Driver

    masm <out> <src1> [src2 ...]        assemble + link, entry = _start
    masm -c <src1> [src2 ...]           assemble each source to <src>.o
    masm -e. <out> <src1> [src2 ...]    link, entry = text base
    masm -e <sym> <out> <src1> ...      link, entry = address of <sym>
    masm -d <file.o> [file2.o ...]      pretty-print object files

Exit codes: 0 success, 1 bad arguments or input open failure,
2 preprocessor failure, 3 assembler failure, 4 linker failure.
*/

const EXIT_USAGE: i32 = 1;
const EXIT_PREPROCESS: i32 = 2;
const EXIT_ASSEMBLE: i32 = 3;
const EXIT_LINK: i32 = 4;

struct Failure {
    error: masm::Error,
    code: i32,
}

type DriverResult = Result<(), Failure>;

fn fail(error: masm::Error, code: i32) -> Failure {
    Failure { error, code }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("compile")
                .short("c")
                .long("compile")
                .conflicts_with_all(&["entry", "dump"])
                .help("Assemble each source to an object file without linking"),
        )
        .arg(
            Arg::with_name("entry")
                .short("e")
                .long("entry")
                .takes_value(true)
                .value_name("SYMBOL")
                .help("Entry symbol for the executable; \".\" selects the text base address"),
        )
        .arg(
            Arg::with_name("dump")
                .short("d")
                .long("dump")
                .conflicts_with("entry")
                .help("Pretty-print object or executable files instead of assembling"),
        )
        .arg(
            Arg::with_name("FILES")
                .required(true)
                .multiple(true)
                .help("Output path followed by sources (sources only with -c, objects with -d)"),
        )
        .get_matches();

    let files: Vec<&str> = matches.values_of("FILES").unwrap().collect();

    let result = if matches.is_present("dump") {
        dump(&files)
    } else if matches.is_present("compile") {
        compile_only(&files)
    } else {
        build(&files, matches.value_of("entry"))
    };

    process::exit(match result {
        Ok(()) => 0,
        Err(failure) => {
            eprintln!("{}", failure.error);
            failure.code
        }
    });
}

fn dump(files: &[&str]) -> DriverResult {
    for path in files {
        masm::dump_file(path).map_err(|err| fail(err, EXIT_USAGE))?;
    }
    Ok(())
}

/// `-c`: each source becomes `<src>.o`, nothing is linked.
fn compile_only(sources: &[&str]) -> DriverResult {
    for source in sources {
        let object = assemble_source(source)?;
        let object_path = Path::new(source).with_extension("o");
        mobj::write_file(&object_path, &object)
            .map_err(|err| fail(masm::Error::io(err, &object_path), EXIT_ASSEMBLE))?;
    }
    Ok(())
}

/// Default mode: assemble every source to an intermediate object, link
/// them into `out`, then clean the intermediates up.
fn build(files: &[&str], entry: Option<&str>) -> DriverResult {
    if files.len() < 2 {
        eprintln!("error: expected an output path followed by at least one source file");
        process::exit(EXIT_USAGE);
    }
    let (out, sources) = files.split_first().unwrap();

    let entry_symbol = match entry {
        None => Some(masm::START_SYMBOL),
        Some(".") => None,
        Some(symbol) => Some(symbol),
    };

    let mut object_paths: Vec<PathBuf> = Vec::with_capacity(sources.len());
    let result = link_sources(sources, out, entry_symbol, &mut object_paths);

    // The intermediates are throwaways even when the link fails.
    for path in &object_paths {
        let _ = std::fs::remove_file(path);
    }
    result
}

fn link_sources(
    sources: &[&str],
    out: &str,
    entry_symbol: Option<&str>,
    object_paths: &mut Vec<PathBuf>,
) -> DriverResult {
    for source in sources {
        let object = assemble_source(source)?;
        let object_path = Path::new(source).with_extension("o");
        mobj::write_file(&object_path, &object)
            .map_err(|err| fail(masm::Error::io(err, &object_path), EXIT_ASSEMBLE))?;
        object_paths.push(object_path);
    }

    let executable =
        masm::link(object_paths, entry_symbol).map_err(|err| fail(err, EXIT_LINK))?;
    mobj::write_file(out, &executable)
        .map_err(|err| fail(masm::Error::io(err, out), EXIT_LINK))?;
    Ok(())
}

fn assemble_source(path: &str) -> Result<mobj::ObjectFile, Failure> {
    let mut file =
        File::open(path).map_err(|err| fail(masm::Error::io(err, path), EXIT_USAGE))?;
    let mut source = String::new();
    file.read_to_string(&mut source)
        .map_err(|err| fail(masm::Error::io(err, path), EXIT_PREPROCESS))?;

    let text = masm::preprocess(&source, path);
    masm::assemble_text(text).map_err(|err| fail(err, EXIT_ASSEMBLE))
}
