use crate::text::Line;
use mobj::{SymbolError, SYMBOL_NAME_SIZE, SYMBOL_TABLE_SIZE};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Everything that can go wrong between reading a source file and writing
/// an executable. The taxonomy is closed; new failure modes reuse the
/// closest kind and attach a context trailer instead.
#[derive(Debug)]
pub enum ErrorKind {
    /// Open/read/write failure.
    FileIo(io::Error),
    /// Unrecognized mnemonic, directive, or symbol.
    UnknownToken(String),
    /// Bad symbol definition.
    InvalidSymbol(String),
    /// A single operand failed to parse.
    InvalidArg(String),
    /// Operand set inconsistent with the instruction or directive.
    InvalidArgs,
    /// Symbol table capacity exceeded.
    TableFull(String),
    /// Symbol or macro defined twice.
    Duplicate(String),
    /// Immediate or branch/jump target out of representable range.
    Size(String),
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    /// Source line the diagnostic refers to, for assembler errors.
    pub line: Option<Line>,
    /// File the diagnostic refers to, for general errors.
    pub path: Option<PathBuf>,
    /// Free-form extra detail, printed as a trailing `-> (…)` line.
    pub context: Option<String>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind) -> Error {
        Error {
            kind,
            line: None,
            path: None,
            context: None,
        }
    }

    pub fn with_line(mut self, line: &Line) -> Error {
        if self.line.is_none() {
            self.line = Some(line.clone());
        }
        self
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Error {
        if self.path.is_none() {
            self.path = Some(path.as_ref().to_owned());
        }
        self
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Error {
        self.context = Some(context.into());
        self
    }

    pub fn io<P: AsRef<Path>>(err: io::Error, path: P) -> Error {
        Error::new(ErrorKind::FileIo(err)).with_path(path)
    }

    /// Maps a symbol table failure onto the taxonomy, attaching the name
    /// the table operation does not carry itself.
    pub fn from_symbol(err: SymbolError, name: &str) -> Error {
        let kind = match err {
            SymbolError::Duplicate => ErrorKind::Duplicate(name.to_owned()),
            SymbolError::TableFull => ErrorKind::TableFull(name.to_owned()),
            SymbolError::InvalidName => ErrorKind::InvalidSymbol(name.to_owned()),
        };
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.line, &self.path) {
            (Some(line), _) => writeln!(
                f,
                "Error in {}:{}\n    {}",
                line.filename, line.number, line.text
            )?,
            (None, Some(path)) => writeln!(f, "Error in {}:", path.display())?,
            (None, None) => writeln!(f, "Error:")?,
        }
        write!(f, "    ")?;
        match &self.kind {
            ErrorKind::FileIo(err) => match &self.path {
                Some(path) => write!(f, "-> could not access file \"{}\": {}", path.display(), err)?,
                None => write!(f, "-> file access failed: {}", err)?,
            },
            ErrorKind::UnknownToken(token) => write!(f, "-> unrecognized token \"{}\"", token)?,
            ErrorKind::InvalidSymbol(name) => write!(
                f,
                "-> invalid symbol definition \"{}\"\n    -> symbols must be between 1 and {} alphanumeric characters",
                name,
                SYMBOL_NAME_SIZE - 1
            )?,
            ErrorKind::InvalidArg(arg) => write!(f, "-> invalid argument \"{}\"", arg)?,
            ErrorKind::InvalidArgs => write!(f, "-> invalid arguments to instruction or directive")?,
            ErrorKind::TableFull(name) => write!(
                f,
                "-> too many symbols, could not save symbol \"{}\"\n    -> the assembler supports up to {} symbols",
                name, SYMBOL_TABLE_SIZE
            )?,
            ErrorKind::Duplicate(name) => write!(f, "-> token \"{}\" already defined", name)?,
            ErrorKind::Size(token) => write!(f, "-> token \"{}\" exceeds the expected range", token)?,
        }
        if let Some(context) = &self.context {
            write!(f, "\n    -> ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::FileIo(err) => Some(err),
            _ => None,
        }
    }
}
