//! Definitions for the supported subset of the 32-bit MIPS instruction set:
//! register names, instruction descriptors, raw word encodings, and the
//! memory-layout constants shared by the assembler and linker.

pub mod constants;
pub mod instructions;
pub mod registers;

pub use constants::*;
pub use instructions::{i_word, j_word, lookup, r_word, Format, InstrDesc, INSTRUCTIONS};
pub use registers::{register_index, AT, REGISTERS, ZERO};
