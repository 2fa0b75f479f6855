use crate::data::DataList;
use crate::error::{Error, ErrorKind, Result};
use crate::instr::{Instruction, InstructionList, NO_REGISTERS};
use crate::lexer::{self, Immediate, Modifier};
use crate::macros::{Macro, MacroTable};
use crate::preprocess::preprocess;
use crate::pseudo;
use crate::text::{Line, Text};
use matches::debug_assert_matches;
use mips::constants::{DATA_START, MAX_5U, MAX_6U, NO_REGISTER, REGION_MASK, TEXT_START, WORD_BYTES};
use mips::instructions::{i_word, j_word, r_word, Format, InstrDesc};
use mobj::{Binding, ObjectFile, RelocEntry, RelocKind, RelocTable, Segment, Symbol, SymbolTable};

/* Two-pass assembler

Pass 1 walks the preprocessed lines in order: it defines labels, records
`.globl` bindings, stores macro definitions and expands invocations
inline, collects data directives, and lowers instructions (expanding
pseudo-instructions) into the IR list.

Pass 2 encodes each IR instruction into its 32-bit word, resolving
locally-defined symbols directly and emitting relocation entries for
undefined ones, then serializes the data image the same way.
*/

pub struct Assembler {
    text: Text,
    macros: MacroTable,
    data: DataList,
    instructions: InstructionList,
    symbols: SymbolTable,
    relocations: RelocTable,
}

/// Assembles raw source into a relocatable object.
pub fn assemble(source: &str, filename: &str) -> Result<ObjectFile> {
    assemble_text(preprocess(source, filename))
}

/// Assembles an already-preprocessed line buffer.
pub fn assemble_text(text: Text) -> Result<ObjectFile> {
    Assembler::new(text).run()
}

impl Assembler {
    pub fn new(text: Text) -> Assembler {
        Assembler {
            text,
            macros: MacroTable::new(),
            data: DataList::new(),
            instructions: InstructionList::new(),
            symbols: SymbolTable::new(),
            relocations: RelocTable::new(),
        }
    }

    pub fn run(mut self) -> Result<ObjectFile> {
        self.first_pass()?;
        self.second_pass()
    }

    fn first_pass(&mut self) -> Result<()> {
        let mut segment = Segment::Text;
        let mut index = 0;

        while index < self.text.len() {
            let line = self.text.get(index).clone();
            let mut rest = line.text.as_str();

            // Leading labels bind to the current cursor of the current
            // segment.
            loop {
                let (token, tail) = lexer::split_first(rest);
                if token.len() < 2 || !token.ends_with(':') {
                    break;
                }
                self.define_label(&token[..token.len() - 1], segment, &line)?;
                rest = tail;
            }

            if rest.is_empty() {
                index += 1;
                continue;
            }

            let (token, tail) = lexer::split_first(rest);
            if let Some(directive) = strip_dot(token) {
                match directive {
                    "text" => segment = Segment::Text,
                    "data" => segment = Segment::Data,
                    "globl" => self.globl(tail, &line)?,
                    "macro" => {
                        index = self.define_macro(tail, index, &line)?;
                        continue;
                    }
                    "end_macro" => {
                        return Err(Error::new(ErrorKind::InvalidArgs)
                            .with_line(&line)
                            .with_context(".end_macro without a matching .macro"))
                    }
                    _ => self.data.directive(directive, tail, &line)?,
                }
            } else if let Some(mac) = self.macros.get(token) {
                let actuals: Vec<String> =
                    tail.split(' ').filter(|t| !t.is_empty()).map(str::to_owned).collect();
                let expansion = mac.expand(&actuals, &line)?;
                self.text.insert_after(index, expansion);
            } else {
                self.statement(token, tail, &line)?;
            }

            index += 1;
        }
        Ok(())
    }

    fn define_label(&mut self, name: &str, segment: Segment, line: &Line) -> Result<()> {
        if !lexer::valid_symbol(name) {
            return Err(Error::new(ErrorKind::InvalidSymbol(name.to_owned())).with_line(line));
        }
        let offset = match segment {
            Segment::Text => self.instructions.text_size(),
            Segment::Data => self.data.size(),
            Segment::Undef => unreachable!(),
        };
        self.symbols
            .add(name, offset, segment, Binding::Local)
            .map_err(|err| Error::from_symbol(err, name).with_line(line))
    }

    /// `.globl name`: marks the symbol global, creating an undefined
    /// global entry when it has not been defined yet.
    fn globl(&mut self, rest: &str, line: &Line) -> Result<()> {
        let (name, extra) = lexer::split_first(rest);
        if !extra.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgs).with_line(line));
        }
        if !lexer::valid_symbol(name) {
            return Err(Error::new(ErrorKind::InvalidSymbol(name.to_owned())).with_line(line));
        }
        match self.symbols.get_mut(name) {
            Some(symbol) => symbol.binding = Binding::Global,
            None => self
                .symbols
                .add(name, 0, Segment::Undef, Binding::Global)
                .map_err(|err| Error::from_symbol(err, name).with_line(line))?,
        }
        Ok(())
    }

    /// Consumes a macro definition starting at `index` (the `.macro`
    /// line); returns the index of the line after `.end_macro`.
    fn define_macro(&mut self, header: &str, index: usize, line: &Line) -> Result<usize> {
        let mut mac = Macro::from_header(header).map_err(|err| err.with_line(line))?;

        let mut body_index = index + 1;
        loop {
            if body_index >= self.text.len() {
                return Err(Error::new(ErrorKind::InvalidArgs)
                    .with_line(line)
                    .with_context("missing .end_macro"));
            }
            let body_line = self.text.get(body_index).clone();
            let (token, _) = lexer::split_first(&body_line.text);
            if token == ".end_macro" {
                break;
            }
            mac.body.push(body_line);
            body_index += 1;
        }

        self.macros.define(mac).map_err(|err| err.with_line(line))?;
        Ok(body_index + 1)
    }

    /// Parses an instruction statement into IR, expanding pseudos.
    fn statement(&mut self, mnemonic: &str, operand_text: &str, line: &Line) -> Result<()> {
        let operands = lexer::split_operands(operand_text).map_err(|err| err.with_line(line))?;

        let mut registers = NO_REGISTERS;
        let mut register_count = 0;
        let mut imm = Immediate::None;
        for operand in &operands {
            if operand.starts_with('$') {
                let register = mips::register_index(operand).ok_or_else(|| {
                    Error::new(ErrorKind::InvalidArg(operand.clone())).with_line(line)
                })?;
                if register_count >= registers.len() {
                    return Err(Error::new(ErrorKind::InvalidArgs).with_line(line));
                }
                registers[register_count] = register;
                register_count += 1;
            } else {
                if imm != Immediate::None {
                    return Err(Error::new(ErrorKind::InvalidArgs).with_line(line));
                }
                imm = lexer::parse_imm(operand).map_err(|err| err.with_line(line))?;
            }
        }

        let instruction = Instruction::new(mnemonic, registers, imm, line);
        if pseudo::is_pseudo(mnemonic) {
            pseudo::process_pseudo(&instruction, &mut self.instructions)?;
        } else {
            self.instructions.push(instruction);
        }
        Ok(())
    }

    fn second_pass(mut self) -> Result<ObjectFile> {
        let mut text = Vec::with_capacity(self.instructions.len());
        for (index, instruction) in self.instructions.iter().enumerate() {
            let current_offset = index as u32 * WORD_BYTES;
            let desc = mips::lookup(&instruction.mnemonic).ok_or_else(|| {
                Error::new(ErrorKind::UnknownToken(instruction.mnemonic.clone()))
                    .with_line(&instruction.line)
            })?;
            let word = match desc.format {
                Format::R => convert_rtype(instruction, desc)?,
                Format::I => convert_itype(
                    &self.symbols,
                    &mut self.relocations,
                    instruction,
                    desc,
                    current_offset,
                )?,
                Format::J => convert_jtype(
                    &self.symbols,
                    &mut self.relocations,
                    instruction,
                    desc,
                    current_offset,
                )?,
            };
            text.push(word);
        }

        let data = self.data.serialize(&self.symbols, &mut self.relocations)?;

        Ok(ObjectFile {
            entry: 0,
            text,
            data,
            relocations: self.relocations,
            symbols: self.symbols,
        })
    }
}

fn strip_dot(token: &str) -> Option<&str> {
    if token.len() > 1 && token.starts_with('.') {
        Some(&token[1..])
    } else {
        None
    }
}

/// Remaps source-order registers into encoding slots per the descriptor.
/// Fails when a used slot has no register or a register lands on an
/// unused slot.
fn map_registers(input: &[u8; 3], order: &[i8; 3]) -> Option<[u32; 3]> {
    let mut out = [0u32; 3];
    for i in 0..3 {
        let slot = order[i];
        let register = input[i];
        if slot == -1 {
            if register == NO_REGISTER {
                continue;
            }
            return None;
        }
        if register == NO_REGISTER {
            return None;
        }
        out[slot as usize] = u32::from(register);
    }
    Some(out)
}

/// Address a locally-defined symbol will have once its file is placed
/// first in the executable.
fn absolute_address(symbol: &Symbol) -> u32 {
    match symbol.segment {
        Segment::Text => TEXT_START + symbol.offset,
        Segment::Data => DATA_START + symbol.offset,
        Segment::Undef => 0,
    }
}

fn convert_rtype(instruction: &Instruction, desc: &InstrDesc) -> Result<u32> {
    debug_assert_matches!(desc.format, Format::R);

    let regs = map_registers(&instruction.registers, &desc.register_order)
        .ok_or_else(|| Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line))?;

    // A numeric immediate lands in shamt; shifts of more than 31 wrap,
    // which also accommodates negative shift literals.
    let shamt = match &instruction.imm {
        Immediate::None => 0,
        Immediate::Int(value) => ((value % 32 + 32) % 32) as u32,
        Immediate::Symbol { name, .. } => {
            return Err(Error::new(ErrorKind::InvalidArg(name.clone()))
                .with_line(&instruction.line))
        }
        Immediate::BaseOffset(text) => {
            return Err(Error::new(ErrorKind::InvalidArg(text.clone()))
                .with_line(&instruction.line))
        }
    };
    debug_assert!(shamt <= MAX_5U && desc.funct <= MAX_6U);

    Ok(r_word(desc.opcode, regs[0], regs[1], regs[2], shamt, desc.funct))
}

fn convert_itype(
    symbols: &SymbolTable,
    relocations: &mut RelocTable,
    instruction: &Instruction,
    desc: &InstrDesc,
    current_offset: u32,
) -> Result<u32> {
    debug_assert_matches!(desc.format, Format::I);

    let mut regs = map_registers(&instruction.registers, &desc.register_order)
        .ok_or_else(|| Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line))?;

    let opcode = desc.opcode;
    let imm: u32;

    if opcode == 0x04 || opcode == 0x05 {
        // Conditional branch: PC-relative to the instruction after the
        // branch, in instructions.
        let name = match &instruction.imm {
            Immediate::Symbol {
                name,
                modifier: Modifier::None,
            } => name,
            _ => return Err(Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line)),
        };
        let symbol = lookup_symbol(symbols, name, &instruction.line)?;
        imm = if symbol.segment == Segment::Undef {
            relocations.add(RelocEntry {
                segment: Segment::Text,
                target_offset: current_offset,
                kind: RelocKind::Pc16,
                dependency: name.clone(),
            });
            0
        } else {
            (symbol.offset.wrapping_sub(current_offset) >> 2).wrapping_sub(1) & 0xFFFF
        };
    } else if opcode >= 0x08 && opcode <= 0x0F {
        // Arithmetic/logical immediate.
        let value = match &instruction.imm {
            Immediate::Int(value) => *value as u32,
            Immediate::Symbol { name, modifier } => {
                let kind = match modifier {
                    Modifier::Hi => RelocKind::Hi16,
                    Modifier::Lo => RelocKind::Lo16,
                    Modifier::None => {
                        return Err(Error::new(ErrorKind::InvalidArg(name.clone()))
                            .with_line(&instruction.line))
                    }
                };
                let symbol = lookup_symbol(symbols, name, &instruction.line)?;
                if symbol.segment == Segment::Undef {
                    relocations.add(RelocEntry {
                        segment: Segment::Text,
                        target_offset: current_offset,
                        kind,
                        dependency: name.clone(),
                    });
                    0
                } else {
                    let address = absolute_address(symbol);
                    match modifier {
                        Modifier::Hi => address >> 16,
                        _ => address & 0xFFFF,
                    }
                }
            }
            _ => return Err(Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line)),
        };

        // Accept anything whose upper bits read as a 16-bit sign
        // extension or as zero, i.e. [-32768, 65535]. Instructions with
        // different sign conventions share this check.
        if value & 0xFFFF_8000 != 0xFFFF_8000 && value & 0xFFFF_0000 != 0 {
            return Err(Error::new(ErrorKind::Size((value as i32).to_string()))
                .with_line(&instruction.line));
        }
        imm = value & 0xFFFF;
    } else {
        // Memory access: the rs slot and the offset both come from the
        // base-offset operand.
        let text = match &instruction.imm {
            Immediate::BaseOffset(text) => text,
            _ => return Err(Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line)),
        };
        let (offset, base) =
            lexer::read_base_address(text).map_err(|err| err.with_line(&instruction.line))?;
        regs[0] = u32::from(base);
        imm = offset as u16 as u32;
    }

    Ok(i_word(opcode, regs[0], regs[1], imm))
}

fn convert_jtype(
    symbols: &SymbolTable,
    relocations: &mut RelocTable,
    instruction: &Instruction,
    desc: &InstrDesc,
    current_offset: u32,
) -> Result<u32> {
    debug_assert_matches!(desc.format, Format::J);

    if instruction.registers[0] != NO_REGISTER {
        return Err(Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line));
    }
    let name = match &instruction.imm {
        Immediate::Symbol {
            name,
            modifier: Modifier::None,
        } => name,
        _ => return Err(Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line)),
    };

    let symbol = lookup_symbol(symbols, name, &instruction.line)?;
    let address = if symbol.segment == Segment::Undef {
        relocations.add(RelocEntry {
            segment: Segment::Text,
            target_offset: current_offset,
            kind: RelocKind::R26,
            dependency: name.clone(),
        });
        0
    } else {
        // Pseudo-direct addressing: the target must share the PC's top
        // four bits, which the processor keeps.
        let target = absolute_address(symbol);
        let current = TEXT_START + current_offset;
        if target & REGION_MASK != current & REGION_MASK {
            return Err(Error::new(ErrorKind::Size(name.clone()))
                .with_line(&instruction.line)
                .with_context("jump target out of range"));
        }
        (target & !REGION_MASK) >> 2
    };

    Ok(j_word(desc.opcode, address))
}

fn lookup_symbol<'a>(symbols: &'a SymbolTable, name: &str, line: &Line) -> Result<&'a Symbol> {
    symbols
        .get(name)
        .ok_or_else(|| Error::new(ErrorKind::UnknownToken(name.to_owned())).with_line(line))
}
