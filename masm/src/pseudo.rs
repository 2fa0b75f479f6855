use crate::error::{Error, ErrorKind, Result};
use crate::instr::{Instruction, InstructionList};
use crate::lexer::{Immediate, Modifier};
use mips::constants::NO_REGISTER;
use mips::registers::{AT, ZERO};

/* Pseudo-instructions

Each pseudo lowers to one or two real instructions, using `$at` as the
scratch register. The emitted instructions reuse the pseudo's source line
for diagnostics.
*/

pub const PSEUDOINSTRUCTIONS: [&str; 7] = ["blt", "bgt", "ble", "bge", "li", "la", "move"];

pub fn is_pseudo(mnemonic: &str) -> bool {
    PSEUDOINSTRUCTIONS.contains(&mnemonic)
}

/// Expands `instruction` into `list`. Returns the number of real
/// instructions emitted (1 or 2); the same pseudo with the same operands
/// always produces the same sequence.
pub fn process_pseudo(instruction: &Instruction, list: &mut InstructionList) -> Result<usize> {
    match instruction.mnemonic.as_str() {
        "blt" => branch(instruction, list, false),
        "bgt" => branch(instruction, list, true),
        "ble" => branch_inverted(instruction, list, true),
        "bge" => branch_inverted(instruction, list, false),
        "li" => li(instruction, list),
        "la" => la(instruction, list),
        "move" => mv(instruction, list),
        _ => Err(Error::new(ErrorKind::UnknownToken(instruction.mnemonic.clone()))
            .with_line(&instruction.line)),
    }
}

fn invalid_args(instruction: &Instruction) -> Error {
    Error::new(ErrorKind::InvalidArgs).with_line(&instruction.line)
}

fn emit(
    list: &mut InstructionList,
    mnemonic: &str,
    registers: [u8; 3],
    imm: Immediate,
    source: &Instruction,
) {
    list.push(Instruction::new(mnemonic, registers, imm, &source.line));
}

/// `blt`/`bgt`: `slt $at, a, b` then `bne $at, $zero, target`, with the
/// comparison operands swapped for `bgt`.
fn branch(instruction: &Instruction, list: &mut InstructionList, swap: bool) -> Result<usize> {
    compare_and_branch(instruction, list, swap, "bne")
}

/// `ble`/`bge`: same comparison as the strict forms but branching on
/// "not less than" via `beq`.
fn branch_inverted(
    instruction: &Instruction,
    list: &mut InstructionList,
    swap: bool,
) -> Result<usize> {
    compare_and_branch(instruction, list, swap, "beq")
}

fn compare_and_branch(
    instruction: &Instruction,
    list: &mut InstructionList,
    swap: bool,
    branch_mnemonic: &str,
) -> Result<usize> {
    let r1 = instruction.registers[0];
    let r2 = instruction.registers[1];
    let target = match &instruction.imm {
        Immediate::Symbol { .. } => instruction.imm.clone(),
        _ => return Err(invalid_args(instruction)),
    };
    if instruction.registers[2] != NO_REGISTER {
        return Err(invalid_args(instruction));
    }

    let (first, second) = if swap { (r2, r1) } else { (r1, r2) };
    emit(list, "slt", [AT, first, second], Immediate::None, instruction);
    emit(
        list,
        branch_mnemonic,
        [AT, ZERO, NO_REGISTER],
        target,
        instruction,
    );
    Ok(2)
}

/// `li $R, imm`: one `addiu` from `$zero` when the value fits in a signed
/// 16-bit immediate, otherwise `lui`/`ori` through `$at`.
fn li(instruction: &Instruction, list: &mut InstructionList) -> Result<usize> {
    let value = match instruction.imm {
        Immediate::Int(value) => value,
        _ => return Err(invalid_args(instruction)),
    };
    if instruction.registers[1] != NO_REGISTER || instruction.registers[2] != NO_REGISTER {
        return Err(invalid_args(instruction));
    }
    let rd = instruction.registers[0];

    if value >= -0x8000 && value <= 0x7FFF {
        emit(
            list,
            "addiu",
            [rd, ZERO, NO_REGISTER],
            Immediate::Int(value),
            instruction,
        );
        return Ok(1);
    }

    emit(
        list,
        "lui",
        [AT, NO_REGISTER, NO_REGISTER],
        Immediate::Int(value >> 16),
        instruction,
    );
    emit(
        list,
        "ori",
        [rd, AT, NO_REGISTER],
        Immediate::Int(value & 0xFFFF),
        instruction,
    );
    Ok(2)
}

/// `la $R, label`: `lui $at, %hi(label)` then `ori $R, $at, %lo(label)`.
fn la(instruction: &Instruction, list: &mut InstructionList) -> Result<usize> {
    let name = match &instruction.imm {
        Immediate::Symbol { name, .. } => name.clone(),
        _ => return Err(invalid_args(instruction)),
    };
    if instruction.registers[1] != NO_REGISTER || instruction.registers[2] != NO_REGISTER {
        return Err(invalid_args(instruction));
    }
    let rd = instruction.registers[0];

    emit(
        list,
        "lui",
        [AT, NO_REGISTER, NO_REGISTER],
        Immediate::Symbol {
            name: name.clone(),
            modifier: Modifier::Hi,
        },
        instruction,
    );
    emit(
        list,
        "ori",
        [rd, AT, NO_REGISTER],
        Immediate::Symbol {
            name,
            modifier: Modifier::Lo,
        },
        instruction,
    );
    Ok(2)
}

/// `move $R1, $R2`: `addu $R1, $zero, $R2`.
fn mv(instruction: &Instruction, list: &mut InstructionList) -> Result<usize> {
    if instruction.registers[2] != NO_REGISTER || instruction.imm != Immediate::None {
        return Err(invalid_args(instruction));
    }
    let rd = instruction.registers[0];
    let rs = instruction.registers[1];

    emit(
        list,
        "addu",
        [rd, ZERO, rs],
        Immediate::None,
        instruction,
    );
    Ok(1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::text::Line;
    use matches::assert_matches;

    fn pseudo(mnemonic: &str, registers: [u8; 3], imm: Immediate) -> Instruction {
        let line = Line::new("p.s", 1, mnemonic.to_owned());
        Instruction::new(mnemonic, registers, imm, &line)
    }

    fn expand(instruction: &Instruction) -> (usize, Vec<Instruction>) {
        let mut list = InstructionList::new();
        let count = process_pseudo(instruction, &mut list).unwrap();
        let emitted: Vec<Instruction> = list.iter().cloned().collect();
        (count, emitted)
    }

    fn label(name: &str) -> Immediate {
        Immediate::Symbol {
            name: name.to_owned(),
            modifier: Modifier::None,
        }
    }

    #[test]
    fn li_small_is_one_addiu() {
        let (count, out) = expand(&pseudo("li", [8, 255, 255], Immediate::Int(32767)));
        assert_eq!(count, 1);
        assert_eq!(out[0].mnemonic, "addiu");
        assert_eq!(out[0].registers, [8, 0, 255]);
        assert_eq!(out[0].imm, Immediate::Int(32767));
    }

    #[test]
    fn li_large_is_lui_ori() {
        let (count, out) = expand(&pseudo("li", [8, 255, 255], Immediate::Int(32768)));
        assert_eq!(count, 2);
        assert_eq!(out[0].mnemonic, "lui");
        assert_eq!(out[0].registers, [AT, 255, 255]);
        assert_eq!(out[0].imm, Immediate::Int(0));
        assert_eq!(out[1].mnemonic, "ori");
        assert_eq!(out[1].registers, [8, AT, 255]);
        assert_eq!(out[1].imm, Immediate::Int(0x8000));
    }

    #[test]
    fn li_negative_upper_half() {
        let (_, out) = expand(&pseudo("li", [8, 255, 255], Immediate::Int(-100_000)));
        // -100000 >> 16 sign-extends.
        assert_eq!(out[0].imm, Immediate::Int(-2));
        assert_eq!(out[1].imm, Immediate::Int(0x7960));
    }

    #[test]
    fn la_uses_hi_lo_modifiers() {
        let (count, out) = expand(&pseudo("la", [4, 255, 255], label("msg")));
        assert_eq!(count, 2);
        assert_eq!(
            out[0].imm,
            Immediate::Symbol {
                name: "msg".to_owned(),
                modifier: Modifier::Hi
            }
        );
        assert_eq!(out[0].registers, [AT, 255, 255]);
        assert_eq!(
            out[1].imm,
            Immediate::Symbol {
                name: "msg".to_owned(),
                modifier: Modifier::Lo
            }
        );
        assert_eq!(out[1].registers, [4, AT, 255]);
    }

    #[test]
    fn move_is_addu_through_zero() {
        let (count, out) = expand(&pseudo("move", [8, 9, 255], Immediate::None));
        assert_eq!(count, 1);
        assert_eq!(out[0].mnemonic, "addu");
        assert_eq!(out[0].registers, [8, 0, 9]);
    }

    #[test]
    fn comparison_branches() {
        let (_, out) = expand(&pseudo("blt", [8, 9, 255], label("l")));
        assert_eq!(out[0].mnemonic, "slt");
        assert_eq!(out[0].registers, [AT, 8, 9]);
        assert_eq!(out[1].mnemonic, "bne");
        assert_eq!(out[1].registers, [AT, 0, 255]);

        let (_, out) = expand(&pseudo("bgt", [8, 9, 255], label("l")));
        assert_eq!(out[0].registers, [AT, 9, 8]);
        assert_eq!(out[1].mnemonic, "bne");

        let (_, out) = expand(&pseudo("ble", [8, 9, 255], label("l")));
        assert_eq!(out[0].registers, [AT, 9, 8]);
        assert_eq!(out[1].mnemonic, "beq");

        let (_, out) = expand(&pseudo("bge", [8, 9, 255], label("l")));
        assert_eq!(out[0].registers, [AT, 8, 9]);
        assert_eq!(out[1].mnemonic, "beq");
    }

    #[test]
    fn operand_validation() {
        let mut list = InstructionList::new();
        assert_matches!(
            process_pseudo(&pseudo("li", [8, 255, 255], label("x")), &mut list),
            Err(_)
        );
        assert_matches!(
            process_pseudo(&pseudo("la", [4, 255, 255], Immediate::Int(1)), &mut list),
            Err(_)
        );
        assert_matches!(
            process_pseudo(&pseudo("blt", [8, 9, 10], label("l")), &mut list),
            Err(_)
        );
    }
}
