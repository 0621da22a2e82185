//! Source-text scanning: brace-balance checking and run-length coalescing.

use crate::program::{Instruction, Op};
use crate::status::Status;

/// Output of [`scan`]: the condensed instruction list plus bookkeeping the
/// resolver and tape sizing need.
#[derive(Debug)]
pub struct ScanResult {
    pub instructions: Vec<Instruction>,
    /// Number of `[`/`]` pairs, i.e. the number of lexical loops.
    pub loop_count: usize,
    /// Deepest nesting of `[` seen; diagnostic only.
    pub max_depth: usize,
}

/// Scans `source`, checking bracket balance and producing the condensed
/// instruction list.
///
/// Any byte other than `+ - > < , . [ ]` is ignored, not an error. Runs of
/// `+`/`-` coalesce into one [`Op::Modify`] whose value is their signed sum;
/// runs of `>` or `<` coalesce into one [`Op::Right`]/[`Op::Left`] whose
/// value is the run length. Runs never cross a bracket, a `,`, or a `.`.
pub fn scan(source: &[u8]) -> Result<ScanResult, Status> {
    check_balance(source)?;

    let mut instructions = Vec::new();
    let mut loop_count = 0usize;
    let mut depth = 0usize;
    let mut max_depth = 0usize;

    // The index of the in-progress run in `instructions`, if the previous
    // byte started or continued a coalescing run.
    let mut run: Option<usize> = None;

    for &byte in source {
        match byte {
            b'+' | b'-' => {
                let delta = if byte == b'+' { 1 } else { -1 };
                match run.filter(|&i| instructions[i].op == Op::Modify) {
                    Some(i) => instructions[i].value += delta,
                    None => {
                        instructions.push(Instruction::new(Op::Modify, delta));
                        run = Some(instructions.len() - 1);
                    }
                }
            }
            b'>' => {
                match run.filter(|&i| instructions[i].op == Op::Right) {
                    Some(i) => instructions[i].value += 1,
                    None => {
                        instructions.push(Instruction::new(Op::Right, 1));
                        run = Some(instructions.len() - 1);
                    }
                }
            }
            b'<' => {
                match run.filter(|&i| instructions[i].op == Op::Left) {
                    Some(i) => instructions[i].value += 1,
                    None => {
                        instructions.push(Instruction::new(Op::Left, 1));
                        run = Some(instructions.len() - 1);
                    }
                }
            }
            b',' => {
                instructions.push(Instruction::new(Op::Get, 0));
                run = None;
            }
            b'.' => {
                instructions.push(Instruction::new(Op::Put, 0));
                run = None;
            }
            b'[' => {
                instructions.push(Instruction::new(Op::If, 0));
                run = None;
                loop_count += 1;
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            b']' => {
                instructions.push(Instruction::new(Op::EndIf, 0));
                run = None;
                depth -= 1;
            }
            _ => {}
        }
    }

    tracing::debug!(
        instructions = instructions.len(),
        loop_count,
        max_depth,
        "scanned program"
    );

    Ok(ScanResult {
        instructions,
        loop_count,
        max_depth,
    })
}

fn check_balance(source: &[u8]) -> Result<(), Status> {
    let mut depth: i64 = 0;
    for &byte in source {
        match byte {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(Status::Unbalanced);
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(Status::Unbalanced);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbalanced_close_alone() {
        assert_eq!(scan(b"]").unwrap_err(), Status::Unbalanced);
        assert_eq!(scan(b"[]]").unwrap_err(), Status::Unbalanced);
    }

    #[test]
    fn unbalanced_open_alone() {
        assert_eq!(scan(b"[").unwrap_err(), Status::Unbalanced);
    }

    #[test]
    fn empty_and_ignored_only_programs_are_empty() {
        assert!(scan(b"").unwrap().instructions.is_empty());
        assert!(scan(b"hello world").unwrap().instructions.is_empty());
    }

    #[test]
    fn arithmetic_run_is_sum_preserving() {
        let result = scan(b"+++--+").unwrap();
        assert_eq!(result.instructions.len(), 1);
        assert_eq!(result.instructions[0].op, Op::Modify);
        assert_eq!(result.instructions[0].value, 2);
    }

    #[test]
    fn pointer_move_runs_are_position_preserving() {
        let result = scan(b">>>").unwrap();
        assert_eq!(result.instructions.len(), 1);
        assert_eq!(result.instructions[0].op, Op::Right);
        assert_eq!(result.instructions[0].value, 3);

        let result = scan(b"<<").unwrap();
        assert_eq!(result.instructions[0].op, Op::Left);
        assert_eq!(result.instructions[0].value, 2);
    }

    #[test]
    fn runs_do_not_cross_get_or_put_or_brackets() {
        let result = scan(b"++.++").unwrap();
        assert_eq!(result.instructions.len(), 3);
        assert_eq!(result.instructions[0].value, 2);
        assert_eq!(result.instructions[1].op, Op::Put);
        assert_eq!(result.instructions[2].value, 2);

        let result = scan(b">><>>").unwrap();
        assert_eq!(result.instructions.len(), 3);
    }

    #[test]
    fn loop_count_and_depth_are_tracked() {
        let result = scan(b"[[-]+]").unwrap();
        assert_eq!(result.loop_count, 2);
        assert_eq!(result.max_depth, 2);
    }
}
