//! Loop resolution: matching `[`/`]` pairs to label handles.

use crate::buffer::CodeBuffer;
use crate::program::{BranchRecord, Instruction, Op};

/// Walks the condensed instruction list, creating two labels per loop and
/// wiring each `Op::EndIf`'s `branch` field to its ordinal in the returned
/// array.
///
/// `loop_count` (from [`crate::scanner::ScanResult`]) sizes the backing
/// vector up front; a single stack tracks the currently-open loops so each
/// `]` is matched to its nearest unmatched `[` in one left-to-right pass.
/// The scanner has already guaranteed brackets are balanced, so the stack is
/// never popped while empty and is always empty at the end.
pub fn resolve(
    instructions: &mut [Instruction],
    loop_count: usize,
    buffer: &mut CodeBuffer,
) -> Vec<BranchRecord> {
    let mut records = Vec::with_capacity(loop_count);
    let mut open: Vec<usize> = Vec::new();

    for instruction in instructions.iter_mut() {
        match instruction.op {
            Op::If => {
                let record = BranchRecord {
                    top: buffer.create_label(),
                    end: buffer.create_label(),
                };
                open.push(records.len());
                records.push(record);
            }
            Op::EndIf => {
                let ordinal = open.pop().expect("scanner guarantees balanced brackets");
                instruction.branch = ordinal;
            }
            _ => {}
        }
    }

    debug_assert!(open.is_empty(), "unmatched loop left open after resolution");
    tracing::debug!(loops = records.len(), "resolved loop branches");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    #[test]
    fn flat_program_has_no_branches() {
        let mut result = scan(b"+++.").unwrap();
        let mut buffer = CodeBuffer::new().unwrap();
        let records = resolve(&mut result.instructions, result.loop_count, &mut buffer);
        assert!(records.is_empty());
    }

    #[test]
    fn single_loop_gets_one_record_and_matching_endif() {
        let mut result = scan(b"[-]").unwrap();
        let mut buffer = CodeBuffer::new().unwrap();
        let records = resolve(&mut result.instructions, result.loop_count, &mut buffer);
        assert_eq!(records.len(), 1);

        let endif = result
            .instructions
            .iter()
            .find(|i| i.op == Op::EndIf)
            .unwrap();
        assert_eq!(endif.branch, 0);

        buffer.bind_label(records[0].top);
        buffer.bind_label(records[0].end);
    }

    #[test]
    fn nested_loops_match_innermost_first() {
        let mut result = scan(b"[[-]+]").unwrap();
        let mut buffer = CodeBuffer::new().unwrap();
        let records = resolve(&mut result.instructions, result.loop_count, &mut buffer);
        assert_eq!(records.len(), 2);

        let branches: Vec<usize> = result
            .instructions
            .iter()
            .filter(|i| i.op == Op::EndIf)
            .map(|i| i.branch)
            .collect();
        // Inner loop (ordinal 1, created second) closes before the outer one.
        assert_eq!(branches, vec![1, 0]);

        for record in &records {
            buffer.bind_label(record.top);
            buffer.bind_label(record.end);
        }
    }
}
