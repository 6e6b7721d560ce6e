// Method command implementations
//
// Commands for working with methods (line tables, variable tables, etc.)

use crate::commands::{command_sets, method_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_string, read_u32, read_u64};
use crate::types::{MethodId, ReferenceTypeId, Variable};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Line table entry - maps source line to bytecode index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTableEntry {
    pub line_code_index: u64,
    pub line_number: i32,
}

/// Complete line table for a method
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineTable {
    pub start: u64,
    pub end: u64,
    pub lines: Vec<LineTableEntry>,
}

impl LineTable {
    /// Source line of a bytecode index: the last entry starting at or before it
    pub fn line_for_index(&self, index: u64) -> Option<i32> {
        self.lines
            .iter()
            .filter(|entry| entry.line_code_index <= index)
            .max_by_key(|entry| entry.line_code_index)
            .map(|entry| entry.line_number)
    }

    /// Lowest bytecode index carrying the given line
    pub fn index_for_line(&self, line: i32) -> Option<u64> {
        self.lines
            .iter()
            .filter(|entry| entry.line_number == line)
            .map(|entry| entry.line_code_index)
            .min()
    }
}

fn method_payload(ref_type_id: ReferenceTypeId, method_id: MethodId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16);
    payload.put_u64(ref_type_id);
    payload.put_u64(method_id);
    payload
}

impl JdwpConnection {
    /// Method.LineTable
    pub async fn get_line_table(
        &self,
        ref_type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> JdwpResult<LineTable> {
        let reply = self
            .request(
                command_sets::METHOD,
                method_commands::LINE_TABLE,
                method_payload(ref_type_id, method_id),
            )
            .await?;

        let mut data = reply.data();

        let start = read_u64(&mut data)?;
        let end = read_u64(&mut data)?;

        let lines_count = read_i32(&mut data)?;
        let mut lines = Vec::with_capacity(lines_count.max(0) as usize);

        for _ in 0..lines_count {
            lines.push(LineTableEntry {
                line_code_index: read_u64(&mut data)?,
                line_number: read_i32(&mut data)?,
            });
        }

        Ok(LineTable { start, end, lines })
    }

    /// Method.VariableTable (locals need -g debug info)
    pub async fn get_variable_table(
        &self,
        ref_type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> JdwpResult<Vec<Variable>> {
        let reply = self
            .request(
                command_sets::METHOD,
                method_commands::VARIABLE_TABLE,
                method_payload(ref_type_id, method_id),
            )
            .await?;

        let mut data = reply.data();

        let _arg_count = read_i32(&mut data)?;

        let vars_count = read_i32(&mut data)?;
        let mut variables = Vec::with_capacity(vars_count.max(0) as usize);

        for _ in 0..vars_count {
            variables.push(Variable {
                code_index: read_u64(&mut data)?,
                name: read_string(&mut data)?,
                signature: read_string(&mut data)?,
                length: read_u32(&mut data)?,
                slot: read_u32(&mut data)?,
            });
        }

        Ok(variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LineTable {
        LineTable {
            start: 0,
            end: 20,
            lines: vec![
                LineTableEntry { line_code_index: 0, line_number: 10 },
                LineTableEntry { line_code_index: 4, line_number: 11 },
                LineTableEntry { line_code_index: 9, line_number: 12 },
                LineTableEntry { line_code_index: 15, line_number: 11 },
            ],
        }
    }

    #[test]
    fn test_line_for_index() {
        let table = table();
        assert_eq!(table.line_for_index(0), Some(10));
        assert_eq!(table.line_for_index(8), Some(11));
        assert_eq!(table.line_for_index(16), Some(11));
    }

    #[test]
    fn test_index_for_line_takes_lowest() {
        let table = table();
        assert_eq!(table.index_for_line(11), Some(4));
        assert_eq!(table.index_for_line(99), None);
    }
}
