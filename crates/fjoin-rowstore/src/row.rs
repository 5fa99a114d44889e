//! Reading and writing individual fields of a stored row.

use fjoin_error::{JoinError, Result};
use fjoin_types::{LogicalType, ValueRef};

use crate::heap::StringHeap;
use crate::layout::{HEAP_REF_WIDTH, RowLayout};
use crate::pointer::{HeapRef, RowPointer};

fn read_array<const N: usize>(row: &[u8], offset: usize) -> Result<[u8; N]> {
    row.get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            JoinError::corrupt(format!(
                "field at {offset}..{} beyond row of {} bytes",
                offset + N,
                row.len()
            ))
        })
}

fn write_bytes(row: &mut [u8], offset: usize, bytes: &[u8]) -> Result<()> {
    let row_len = row.len();
    row.get_mut(offset..offset + bytes.len())
        .ok_or_else(|| {
            JoinError::corrupt(format!(
                "field at {offset}..{} beyond row of {row_len} bytes",
                offset + bytes.len()
            ))
        })?
        .copy_from_slice(bytes);
    Ok(())
}

// ── Validity, hash and chain pointer ──────────────────────────────────────

#[must_use]
pub fn is_valid(layout: &RowLayout, row: &[u8], col: usize) -> bool {
    row.get(layout.validity_offset() + col / 8)
        .is_some_and(|byte| byte & (1_u8 << (col % 8)) != 0)
}

fn set_valid(layout: &RowLayout, row: &mut [u8], col: usize, valid: bool) {
    if let Some(byte) = row.get_mut(layout.validity_offset() + col / 8) {
        let mask = 1_u8 << (col % 8);
        if valid {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}

pub fn read_hash(layout: &RowLayout, row: &[u8]) -> Result<u64> {
    read_array(row, layout.hash_offset()).map(u64::from_le_bytes)
}

pub fn write_hash(layout: &RowLayout, row: &mut [u8], hash: u64) -> Result<()> {
    write_bytes(row, layout.hash_offset(), &hash.to_le_bytes())
}

/// The next row in this row's bucket chain.
pub fn read_next(layout: &RowLayout, row: &[u8]) -> Result<RowPointer> {
    read_array(row, layout.pointer_offset())
        .map(|bytes| RowPointer::from_raw(u64::from_le_bytes(bytes)))
}

pub fn write_next(layout: &RowLayout, row: &mut [u8], next: RowPointer) -> Result<()> {
    write_bytes(row, layout.pointer_offset(), &next.to_raw().to_le_bytes())
}

// ── Heap slots ─────────────────────────────────────────────────────────────

/// Raw tagged heap reference and byte length of a VARCHAR slot.
pub fn read_heap_slot(layout: &RowLayout, row: &[u8], col: usize) -> Result<(u64, u32)> {
    let offset = layout.column_offset(col);
    let raw = u64::from_le_bytes(read_array(row, offset)?);
    let len = u32::from_le_bytes(read_array(row, offset + HEAP_REF_WIDTH)?);
    Ok((raw, len))
}

/// Replace the heap reference of a VARCHAR slot, keeping its length.
pub fn write_heap_ref(layout: &RowLayout, row: &mut [u8], col: usize, heap_ref: HeapRef) -> Result<()> {
    write_bytes(row, layout.column_offset(col), &heap_ref.encode()?.to_le_bytes())
}

// ── Values ─────────────────────────────────────────────────────────────────

/// Serialize `value` into column `col`, spilling strings into `heap`.
pub fn write_value(
    layout: &RowLayout,
    row: &mut [u8],
    col: usize,
    value: ValueRef<'_>,
    heap: &mut StringHeap,
) -> Result<()> {
    let ty = layout.types()[col];
    let offset = layout.column_offset(col);
    if let Some(actual) = value.logical_type() {
        if actual != ty {
            return Err(JoinError::type_mismatch(ty, actual));
        }
    }
    set_valid(layout, row, col, !value.is_null());
    match value {
        ValueRef::Null => Ok(()),
        ValueRef::Boolean(v) => write_bytes(row, offset, &[u8::from(v)]),
        ValueRef::Int32(v) => write_bytes(row, offset, &v.to_le_bytes()),
        ValueRef::Int64(v) => write_bytes(row, offset, &v.to_le_bytes()),
        ValueRef::Float64(v) => write_bytes(row, offset, &v.to_bits().to_le_bytes()),
        ValueRef::Varchar(v) => {
            let heap_ref = heap.append(v.as_bytes())?;
            write_bytes(row, offset, &heap_ref.encode()?.to_le_bytes())?;
            write_bytes(row, offset + HEAP_REF_WIDTH, &(v.len() as u32).to_le_bytes())
        }
    }
}

/// Borrow the value of column `col`. VARCHAR slots must be resident in `heap`.
pub fn read_value<'a>(
    layout: &RowLayout,
    row: &'a [u8],
    col: usize,
    heap: &'a StringHeap,
) -> Result<ValueRef<'a>> {
    if !is_valid(layout, row, col) {
        return Ok(ValueRef::Null);
    }
    let offset = layout.column_offset(col);
    Ok(match layout.types()[col] {
        LogicalType::Boolean => ValueRef::Boolean(read_array::<1>(row, offset)?[0] != 0),
        LogicalType::Int32 => ValueRef::Int32(i32::from_le_bytes(read_array(row, offset)?)),
        LogicalType::Int64 => ValueRef::Int64(i64::from_le_bytes(read_array(row, offset)?)),
        LogicalType::Float64 => {
            ValueRef::Float64(f64::from_bits(u64::from_le_bytes(read_array(row, offset)?)))
        }
        LogicalType::Varchar => {
            let (raw, len) = read_heap_slot(layout, row, col)?;
            let HeapRef::Resident { block, offset } = HeapRef::decode(raw) else {
                return Err(JoinError::corrupt(format!(
                    "column {col} read while its row is swizzled"
                )));
            };
            let bytes = heap.get(block, offset, len)?;
            ValueRef::Varchar(std::str::from_utf8(bytes).map_err(|err| {
                JoinError::corrupt(format!("column {col} holds invalid UTF-8: {err}"))
            })?)
        }
    })
}

/// Shift every resident heap reference of `row` by `block_base` blocks.
///
/// Used when a row's heap blocks are appended behind another table's heap.
pub fn rebase_heap_refs(layout: &RowLayout, row: &mut [u8], block_base: u32) -> Result<()> {
    if block_base == 0 {
        return Ok(());
    }
    for col in layout.variable_columns() {
        if !is_valid(layout, row, col) {
            continue;
        }
        let (raw, _) = read_heap_slot(layout, row, col)?;
        if let HeapRef::Resident { block, offset } = HeapRef::decode(raw) {
            let block = block.checked_add(block_base).ok_or_else(|| {
                JoinError::exhausted("heap block index space exhausted during merge")
            })?;
            write_heap_ref(layout, row, col, HeapRef::Resident { block, offset })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RowLayout {
        RowLayout::new(vec![
            LogicalType::Int64,
            LogicalType::Varchar,
            LogicalType::Float64,
            LogicalType::Boolean,
        ])
    }

    #[test]
    fn write_then_read_every_type() {
        let layout = layout();
        let mut heap = StringHeap::new(64);
        let mut row = vec![0_u8; layout.entry_size()];
        write_value(&layout, &mut row, 0, ValueRef::Int64(-9), &mut heap).expect("int");
        write_value(&layout, &mut row, 1, ValueRef::Varchar("abc"), &mut heap).expect("str");
        write_value(&layout, &mut row, 2, ValueRef::Null, &mut heap).expect("null");
        write_value(&layout, &mut row, 3, ValueRef::Boolean(true), &mut heap).expect("bool");
        write_hash(&layout, &mut row, 0xDEAD_BEEF).expect("hash");
        write_next(&layout, &mut row, RowPointer::new(2, 3)).expect("next");

        assert_eq!(read_value(&layout, &row, 0, &heap).expect("r0"), ValueRef::Int64(-9));
        assert_eq!(read_value(&layout, &row, 1, &heap).expect("r1"), ValueRef::Varchar("abc"));
        assert_eq!(read_value(&layout, &row, 2, &heap).expect("r2"), ValueRef::Null);
        assert_eq!(read_value(&layout, &row, 3, &heap).expect("r3"), ValueRef::Boolean(true));
        assert_eq!(read_hash(&layout, &row).expect("hash"), 0xDEAD_BEEF);
        assert_eq!(read_next(&layout, &row).expect("next"), RowPointer::new(2, 3));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let layout = layout();
        let mut heap = StringHeap::new(64);
        let mut row = vec![0_u8; layout.entry_size()];
        let err = write_value(&layout, &mut row, 0, ValueRef::Varchar("x"), &mut heap)
            .expect_err("mismatch");
        assert!(err.is_contract_violation());
    }

    #[test]
    fn swizzled_slot_is_not_readable() {
        let layout = layout();
        let mut heap = StringHeap::new(64);
        let mut row = vec![0_u8; layout.entry_size()];
        write_value(&layout, &mut row, 1, ValueRef::Varchar("abc"), &mut heap).expect("str");
        write_heap_ref(&layout, &mut row, 1, HeapRef::Swizzled { offset: 0 }).expect("swizzle");
        assert!(read_value(&layout, &row, 1, &heap).is_err());
    }

    #[test]
    fn rebase_moves_resident_refs() {
        let layout = layout();
        let mut heap = StringHeap::new(64);
        let mut row = vec![0_u8; layout.entry_size()];
        write_value(&layout, &mut row, 1, ValueRef::Varchar("abc"), &mut heap).expect("str");
        rebase_heap_refs(&layout, &mut row, 4).expect("rebase");
        let (raw, len) = read_heap_slot(&layout, &row, 1).expect("slot");
        assert_eq!(HeapRef::decode(raw), HeapRef::Resident { block: 4, offset: 0 });
        assert_eq!(len, 3);
    }
}
