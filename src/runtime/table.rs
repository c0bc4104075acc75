//! Function table: an indexed array of callable slots used by `call_indirect`, shaped
//! after [`crate::runtime::memory::LinearMemory`]'s ownership and bounds-check style so
//! the two runtime collections read consistently.

use crate::runtime::error::Trap;
use std::rc::Rc;

/// One table slot: either an installed function index into the owning instance's
/// function vector, or the trap-placeholder every slot starts as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableSlot {
    Uninitialized,
    Function(usize),
}

#[derive(Debug)]
pub struct FunctionTable {
    slots: Vec<TableSlot>,
    declared_max: Option<u32>,
}

impl FunctionTable {
    pub fn new(initial: u32, declared_max: Option<u32>) -> FunctionTable {
        FunctionTable { slots: vec![TableSlot::Uninitialized; initial as usize], declared_max }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: u32) -> Result<TableSlot, Trap> {
        self.slots.get(index as usize).copied().ok_or(Trap::UndefinedElement)
    }

    pub fn set(&mut self, index: u32, slot: TableSlot) -> Result<(), Trap> {
        let entry = self.slots.get_mut(index as usize).ok_or(Trap::UndefinedElement)?;
        *entry = slot;
        Ok(())
    }

    pub fn declared_max(&self) -> Option<u32> {
        self.declared_max
    }
}

/// Shared handle so a table can be referenced both by its owning instance and by
/// imports of that table from another instance, without a second owning edge.
pub type TableRef = Rc<std::cell::RefCell<FunctionTable>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slots_start_uninitialized() {
        let table = FunctionTable::new(2, None);
        assert_eq!(table.get(0).unwrap(), TableSlot::Uninitialized);
        assert_eq!(table.get(1).unwrap(), TableSlot::Uninitialized);
    }

    #[test]
    fn out_of_bounds_get_and_set_trap() {
        let mut table = FunctionTable::new(1, None);
        assert!(matches!(table.get(5), Err(Trap::UndefinedElement)));
        assert!(matches!(table.set(5, TableSlot::Function(0)), Err(Trap::UndefinedElement)));
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut table = FunctionTable::new(1, None);
        table.set(0, TableSlot::Function(3)).unwrap();
        assert_eq!(table.get(0).unwrap(), TableSlot::Function(3));
    }
}
