//! The in-memory module file: an ordered list of sections plus the accessors and
//! mutators every other subsystem (instantiation, demos, tests) builds modules through.

pub mod instr;
pub mod name;
pub mod reader;
pub mod section;
pub mod types;
pub mod writer;

use crate::module::instr::Instruction;
use crate::module::name::NameSection;
use crate::module::section::{
    CodeSection, CustomPayload, CustomSection, DataSection, DataSegment, ElementSection,
    ElementSegment, ExportDesc, ExportEntry, ExportSection, FunctionBody, FunctionSection,
    GlobalEntry, GlobalSection, ImportDesc, ImportEntry, ImportSection, MemorySection, Section,
    SectionId, StartSection, TableSection, TypeSection,
};
use crate::module::types::{GlobalType, MemoryType, SignatureRef, TableType};
use std::rc::Rc;

pub use reader::decode_module;
pub use writer::encode_module;

/// The Wasm MVP magic number, `\0asm`.
pub const MAGIC: u32 = 0x6d73_6100;
pub const MVP_VERSION: u32 = 0x01;
pub const PRE_MVP_VERSION: u32 = 0x0D;

/// An ordered list of sections. Non-custom sections are kept in strictly ascending
/// section-code order; custom sections may sit anywhere but `insert_section` always
/// appends new ones at the end.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Module {
    sections: Vec<Section>,
}

impl Module {
    pub fn new() -> Module {
        Module { sections: Vec::new() }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Inserts a section, keeping non-custom sections in ascending code order and
    /// appending custom sections after everything else already present.
    pub fn insert_section(&mut self, section: Section) {
        if matches!(section, Section::Custom(_)) {
            self.sections.push(section);
            return;
        }
        let code = section.code();
        let position = self
            .sections
            .iter()
            .position(|existing| !matches!(existing, Section::Custom(_)) && existing.code() > code)
            .unwrap_or(self.sections.len());
        self.sections.insert(position, section);
    }

    fn first_of_kind(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id() == Some(id))
    }

    fn first_of_kind_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id() == Some(id))
    }

    pub fn custom_sections(&self) -> impl Iterator<Item = &CustomSection> {
        self.sections.iter().filter_map(|s| match s {
            Section::Custom(c) => Some(c),
            _ => None,
        })
    }

    pub fn name_section(&self) -> Option<&NameSection> {
        self.custom_sections().find_map(|c| match &c.payload {
            CustomPayload::Name(n) => Some(n),
            _ => None,
        })
    }

    pub fn types(&self) -> &[SignatureRef] {
        match self.first_of_kind(SectionId::Type) {
            Some(Section::Type(t, _)) => &t.types,
            _ => &[],
        }
    }

    pub fn imports(&self) -> &[ImportEntry] {
        match self.first_of_kind(SectionId::Import) {
            Some(Section::Import(i, _)) => &i.imports,
            _ => &[],
        }
    }

    pub fn function_type_indices(&self) -> &[u32] {
        match self.first_of_kind(SectionId::Function) {
            Some(Section::Function(f, _)) => &f.type_indices,
            _ => &[],
        }
    }

    pub fn tables(&self) -> &[TableType] {
        match self.first_of_kind(SectionId::Table) {
            Some(Section::Table(t, _)) => &t.tables,
            _ => &[],
        }
    }

    pub fn memories(&self) -> &[MemoryType] {
        match self.first_of_kind(SectionId::Memory) {
            Some(Section::Memory(m, _)) => &m.memories,
            _ => &[],
        }
    }

    pub fn globals(&self) -> &[GlobalEntry] {
        match self.first_of_kind(SectionId::Global) {
            Some(Section::Global(g, _)) => &g.globals,
            _ => &[],
        }
    }

    pub fn exports(&self) -> &[ExportEntry] {
        match self.first_of_kind(SectionId::Export) {
            Some(Section::Export(e, _)) => &e.exports,
            _ => &[],
        }
    }

    pub fn element_segments(&self) -> &[ElementSegment] {
        match self.first_of_kind(SectionId::Element) {
            Some(Section::Element(e, _)) => &e.segments,
            _ => &[],
        }
    }

    pub fn code_bodies(&self) -> &[FunctionBody] {
        match self.first_of_kind(SectionId::Code) {
            Some(Section::Code(c, _)) => &c.bodies,
            _ => &[],
        }
    }

    pub fn data_segments(&self) -> &[DataSegment] {
        match self.first_of_kind(SectionId::Data) {
            Some(Section::Data(d, _)) => &d.segments,
            _ => &[],
        }
    }

    pub fn start_function(&self) -> Option<u32> {
        match self.first_of_kind(SectionId::Start) {
            Some(Section::Start(s, _)) => Some(s.function_index),
            _ => None,
        }
    }

    pub fn set_start_function(&mut self, function_index: Option<u32>) {
        self.sections.retain(|s| s.id() != Some(SectionId::Start));
        if let Some(function_index) = function_index {
            self.insert_section(Section::Start(StartSection { function_index }, Vec::new()));
        }
    }

    /// Adds a function signature to the Type section (creating it if absent) and
    /// returns its index.
    pub fn add_type(&mut self, signature: SignatureRef) -> u32 {
        if self.first_of_kind(SectionId::Type).is_none() {
            self.insert_section(Section::Type(TypeSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Type) {
            Some(Section::Type(t, _)) => {
                t.types.push(signature);
                (t.types.len() - 1) as u32
            }
            _ => unreachable!(),
        }
    }

    /// Adds a defined function: a type index in the Function section plus its body in
    /// the Code section. Returns the function's index within the defined-function space
    /// (not counting any imported functions).
    pub fn add_function(&mut self, type_index: u32, body: FunctionBody) -> u32 {
        if self.first_of_kind(SectionId::Function).is_none() {
            self.insert_section(Section::Function(FunctionSection::default(), Vec::new()));
        }
        if self.first_of_kind(SectionId::Code).is_none() {
            self.insert_section(Section::Code(CodeSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Function) {
            Some(Section::Function(f, _)) => f.type_indices.push(type_index),
            _ => unreachable!(),
        }
        match self.first_of_kind_mut(SectionId::Code) {
            Some(Section::Code(c, _)) => {
                c.bodies.push(body);
                (c.bodies.len() - 1) as u32
            }
            _ => unreachable!(),
        }
    }

    pub fn add_import(&mut self, module: impl Into<String>, field: impl Into<String>, desc: ImportDesc) {
        if self.first_of_kind(SectionId::Import).is_none() {
            self.insert_section(Section::Import(ImportSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Import) {
            Some(Section::Import(i, _)) => {
                i.imports.push(ImportEntry { module: module.into(), field: field.into(), desc })
            }
            _ => unreachable!(),
        }
    }

    pub fn add_export(&mut self, name: impl Into<String>, desc: ExportDesc) {
        if self.first_of_kind(SectionId::Export).is_none() {
            self.insert_section(Section::Export(ExportSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Export) {
            Some(Section::Export(e, _)) => e.exports.push(ExportEntry { name: name.into(), desc }),
            _ => unreachable!(),
        }
    }

    pub fn add_memory(&mut self, memory_type: MemoryType) -> u32 {
        if self.first_of_kind(SectionId::Memory).is_none() {
            self.insert_section(Section::Memory(MemorySection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Memory) {
            Some(Section::Memory(m, _)) => {
                m.memories.push(memory_type);
                (m.memories.len() - 1) as u32
            }
            _ => unreachable!(),
        }
    }

    pub fn add_table(&mut self, table_type: TableType) -> u32 {
        if self.first_of_kind(SectionId::Table).is_none() {
            self.insert_section(Section::Table(TableSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Table) {
            Some(Section::Table(t, _)) => {
                t.tables.push(table_type);
                (t.tables.len() - 1) as u32
            }
            _ => unreachable!(),
        }
    }

    pub fn add_global(&mut self, global_type: GlobalType, init: Vec<Instruction>) -> u32 {
        if self.first_of_kind(SectionId::Global).is_none() {
            self.insert_section(Section::Global(GlobalSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Global) {
            Some(Section::Global(g, _)) => {
                g.globals.push(GlobalEntry { global_type, init });
                (g.globals.len() - 1) as u32
            }
            _ => unreachable!(),
        }
    }

    pub fn add_data_segment(&mut self, memory_index: u32, offset: Vec<Instruction>, bytes: Vec<u8>) {
        if self.first_of_kind(SectionId::Data).is_none() {
            self.insert_section(Section::Data(DataSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Data) {
            Some(Section::Data(d, _)) => d.segments.push(DataSegment { memory_index, offset, bytes }),
            _ => unreachable!(),
        }
    }

    pub fn add_element_segment(&mut self, table_index: u32, offset: Vec<Instruction>, function_indices: Vec<u32>) {
        if self.first_of_kind(SectionId::Element).is_none() {
            self.insert_section(Section::Element(ElementSection::default(), Vec::new()));
        }
        match self.first_of_kind_mut(SectionId::Element) {
            Some(Section::Element(e, _)) => {
                e.segments.push(ElementSegment { table_index, offset, function_indices })
            }
            _ => unreachable!(),
        }
    }

    /// Sets the custom name-section entry, creating the `"name"` custom section if
    /// absent, or replacing its parsed payload if present.
    pub fn set_name_section(&mut self, name_section: NameSection) {
        if let Some(existing) = self
            .sections
            .iter_mut()
            .find(|s| matches!(s, Section::Custom(c) if c.name == "name"))
        {
            if let Section::Custom(custom) = existing {
                custom.payload = CustomPayload::Name(name_section);
            }
            return;
        }
        self.insert_section(Section::Custom(CustomSection {
            name: "name".to_string(),
            payload: CustomPayload::Name(name_section),
        }));
    }

    /// The concatenated function-signature table looked up by a type index, as used by
    /// `call_indirect` and instantiation's function construction.
    pub fn signature_at(&self, type_index: u32) -> Option<SignatureRef> {
        self.types().get(type_index as usize).cloned()
    }
}

/// Convenience for building a function signature without importing `Rc` at call sites.
pub fn shared_signature(signature: crate::module::types::FunctionSignature) -> SignatureRef {
    Rc::new(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::types::{FunctionSignature, ValueType};

    #[test]
    fn insert_section_preserves_ascending_order() {
        let mut module = Module::new();
        module.insert_section(Section::Export(ExportSection::default(), Vec::new()));
        module.insert_section(Section::Type(TypeSection::default(), Vec::new()));
        module.insert_section(Section::Function(FunctionSection::default(), Vec::new()));

        let codes: Vec<u8> = module.sections().iter().map(Section::code).collect();
        let mut sorted = codes.clone();
        sorted.sort();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn custom_sections_append_regardless_of_order() {
        let mut module = Module::new();
        module.insert_section(Section::Data(DataSection::default(), Vec::new()));
        module.insert_section(Section::Custom(CustomSection {
            name: "producers".to_string(),
            payload: CustomPayload::Opaque(vec![]),
        }));
        module.insert_section(Section::Type(TypeSection::default(), Vec::new()));
        assert!(matches!(module.sections().last(), Some(Section::Custom(_))));
    }

    #[test]
    fn add_type_and_function_wires_up_indices() {
        let mut module = Module::new();
        let type_index = module.add_type(shared_signature(FunctionSignature::new(
            vec![ValueType::I32, ValueType::I32],
            vec![ValueType::I32],
        )));
        let function_index = module.add_function(
            type_index,
            FunctionBody {
                locals: vec![],
                body: vec![Instruction::LocalGet(0), Instruction::LocalGet(1), Instruction::I32Add],
                extra: vec![],
            },
        );
        assert_eq!(function_index, 0);
        assert_eq!(module.function_type_indices(), &[0]);
        assert_eq!(module.code_bodies().len(), 1);
    }

    #[test]
    fn start_function_setter_creates_and_removes_section() {
        let mut module = Module::new();
        assert_eq!(module.start_function(), None);
        module.set_start_function(Some(3));
        assert_eq!(module.start_function(), Some(3));
        module.set_start_function(None);
        assert_eq!(module.start_function(), None);
    }
}
