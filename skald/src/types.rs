//! The Skald type system.
//!
//! A closed sum: single-word data (`u24`, `s24`), typed two-word addresses
//! (`addr<T>`), flat structs, and one-dimensional arrays. Struct and array
//! *values* are address-like: they live in an address register holding the
//! aggregate's base pointer. Layout counts 24-bit words: data fields take
//! one word, address fields two (low then high).

use crate::ast::Pos;
use crate::error::{type_error, Result};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    U24,
    S24,
    Addr(Box<Type>),
    Struct(Rc<StructDef>),
    Array(Rc<ArrayDef>),
}

#[derive(Debug, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub size_words: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ArrayDef {
    pub elem: Type,
    pub len: u32,
    pub elem_words: u32,
    pub size_words: u32,
}

impl Type {
    pub fn is_data(&self) -> bool {
        matches!(self, Type::U24 | Type::S24)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::S24)
    }

    /// Whether a value of this type lives in an address register.
    pub fn is_addr_like(&self) -> bool {
        !self.is_data()
    }

    pub fn bits(&self) -> u32 {
        if self.is_data() {
            24
        } else {
            48
        }
    }

    pub fn size_words(&self) -> u32 {
        match self {
            Type::U24 | Type::S24 => 1,
            Type::Addr(_) => 2,
            Type::Struct(def) => def.size_words,
            Type::Array(def) => def.size_words,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::U24 => write!(f, "u24"),
            Type::S24 => write!(f, "s24"),
            Type::Addr(pointee) => write!(f, "addr<{}>", pointee),
            Type::Struct(def) => write!(f, "{}", def.name),
            Type::Array(def) => write!(f, "{}[{}]", def.elem, def.len),
        }
    }
}

pub fn addr_of(ty: Type) -> Type {
    Type::Addr(Box::new(ty))
}

/// Registry of named struct types for one translation unit.
#[derive(Default)]
pub struct TypeTable {
    structs: HashMap<String, Rc<StructDef>>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    pub fn lookup(&self, name: &str) -> Option<Type> {
        match name {
            "u24" => Some(Type::U24),
            "s24" => Some(Type::S24),
            _ => self.structs.get(name).map(|def| Type::Struct(def.clone())),
        }
    }

    pub fn define_struct(
        &mut self,
        name: &str,
        fields: Vec<(String, Type)>,
        pos: Pos,
    ) -> Result<Type> {
        if self.structs.contains_key(name) {
            return Err(type_error(pos, format!("duplicate struct '{}'", name)));
        }
        let mut laid_out: Vec<Field> = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for (field_name, field_ty) in fields {
            let words = match field_ty {
                Type::U24 | Type::S24 => 1,
                Type::Addr(_) => 2,
                Type::Struct(_) | Type::Array(_) => {
                    return Err(type_error(
                        pos,
                        format!(
                            "field '{}' of '{}': struct fields must be data or typed addresses",
                            field_name, name
                        ),
                    ));
                }
            };
            if laid_out.iter().any(|f| f.name == field_name) {
                return Err(type_error(
                    pos,
                    format!("duplicate field '{}' in struct '{}'", field_name, name),
                ));
            }
            laid_out.push(Field {
                name: field_name,
                ty: field_ty,
                offset,
            });
            offset += words;
        }
        let def = Rc::new(StructDef {
            name: name.to_string(),
            fields: laid_out,
            size_words: offset,
        });
        self.structs.insert(name.to_string(), def.clone());
        Ok(Type::Struct(def))
    }

    pub fn array_of(&self, elem: Type, len: u32, pos: Pos) -> Result<Type> {
        if !matches!(elem, Type::U24 | Type::S24 | Type::Addr(_)) {
            return Err(type_error(
                pos,
                "array elements must be data or typed addresses",
            ));
        }
        let elem_words = elem.size_words();
        Ok(Type::Array(Rc::new(ArrayDef {
            elem,
            len,
            elem_words,
            size_words: elem_words * len,
        })))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pos() -> Pos {
        Pos { line: 1, col: 1 }
    }

    #[test]
    fn struct_layout_counts_words() {
        let mut table = TypeTable::new();
        let ty = table
            .define_struct(
                "Node",
                vec![
                    ("value".to_string(), Type::U24),
                    ("next".to_string(), addr_of(Type::U24)),
                    ("flags".to_string(), Type::S24),
                ],
                pos(),
            )
            .unwrap();
        let Type::Struct(def) = ty else { panic!() };
        assert_eq!(def.size_words, 4);
        assert_eq!(def.fields[0].offset, 0);
        assert_eq!(def.fields[1].offset, 1);
        assert_eq!(def.fields[2].offset, 3);
    }

    #[test]
    fn nested_aggregates_are_rejected() {
        let mut table = TypeTable::new();
        let inner = table
            .define_struct("Inner", vec![("x".to_string(), Type::U24)], pos())
            .unwrap();
        assert!(table
            .define_struct("Outer", vec![("inner".to_string(), inner.clone())], pos())
            .is_err());
        assert!(table.array_of(inner, 4, pos()).is_err());
    }

    #[test]
    fn array_layout() {
        let table = TypeTable::new();
        let ty = table.array_of(addr_of(Type::U24), 3, pos()).unwrap();
        assert_eq!(ty.size_words(), 6);
        let Type::Array(def) = ty else { panic!() };
        assert_eq!(def.elem_words, 2);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::U24.to_string(), "u24");
        assert_eq!(addr_of(Type::S24).to_string(), "addr<s24>");
    }
}
