//! The Sable type model: interned type descriptors and their rules.
//!
//! Every type in a compilation is canonicalized through the
//! [`TypeInterner`]: structurally identical descriptors intern to the
//! same [`TypeLocation`], so type equality everywhere else in the
//! compiler is handle equality.
//!
//! Nominal types (structs and enums) are identified by their definition
//! id plus generic arguments; their field and variant layouts live in
//! side tables filled in when the definition is resolved. This lets
//! recursive types (`struct Node { next: *Node }`) intern their own
//! handle before their layout is complete.
//!
//! `Option` and `Result` are built-in generic enum definitions with
//! well-known ids; the lowerer recognizes them to pick their fixed
//! layouts (`{i1, T}` and `{i8, T, E}`).

use indexmap::{IndexMap, IndexSet};

/// Unique handle for an interned type. Equality is type equality.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeLocation(pub usize);

impl TypeLocation {
    /// Sentinel for an unresolved type location.
    pub const UNDEFINED: Self = TypeLocation(usize::MAX);
}

impl From<usize> for TypeLocation {
    fn from(location: usize) -> Self {
        TypeLocation(location)
    }
}

/// Identity of a struct or enum definition, shared by all of its
/// generic instantiations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(pub usize);

/// Definition id of the built-in `Option` enum.
pub const OPTION_DEF: DefId = DefId(0);

/// Definition id of the built-in `Result` enum.
pub const RESULT_DEF: DefId = DefId(1);

/// Built-in primitive type kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 128-bit signed integer
    I128,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 128-bit unsigned integer
    U128,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Boolean
    Bool,
    /// Unicode scalar value
    Char,
    /// String
    String,
}

impl PrimitiveKind {
    /// The source-level name of the primitive.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::I128 => "i128",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::U128 => "u128",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::String => "string",
        }
    }

    /// All primitive kinds with their names, for name resolution.
    pub fn all() -> &'static [PrimitiveKind] {
        &[
            PrimitiveKind::I8,
            PrimitiveKind::I16,
            PrimitiveKind::I32,
            PrimitiveKind::I64,
            PrimitiveKind::I128,
            PrimitiveKind::U8,
            PrimitiveKind::U16,
            PrimitiveKind::U32,
            PrimitiveKind::U64,
            PrimitiveKind::U128,
            PrimitiveKind::F32,
            PrimitiveKind::F64,
            PrimitiveKind::Bool,
            PrimitiveKind::Char,
            PrimitiveKind::String,
        ]
    }

    /// Bit width for integer kinds.
    pub fn bit_width(self) -> Option<u32> {
        match self {
            PrimitiveKind::I8 | PrimitiveKind::U8 => Some(8),
            PrimitiveKind::I16 | PrimitiveKind::U16 => Some(16),
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::Char => Some(32),
            PrimitiveKind::I64 | PrimitiveKind::U64 => Some(64),
            PrimitiveKind::I128 | PrimitiveKind::U128 => Some(128),
            _ => None,
        }
    }
}

/// An interned type descriptor.
///
/// Nominal variants carry identity only; their layouts are kept in the
/// interner's side tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// A primitive type
    Primitive(PrimitiveKind),
    /// A pointer to another type
    Pointer(TypeLocation),
    /// A slice of an element type, lowered as `{ptr, i64}`
    Slice(TypeLocation),
    /// A fixed-size array
    Array(TypeLocation, u64),
    /// A tuple
    Tuple(Vec<TypeLocation>),
    /// A function type
    Function {
        /// Parameter types
        params: Vec<TypeLocation>,
        /// Result type
        result: TypeLocation,
        /// Whether extra arguments are accepted after the fixed ones
        variadic: bool,
    },
    /// A struct instantiation identified by definition and arguments
    Struct {
        /// The struct definition
        def: DefId,
        /// Generic arguments, empty for plain structs
        args: Vec<TypeLocation>,
    },
    /// An enum instantiation identified by definition and arguments
    Enum {
        /// The enum definition
        def: DefId,
        /// Generic arguments, empty for plain enums
        args: Vec<TypeLocation>,
    },
    /// The unit type
    Unit,
    /// The type of expressions that never produce a value
    Never,
    /// Placeholder used after a type error, assignable in both
    /// directions to suppress error cascades
    Unknown,
}

/// Field layout of a struct instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    /// Struct name for display
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<(String, TypeLocation)>,
}

impl StructLayout {
    /// Index and type of a named field.
    pub fn field(&self, name: &str) -> Option<(usize, TypeLocation)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, (field, _))| field == name)
            .map(|(index, (_, ty))| (index, *ty))
    }
}

/// Variant layout of an enum instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumLayout {
    /// Enum name for display
    pub name: String,
    /// Variants in declaration order with their payload types
    pub variants: Vec<(String, Vec<TypeLocation>)>,
}

impl EnumLayout {
    /// Index and payload of a named variant.
    pub fn variant(&self, name: &str) -> Option<(usize, &[TypeLocation])> {
        self.variants
            .iter()
            .enumerate()
            .find(|(_, (variant, _))| variant == name)
            .map(|(index, (_, payload))| (index, payload.as_slice()))
    }
}

/// The interned type table owned by one compilation.
#[derive(Debug)]
pub struct TypeInterner {
    types: IndexSet<TypeDescriptor>,
    struct_layouts: IndexMap<TypeLocation, StructLayout>,
    enum_layouts: IndexMap<TypeLocation, EnumLayout>,
    def_names: IndexMap<DefId, String>,
    next_def: usize,
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeInterner {
    /// Creates an interner with the built-in definitions registered.
    pub fn new() -> Self {
        let mut interner = Self {
            types: IndexSet::new(),
            struct_layouts: IndexMap::new(),
            enum_layouts: IndexMap::new(),
            def_names: IndexMap::new(),
            next_def: 2,
        };
        interner.def_names.insert(OPTION_DEF, "Option".to_string());
        interner.def_names.insert(RESULT_DEF, "Result".to_string());
        interner
    }

    /// Allocates a fresh definition id for a user struct or enum.
    pub fn allocate_def(&mut self, name: &str) -> DefId {
        let def = DefId(self.next_def);
        self.next_def += 1;
        self.def_names.insert(def, name.to_string());
        def
    }

    /// The display name of a definition.
    pub fn def_name(&self, def: DefId) -> &str {
        self.def_names.get(&def).map(String::as_str).unwrap_or("<unknown>")
    }

    /// Interns a descriptor, returning the canonical handle.
    ///
    /// A fresh entry is created only when no existing descriptor is
    /// structurally identical.
    pub fn intern(&mut self, descriptor: TypeDescriptor) -> TypeLocation {
        let (index, _) = self.types.insert_full(descriptor);
        TypeLocation(index)
    }

    /// Looks up the descriptor behind a handle.
    pub fn get(&self, location: TypeLocation) -> Option<&TypeDescriptor> {
        self.types.get_index(location.0)
    }

    /// Shorthand for interning a primitive.
    pub fn primitive(&mut self, kind: PrimitiveKind) -> TypeLocation {
        self.intern(TypeDescriptor::Primitive(kind))
    }

    /// The unit type handle.
    pub fn unit(&mut self) -> TypeLocation {
        self.intern(TypeDescriptor::Unit)
    }

    /// The never type handle.
    pub fn never(&mut self) -> TypeLocation {
        self.intern(TypeDescriptor::Never)
    }

    /// The unknown type handle.
    pub fn unknown(&mut self) -> TypeLocation {
        self.intern(TypeDescriptor::Unknown)
    }

    /// The boolean type handle.
    pub fn bool_type(&mut self) -> TypeLocation {
        self.primitive(PrimitiveKind::Bool)
    }

    /// Interns `Option<inner>` and records its variant layout.
    pub fn option_of(&mut self, inner: TypeLocation) -> TypeLocation {
        let location = self.intern(TypeDescriptor::Enum { def: OPTION_DEF, args: vec![inner] });
        self.enum_layouts.entry(location).or_insert_with(|| EnumLayout {
            name: "Option".to_string(),
            variants: vec![("Some".to_string(), vec![inner]), ("None".to_string(), vec![])],
        });
        location
    }

    /// Interns `Result<ok, err>` and records its variant layout.
    ///
    /// `Ok` is discriminant 0, `Err` is discriminant 1.
    pub fn result_of(&mut self, ok: TypeLocation, err: TypeLocation) -> TypeLocation {
        let location = self.intern(TypeDescriptor::Enum { def: RESULT_DEF, args: vec![ok, err] });
        self.enum_layouts.entry(location).or_insert_with(|| EnumLayout {
            name: "Result".to_string(),
            variants: vec![("Ok".to_string(), vec![ok]), ("Err".to_string(), vec![err])],
        });
        location
    }

    /// Records the field layout of a struct instantiation.
    pub fn set_struct_layout(&mut self, location: TypeLocation, layout: StructLayout) {
        self.struct_layouts.insert(location, layout);
    }

    /// Records the variant layout of an enum instantiation.
    pub fn set_enum_layout(&mut self, location: TypeLocation, layout: EnumLayout) {
        self.enum_layouts.insert(location, layout);
    }

    /// The field layout of a struct handle, when resolved.
    pub fn struct_layout(&self, location: TypeLocation) -> Option<&StructLayout> {
        self.struct_layouts.get(&location)
    }

    /// The variant layout of an enum handle, when resolved.
    pub fn enum_layout(&self, location: TypeLocation) -> Option<&EnumLayout> {
        self.enum_layouts.get(&location)
    }

    /// True when `from` may be used where `to` is expected.
    ///
    /// Identical handles assign; `never` assigns to everything; the
    /// `Unknown` placeholder assigns both ways so one error does not
    /// cascade. Numeric widening is never implicit.
    pub fn is_assignable_to(&self, from: TypeLocation, to: TypeLocation) -> bool {
        if from == to {
            return true;
        }
        matches!(
            (self.get(from), self.get(to)),
            (Some(TypeDescriptor::Never), _)
                | (Some(TypeDescriptor::Unknown), _)
                | (_, Some(TypeDescriptor::Unknown))
        )
    }

    /// Unifies two type handles, if one direction assigns.
    pub fn unify(&self, a: TypeLocation, b: TypeLocation) -> Option<TypeLocation> {
        if a == b {
            return Some(a);
        }
        match (self.get(a), self.get(b)) {
            (Some(TypeDescriptor::Never), _) | (Some(TypeDescriptor::Unknown), _) => Some(b),
            (_, Some(TypeDescriptor::Never)) | (_, Some(TypeDescriptor::Unknown)) => Some(a),
            _ => None,
        }
    }

    /// True for integer and float primitives.
    pub fn is_numeric(&self, location: TypeLocation) -> bool {
        self.is_integer(location) || self.is_float(location)
    }

    /// True for integer primitives.
    pub fn is_integer(&self, location: TypeLocation) -> bool {
        matches!(
            self.get(location),
            Some(TypeDescriptor::Primitive(
                PrimitiveKind::I8
                    | PrimitiveKind::I16
                    | PrimitiveKind::I32
                    | PrimitiveKind::I64
                    | PrimitiveKind::I128
                    | PrimitiveKind::U8
                    | PrimitiveKind::U16
                    | PrimitiveKind::U32
                    | PrimitiveKind::U64
                    | PrimitiveKind::U128
            ))
        )
    }

    /// True for signed integer primitives.
    pub fn is_signed(&self, location: TypeLocation) -> bool {
        matches!(
            self.get(location),
            Some(TypeDescriptor::Primitive(
                PrimitiveKind::I8
                    | PrimitiveKind::I16
                    | PrimitiveKind::I32
                    | PrimitiveKind::I64
                    | PrimitiveKind::I128
            ))
        )
    }

    /// True for float primitives.
    pub fn is_float(&self, location: TypeLocation) -> bool {
        matches!(
            self.get(location),
            Some(TypeDescriptor::Primitive(PrimitiveKind::F32 | PrimitiveKind::F64))
        )
    }

    /// True for pointer types.
    pub fn is_pointer(&self, location: TypeLocation) -> bool {
        matches!(self.get(location), Some(TypeDescriptor::Pointer(_)))
    }

    /// Size in bytes using a C-like layout on a 64-bit target.
    pub fn size_of(&self, location: TypeLocation) -> u64 {
        match self.get(location) {
            Some(TypeDescriptor::Primitive(kind)) => match kind {
                PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => 1,
                PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
                PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::Char | PrimitiveKind::F32 => 4,
                PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => 8,
                PrimitiveKind::I128 | PrimitiveKind::U128 => 16,
                PrimitiveKind::String => 8,
            },
            Some(TypeDescriptor::Pointer(_)) => 8,
            Some(TypeDescriptor::Slice(_)) => 16,
            Some(TypeDescriptor::Array(element, len)) => self.size_of(*element) * len,
            Some(TypeDescriptor::Tuple(elements)) => {
                self.aggregate_size(elements.iter().copied())
            }
            Some(TypeDescriptor::Function { .. }) => 8,
            Some(TypeDescriptor::Struct { .. }) => {
                let fields: Vec<TypeLocation> = self
                    .struct_layout(location)
                    .map(|layout| layout.fields.iter().map(|(_, ty)| *ty).collect())
                    .unwrap_or_default();
                self.aggregate_size(fields.into_iter())
            }
            Some(TypeDescriptor::Enum { .. }) => {
                let mut members = vec![];
                if let Some(layout) = self.enum_layout(location) {
                    for (_, payload) in &layout.variants {
                        members.extend(payload.iter().copied());
                    }
                }
                // Discriminant byte plus every variant's payload slots.
                let payload = self.aggregate_size(members.into_iter());
                let align = self.align_of(location);
                (1 + payload).div_ceil(align) * align
            }
            Some(TypeDescriptor::Unit | TypeDescriptor::Never | TypeDescriptor::Unknown) | None => 0,
        }
    }

    /// Alignment in bytes.
    pub fn align_of(&self, location: TypeLocation) -> u64 {
        match self.get(location) {
            Some(TypeDescriptor::Primitive(_)) => self.size_of(location).clamp(1, 16),
            Some(TypeDescriptor::Pointer(_) | TypeDescriptor::Function { .. }) => 8,
            Some(TypeDescriptor::Slice(_)) => 8,
            Some(TypeDescriptor::Array(element, _)) => self.align_of(*element),
            Some(TypeDescriptor::Tuple(elements)) => elements
                .iter()
                .map(|element| self.align_of(*element))
                .max()
                .unwrap_or(1),
            Some(TypeDescriptor::Struct { .. }) => self
                .struct_layout(location)
                .map(|layout| {
                    layout.fields.iter().map(|(_, ty)| self.align_of(*ty)).max().unwrap_or(1)
                })
                .unwrap_or(1),
            Some(TypeDescriptor::Enum { .. }) => self
                .enum_layout(location)
                .map(|layout| {
                    layout
                        .variants
                        .iter()
                        .flat_map(|(_, payload)| payload.iter())
                        .map(|ty| self.align_of(*ty))
                        .max()
                        .unwrap_or(1)
                })
                .unwrap_or(1),
            Some(TypeDescriptor::Unit | TypeDescriptor::Never | TypeDescriptor::Unknown) | None => 1,
        }
    }

    fn aggregate_size(&self, members: impl Iterator<Item = TypeLocation>) -> u64 {
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for member in members {
            let align = self.align_of(member).max(1);
            max_align = max_align.max(align);
            offset = offset.div_ceil(align) * align;
            offset += self.size_of(member);
        }
        offset.div_ceil(max_align) * max_align
    }

    /// Human-readable name of a type handle, for diagnostics.
    pub fn display(&self, location: TypeLocation) -> String {
        match self.get(location) {
            Some(TypeDescriptor::Primitive(kind)) => kind.name().to_string(),
            Some(TypeDescriptor::Pointer(pointee)) => format!("*{}", self.display(*pointee)),
            Some(TypeDescriptor::Slice(element)) => format!("[{}]", self.display(*element)),
            Some(TypeDescriptor::Array(element, len)) => {
                format!("[{}; {len}]", self.display(*element))
            }
            Some(TypeDescriptor::Tuple(elements)) => {
                let inner: Vec<String> = elements.iter().map(|e| self.display(*e)).collect();
                format!("({})", inner.join(", "))
            }
            Some(TypeDescriptor::Function { params, result, .. }) => {
                let inner: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                format!("fn({}) -> {}", inner.join(", "), self.display(*result))
            }
            Some(TypeDescriptor::Struct { def, args }) | Some(TypeDescriptor::Enum { def, args }) => {
                let name = self.def_name(*def).to_string();
                if args.is_empty() {
                    name
                } else {
                    let inner: Vec<String> = args.iter().map(|a| self.display(*a)).collect();
                    format!("{name}<{}>", inner.join(", "))
                }
            }
            Some(TypeDescriptor::Unit) => "unit".to_string(),
            Some(TypeDescriptor::Never) => "never".to_string(),
            Some(TypeDescriptor::Unknown) => "{unknown}".to_string(),
            None => "{invalid}".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn interning_is_canonical() {
        let mut interner = TypeInterner::new();
        let a = interner.primitive(PrimitiveKind::I32);
        let b = interner.primitive(PrimitiveKind::I32);
        assert_eq!(a, b);

        let pointer_a = interner.intern(TypeDescriptor::Pointer(a));
        let pointer_b = interner.intern(TypeDescriptor::Pointer(b));
        assert_eq!(pointer_a, pointer_b);

        let tuple_a = interner.intern(TypeDescriptor::Tuple(vec![a, pointer_a]));
        let tuple_b = interner.intern(TypeDescriptor::Tuple(vec![b, pointer_b]));
        assert_eq!(tuple_a, tuple_b);
    }

    #[test]
    fn distinct_descriptors_get_distinct_handles() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.primitive(PrimitiveKind::I32);
        let i64_ty = interner.primitive(PrimitiveKind::I64);
        assert_ne!(i32_ty, i64_ty);

        let option_i32 = interner.option_of(i32_ty);
        let option_i64 = interner.option_of(i64_ty);
        assert_ne!(option_i32, option_i64);
        assert_eq!(option_i32, interner.option_of(i32_ty));
    }

    #[test]
    fn never_assigns_to_everything() {
        let mut interner = TypeInterner::new();
        let never = interner.never();
        let i32_ty = interner.primitive(PrimitiveKind::I32);
        let unit = interner.unit();
        assert!(interner.is_assignable_to(never, i32_ty));
        assert!(interner.is_assignable_to(never, unit));
        assert!(!interner.is_assignable_to(i32_ty, unit));
    }

    #[test]
    fn no_implicit_widening() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.primitive(PrimitiveKind::I32);
        let i64_ty = interner.primitive(PrimitiveKind::I64);
        assert!(!interner.is_assignable_to(i32_ty, i64_ty));
        assert!(!interner.is_assignable_to(i64_ty, i32_ty));
    }

    #[test]
    fn unknown_assigns_both_ways() {
        let mut interner = TypeInterner::new();
        let unknown = interner.unknown();
        let bool_ty = interner.bool_type();
        assert!(interner.is_assignable_to(unknown, bool_ty));
        assert!(interner.is_assignable_to(bool_ty, unknown));
    }

    #[rstest]
    #[case(PrimitiveKind::I8, true, true)]
    #[case(PrimitiveKind::U64, true, false)]
    #[case(PrimitiveKind::F32, false, false)]
    #[case(PrimitiveKind::Bool, false, false)]
    fn predicates(#[case] kind: PrimitiveKind, #[case] integer: bool, #[case] signed: bool) {
        let mut interner = TypeInterner::new();
        let ty = interner.primitive(kind);
        assert_eq!(interner.is_integer(ty), integer);
        assert_eq!(interner.is_signed(ty), signed);
    }

    #[test]
    fn option_layout_has_some_and_none() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.primitive(PrimitiveKind::I32);
        let option = interner.option_of(i32_ty);
        let layout = interner.enum_layout(option).unwrap();
        assert_eq!(layout.variant("Some"), Some((0, [i32_ty].as_slice())));
        assert_eq!(layout.variant("None"), Some((1, [].as_slice())));
    }

    #[test]
    fn result_discriminants() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.primitive(PrimitiveKind::I32);
        let string_ty = interner.primitive(PrimitiveKind::String);
        let result = interner.result_of(i32_ty, string_ty);
        let layout = interner.enum_layout(result).unwrap();
        assert_eq!(layout.variant("Ok").unwrap().0, 0);
        assert_eq!(layout.variant("Err").unwrap().0, 1);
    }

    #[rstest]
    #[case(PrimitiveKind::I8, 1)]
    #[case(PrimitiveKind::I32, 4)]
    #[case(PrimitiveKind::U128, 16)]
    #[case(PrimitiveKind::F64, 8)]
    fn primitive_sizes(#[case] kind: PrimitiveKind, #[case] expected: u64) {
        let mut interner = TypeInterner::new();
        let ty = interner.primitive(kind);
        assert_eq!(interner.size_of(ty), expected);
    }

    #[test]
    fn aggregate_sizes_respect_alignment() {
        let mut interner = TypeInterner::new();
        let i8_ty = interner.primitive(PrimitiveKind::I8);
        let i64_ty = interner.primitive(PrimitiveKind::I64);
        let tuple = interner.intern(TypeDescriptor::Tuple(vec![i8_ty, i64_ty]));
        assert_eq!(interner.size_of(tuple), 16);
        assert_eq!(interner.align_of(tuple), 8);

        let slice = interner.intern(TypeDescriptor::Slice(i64_ty));
        assert_eq!(interner.size_of(slice), 16);
    }

    #[test]
    fn display_names() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.primitive(PrimitiveKind::I32);
        let option = interner.option_of(i32_ty);
        let pointer = interner.intern(TypeDescriptor::Pointer(option));
        assert_eq!(interner.display(pointer), "*Option<i32>");
    }
}
