//! Mapping from interned Sable types to LLVM types.
//!
//! - primitives map to the matching integer/float widths, `bool` to
//!   `i1`, `char` to `i32`, `string` to an opaque pointer;
//! - pointers are opaque pointers;
//! - slices are `{ptr, i64}` pairs;
//! - tuples and structs are LLVM struct types over their members;
//! - `Option<T>` is `{i1, T}` and `Result<T, E>` is `{i8, T, E}`;
//!   other enums generalize the Result scheme to
//!   `{i8 tag, fields of every variant appended}`;
//! - `unit` used as a value is the empty struct.

use inkwell::context::Context;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::AddressSpace;

use crate::error::InternalError;
use crate::sema::SemaContext;
use crate::types::{PrimitiveKind, TypeDescriptor, TypeLocation, OPTION_DEF};

/// Maps one interned type to an LLVM value type.
pub(crate) fn basic_type<'ctx>(
    llvm: &'ctx Context,
    sema: &SemaContext<'_>,
    location: TypeLocation,
) -> Result<BasicTypeEnum<'ctx>, InternalError> {
    let descriptor = sema
        .interner
        .get(location)
        .ok_or_else(|| InternalError::new("expression without an interned type reached lowering"))?;

    Ok(match descriptor {
        TypeDescriptor::Primitive(kind) => match kind {
            PrimitiveKind::I8 | PrimitiveKind::U8 => llvm.i8_type().into(),
            PrimitiveKind::I16 | PrimitiveKind::U16 => llvm.i16_type().into(),
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::Char => llvm.i32_type().into(),
            PrimitiveKind::I64 | PrimitiveKind::U64 => llvm.i64_type().into(),
            PrimitiveKind::I128 | PrimitiveKind::U128 => llvm.i128_type().into(),
            PrimitiveKind::F32 => llvm.f32_type().into(),
            PrimitiveKind::F64 => llvm.f64_type().into(),
            PrimitiveKind::Bool => llvm.bool_type().into(),
            PrimitiveKind::String => llvm.ptr_type(AddressSpace::default()).into(),
        },
        TypeDescriptor::Pointer(_) | TypeDescriptor::Function { .. } => {
            llvm.ptr_type(AddressSpace::default()).into()
        }
        TypeDescriptor::Slice(_) => {
            let ptr = llvm.ptr_type(AddressSpace::default());
            llvm.struct_type(&[ptr.into(), llvm.i64_type().into()], false).into()
        }
        TypeDescriptor::Array(element, len) => {
            let element = basic_type(llvm, sema, *element)?;
            element.array_type(*len as u32).into()
        }
        TypeDescriptor::Tuple(elements) => {
            let mut members = Vec::with_capacity(elements.len());
            for element in elements {
                members.push(basic_type(llvm, sema, *element)?);
            }
            llvm.struct_type(&members, false).into()
        }
        TypeDescriptor::Struct { .. } => {
            let layout = sema
                .interner
                .struct_layout(location)
                .ok_or_else(|| InternalError::new("struct instantiation without a resolved layout"))?;
            let mut members = Vec::with_capacity(layout.fields.len());
            for (_, field) in &layout.fields {
                members.push(basic_type(llvm, sema, *field)?);
            }
            llvm.struct_type(&members, false).into()
        }
        TypeDescriptor::Enum { def, .. } => {
            let layout = sema
                .interner
                .enum_layout(location)
                .ok_or_else(|| InternalError::new("enum instantiation without a resolved layout"))?;
            let tag: BasicTypeEnum<'ctx> =
                if *def == OPTION_DEF { llvm.bool_type().into() } else { llvm.i8_type().into() };
            let mut members = vec![tag];
            for (_, payload) in &layout.variants {
                for field in payload {
                    members.push(basic_type(llvm, sema, *field)?);
                }
            }
            llvm.struct_type(&members, false).into()
        }
        TypeDescriptor::Unit => llvm.struct_type(&[], false).into(),
        TypeDescriptor::Never | TypeDescriptor::Unknown => {
            return Err(InternalError::new(format!(
                "type `{}` has no value representation",
                sema.interner.display(location)
            )));
        }
    })
}

/// Field index of a variant's first payload slot inside its enum
/// struct: the tag plus every earlier variant's payload width.
pub(crate) fn enum_payload_base(sema: &SemaContext<'_>, enum_type: TypeLocation, variant: usize) -> u32 {
    let Some(layout) = sema.interner.enum_layout(enum_type) else {
        return 1;
    };
    let mut base = 1u32;
    for (_, payload) in layout.variants.iter().take(variant) {
        base += payload.len() as u32;
    }
    base
}

/// True when values of this type carry no data at runtime.
pub(crate) fn is_zero_sized(sema: &SemaContext<'_>, location: TypeLocation) -> bool {
    matches!(
        sema.interner.get(location),
        Some(TypeDescriptor::Unit | TypeDescriptor::Never | TypeDescriptor::Unknown) | None
    )
}

/// Builds the LLVM function type for a resolved function signature.
pub(crate) fn function_type<'ctx>(
    llvm: &'ctx Context,
    sema: &SemaContext<'_>,
    params: &[TypeLocation],
    result: TypeLocation,
    variadic: bool,
) -> Result<FunctionType<'ctx>, InternalError> {
    let mut param_types: Vec<BasicMetadataTypeEnum<'ctx>> = Vec::with_capacity(params.len());
    for param in params {
        param_types.push(basic_type(llvm, sema, *param)?.into());
    }

    let descriptor = sema.interner.get(result);
    Ok(match descriptor {
        Some(TypeDescriptor::Unit | TypeDescriptor::Never) => {
            llvm.void_type().fn_type(&param_types, variadic)
        }
        _ => basic_type(llvm, sema, result)?.fn_type(&param_types, variadic),
    })
}
